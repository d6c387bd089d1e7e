#![forbid(unsafe_code)]

use std::sync::Arc;

use warden_domain::{ChannelId, EmbedColor, GuildId, MessageId, StickyPayload, UserId};
use warden_platform::memory::{GatewayCall, GatewayOp, MemoryGateway, MessageContent};
use warden_platform::{GatewayError, Removal};

use crate::error::Error;
use crate::sticky::{RefreshOutcome, StickyRegistry, StickySweepReport};

const GUILD: GuildId = GuildId::new(1);

fn registry() -> (MemoryGateway, StickyRegistry) {
	let gw = MemoryGateway::new();
	let reg = StickyRegistry::new(Arc::new(gw.clone()));
	(gw, reg)
}

fn text(body: &str) -> StickyPayload {
	StickyPayload::text(body).expect("valid payload")
}

fn newest_is_bot(gw: &MemoryGateway, channel: ChannelId, expected: &StickyPayload) -> bool {
	gw.messages(channel)
		.last()
		.is_some_and(|m| m.content == MessageContent::Bot(expected.clone()))
}

#[tokio::test]
async fn set_posts_immediately() {
	let (gw, reg) = registry();
	let channel = gw.add_text_channel(GUILD, "general");

	let posted = reg.set(channel, text("Welcome")).await.expect("set");

	let record = reg.get(channel).expect("record");
	assert_eq!(record.last_posted, Some(posted));
	assert_eq!(gw.messages(channel).len(), 1);
	assert!(newest_is_bot(&gw, channel, &text("Welcome")));
}

#[tokio::test]
async fn set_replaces_previous_instance() {
	let (gw, reg) = registry();
	let channel = gw.add_text_channel(GUILD, "general");
	let first = reg.set(channel, text("one")).await.expect("set");

	let second = reg.set(channel, text("two")).await.expect("replace");

	assert_ne!(first, second);
	let ids: Vec<MessageId> = gw.messages(channel).iter().map(|m| m.id).collect();
	assert_eq!(ids, vec![second]);
	assert_eq!(reg.get(channel).expect("record").payload, text("two"));
	assert_eq!(reg.len(), 1);
}

#[tokio::test]
async fn set_tolerates_old_instance_already_deleted() {
	let (gw, reg) = registry();
	let channel = gw.add_text_channel(GUILD, "general");
	let first = reg.set(channel, text("one")).await.expect("set");
	gw.remove_message(channel, first);

	reg.set(channel, text("two")).await.expect("replace");
	assert_eq!(gw.messages(channel).len(), 1);
}

#[tokio::test]
async fn failed_post_leaves_registry_untouched() {
	let (gw, reg) = registry();
	let channel = gw.add_text_channel(GUILD, "general");
	gw.fail_next(GatewayOp::PostMessage, GatewayError::Forbidden("no send".into()));

	assert!(matches!(reg.set(channel, text("x")).await, Err(Error::Gateway(_))));
	assert!(!reg.has_sticky(channel));
}

#[tokio::test]
async fn failed_old_delete_keeps_previous_record() {
	let (gw, reg) = registry();
	let channel = gw.add_text_channel(GUILD, "general");
	let first = reg.set(channel, text("one")).await.expect("set");
	gw.fail_next(GatewayOp::DeleteMessage, GatewayError::RateLimited { retry_after: None });

	assert!(reg.set(channel, text("two")).await.is_err());
	let record = reg.get(channel).expect("record");
	assert_eq!(record.payload, text("one"));
	assert_eq!(record.last_posted, Some(first));
}

#[tokio::test]
async fn invalid_payload_is_rejected_before_posting() {
	let (gw, reg) = registry();
	let channel = gw.add_text_channel(GUILD, "general");
	let blank = StickyPayload::Text { body: "  ".into() };

	assert!(matches!(reg.set(channel, blank).await, Err(Error::Payload(_))));
	assert!(gw.calls().is_empty());
}

#[tokio::test]
async fn clear_deletes_instance_and_record() {
	let (gw, reg) = registry();
	let channel = gw.add_text_channel(GUILD, "general");
	reg.set(channel, text("x")).await.expect("set");

	assert_eq!(reg.clear(channel).await.expect("clear"), Removal::Deleted);
	assert!(!reg.has_sticky(channel));
	assert!(gw.messages(channel).is_empty());
}

#[tokio::test]
async fn clear_tolerates_instance_already_deleted() {
	let (gw, reg) = registry();
	let channel = gw.add_text_channel(GUILD, "general");
	let posted = reg.set(channel, text("x")).await.expect("set");
	gw.remove_message(channel, posted);

	assert_eq!(reg.clear(channel).await.expect("clear"), Removal::AlreadyGone);
	assert!(reg.is_empty());
}

#[tokio::test]
async fn clear_without_sticky_fails() {
	let (_gw, reg) = registry();
	let err = reg.clear(ChannelId::new(5)).await.expect_err("no sticky");
	assert!(matches!(err, Error::NoSticky { channel } if channel == ChannelId::new(5)));
}

#[tokio::test]
async fn refresh_with_matching_last_message_is_a_no_op() {
	let (gw, reg) = registry();
	let channel = gw.add_text_channel(GUILD, "general");
	let posted = reg.set(channel, text("x")).await.expect("set");
	gw.clear_calls();

	let outcome = reg.refresh(channel, Some(posted)).await.expect("refresh");
	assert_eq!(outcome, RefreshOutcome::Current);
	assert!(gw.calls().is_empty());
}

#[tokio::test]
async fn refresh_with_newer_message_reposts_same_payload() {
	let (gw, reg) = registry();
	let channel = gw.add_text_channel(GUILD, "general");
	let payload = StickyPayload::embed("Rules", "Be kind", EmbedColor::DEFAULT, None).expect("embed");
	let old = reg.set(channel, payload.clone()).await.expect("set");
	let chatter = gw
		.post_user_message(channel, UserId::new(3), "hi")
		.expect("posted");
	gw.clear_calls();

	let outcome = reg.refresh(channel, Some(chatter)).await.expect("refresh");

	let RefreshOutcome::Reposted(new) = outcome else {
		panic!("expected repost, got {outcome:?}");
	};
	assert_ne!(new, old);
	assert_eq!(
		gw.calls(),
		vec![GatewayCall::DeleteMessage(channel, old), GatewayCall::PostMessage(channel)]
	);
	assert_eq!(reg.get(channel).expect("record").last_posted, Some(new));
	assert!(newest_is_bot(&gw, channel, &payload));
}

#[tokio::test]
async fn failed_repost_clears_last_posted() {
	let (gw, reg) = registry();
	let channel = gw.add_text_channel(GUILD, "general");
	reg.set(channel, text("x")).await.expect("set");
	let chatter = gw.post_user_message(channel, UserId::new(3), "hi");
	gw.fail_next(GatewayOp::PostMessage, GatewayError::Transport("reset".into()));

	assert!(reg.refresh(channel, chatter).await.is_err());
	assert_eq!(reg.get(channel).expect("record").last_posted, None);

	// Nothing of ours is left in the channel, so the next refresh posts.
	let outcome = reg.refresh(channel, chatter).await.expect("refresh");
	assert!(matches!(outcome, RefreshOutcome::Reposted(_)));
}

#[tokio::test]
async fn refresh_unknown_channel_fails() {
	let (_gw, reg) = registry();
	assert!(matches!(
		reg.refresh(ChannelId::new(1), None).await,
		Err(Error::NoSticky { .. })
	));
}

#[tokio::test]
async fn sweep_reposts_superseded_sticky() {
	let (gw, reg) = registry();
	let channel = gw.add_text_channel(GUILD, "general");
	let m1 = reg.set(channel, text("Welcome")).await.expect("set");
	gw.post_user_message(channel, UserId::new(3), "hello");

	let report = reg.sweep().await;
	assert_eq!(report.reposted, 1);

	let m2 = reg.get(channel).expect("record").last_posted.expect("posted");
	assert_ne!(m2, m1);
	let ids: Vec<MessageId> = gw.messages(channel).iter().map(|m| m.id).collect();
	assert!(!ids.contains(&m1));
	assert_eq!(ids.last(), Some(&m2));
	assert!(newest_is_bot(&gw, channel, &text("Welcome")));
}

#[tokio::test]
async fn sweep_leaves_current_sticky_alone() {
	let (gw, reg) = registry();
	let channel = gw.add_text_channel(GUILD, "general");
	reg.set(channel, text("x")).await.expect("set");
	gw.clear_calls();

	let report = reg.sweep().await;
	assert_eq!(
		report,
		StickySweepReport {
			examined: 1,
			..Default::default()
		}
	);
	assert_eq!(gw.calls(), vec![GatewayCall::LastMessage(channel)]);
}

#[tokio::test]
async fn sweep_reposts_when_sticky_was_deleted_by_someone_else() {
	let (gw, reg) = registry();
	let channel = gw.add_text_channel(GUILD, "general");
	let posted = reg.set(channel, text("x")).await.expect("set");
	gw.remove_message(channel, posted);

	assert_eq!(reg.sweep().await.reposted, 1);
	assert!(newest_is_bot(&gw, channel, &text("x")));
}

#[tokio::test]
async fn sweep_drops_record_for_deleted_channel() {
	let (gw, reg) = registry();
	let channel = gw.add_text_channel(GUILD, "general");
	reg.set(channel, text("x")).await.expect("set");
	gw.remove_channel(channel);

	let report = reg.sweep().await;
	assert_eq!(report.dropped, 1);
	assert_eq!(report.failed, 0);
	assert!(!reg.has_sticky(channel));
}

#[tokio::test]
async fn sweep_failure_is_isolated_and_retried() {
	let (gw, reg) = registry();
	let a = gw.add_text_channel(GUILD, "a");
	let b = gw.add_text_channel(GUILD, "b");
	reg.set(a, text("a")).await.expect("set");
	reg.set(b, text("b")).await.expect("set");
	gw.post_user_message(a, UserId::new(3), "chatter");
	gw.post_user_message(b, UserId::new(3), "chatter");
	gw.fail_next(GatewayOp::LastMessage, GatewayError::RateLimited { retry_after: None });

	let first = reg.sweep().await;
	assert_eq!(first.failed, 1);
	assert_eq!(first.reposted, 1);

	let second = reg.sweep().await;
	assert_eq!(second.failed, 0);
	assert_eq!(second.reposted, 1);
	assert!(newest_is_bot(&gw, a, &text("a")));
	assert!(newest_is_bot(&gw, b, &text("b")));
}

#[tokio::test]
async fn sweep_is_idempotent() {
	let (gw, reg) = registry();
	let channel = gw.add_text_channel(GUILD, "general");
	reg.set(channel, text("x")).await.expect("set");
	gw.post_user_message(channel, UserId::new(3), "hi");

	assert_eq!(reg.sweep().await.reposted, 1);
	let after_first = reg.get(channel);
	let messages = gw.messages(channel);

	assert_eq!(reg.sweep().await.reposted, 0);
	assert_eq!(reg.get(channel), after_first);
	assert_eq!(gw.messages(channel), messages);
}
