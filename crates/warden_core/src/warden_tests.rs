#![forbid(unsafe_code)]

use std::sync::Arc;

use warden_domain::{ChannelId, EmbedColor, GuildId, RoleId, StickyPayload, UserId};
use warden_platform::memory::{MemoryGateway, MessageContent};
use warden_platform::Removal;

use crate::access::RoleStore;
use crate::error::Error;
use crate::lease::{LeaseConfig, LeaseRequest};
use crate::warden::{Caller, StickyChange, Warden};

const GUILD: GuildId = GuildId::new(1);
const ADMIN: UserId = UserId::new(500);

fn warden() -> (MemoryGateway, Warden) {
	let gw = MemoryGateway::new();
	let warden = Warden::new(
		Arc::new(gw.clone()),
		Arc::new(RoleStore::in_memory()),
		LeaseConfig::default(),
	);
	(gw, warden)
}

fn admin() -> Caller {
	Caller::admin(GUILD, ADMIN)
}

/// Configure a creator role and grant it to `user`.
async fn creator(gw: &MemoryGateway, warden: &Warden, user: UserId) -> Caller {
	let role = gw.add_role(GUILD, "Creators", false);
	warden.setup_creator_role(admin(), role).await.expect("setup");
	gw.grant_role(GUILD, user, role);
	Caller::member(GUILD, user)
}

#[tokio::test]
async fn create_voice_requires_setup() {
	let (_gw, warden) = warden();
	let err = warden
		.create_voice(Caller::member(GUILD, UserId::new(1)), "room", None)
		.await
		.expect_err("not set up");
	assert!(matches!(err, Error::SetupRequired { guild } if guild == GUILD));
	assert_eq!(err.user_message(), "Bot not set up yet. Use /setup.");
}

#[tokio::test]
async fn create_voice_requires_creator_role() {
	let (gw, warden) = warden();
	creator(&gw, &warden, UserId::new(1)).await;

	let outsider = Caller::member(GUILD, UserId::new(2));
	let err = warden.create_voice(outsider, "room", None).await.expect_err("no role");
	assert!(matches!(err, Error::Unauthorized));
	assert!(warden.leases().is_empty());
}

#[tokio::test]
async fn setup_is_admin_only_and_validates_role() {
	let (gw, warden) = warden();
	let role = gw.add_role(GUILD, "Creators", false);
	let bot_role = gw.add_role(GUILD, "Integration", true);

	assert!(matches!(
		warden.setup_creator_role(Caller::member(GUILD, UserId::new(1)), role).await,
		Err(Error::AdminRequired)
	));
	assert!(matches!(
		warden.setup_creator_role(admin(), RoleId::new(424_242)).await,
		Err(Error::UnknownRole { .. })
	));
	assert!(matches!(
		warden.setup_creator_role(admin(), bot_role).await,
		Err(Error::RoleNotAssignable { .. })
	));
	assert!(matches!(
		warden.setup_creator_role(admin(), GUILD.everyone_role()).await,
		Err(Error::RoleNotAssignable { .. })
	));

	assert_eq!(warden.setup_creator_role(admin(), role).await.expect("setup"), None);
	assert_eq!(warden.roles().creator_role(GUILD), Some(role));
}

#[tokio::test]
async fn abandoned_voice_channel_is_reclaimed() {
	let (gw, warden) = warden();
	let user_a = UserId::new(1);
	let caller = creator(&gw, &warden, user_a).await;

	let v1 = warden.create_voice(caller, "hangout", None).await.expect("create");
	gw.join_voice(v1, user_a);
	gw.join_voice(v1, UserId::new(2));

	let report = warden.scheduler().run_once().await;
	assert_eq!(report.leases.reclaimed, 0);

	gw.leave_voice(user_a);
	gw.leave_voice(UserId::new(2));
	let report = warden.scheduler().run_once().await;
	assert_eq!(report.leases.reclaimed, 1);
	assert!(!gw.channel_exists(v1));

	let err = warden.end_voice(caller).await.expect_err("lease gone");
	assert!(matches!(err, Error::NoLease { .. }));
	assert_eq!(err.user_message(), "You have no VC.");
}

#[tokio::test]
async fn second_voice_channel_is_refused() {
	let (gw, warden) = warden();
	let caller = creator(&gw, &warden, UserId::new(1)).await;

	warden.create_voice(caller, "one", None).await.expect("create");
	let err = warden.create_voice(caller, "two", None).await.expect_err("second");
	assert_eq!(err.user_message(), "You already have a VC!");
}

#[tokio::test]
async fn end_voice_deletes_own_channel() {
	let (gw, warden) = warden();
	let caller = creator(&gw, &warden, UserId::new(1)).await;
	let channel = warden.create_voice(caller, "x", Some(ChannelId::new(77))).await.expect("create");
	assert_eq!(gw.channel(channel).expect("exists").category, Some(ChannelId::new(77)));

	assert_eq!(warden.end_voice(caller).await.expect("end"), Removal::Deleted);
	assert!(!gw.channel_exists(channel));
}

#[tokio::test]
async fn end_all_voice_is_admin_only() {
	let (gw, warden) = warden();
	let caller = creator(&gw, &warden, UserId::new(1)).await;
	warden.create_voice(caller, "x", None).await.expect("create");

	assert!(matches!(warden.end_all_voice(caller).await, Err(Error::AdminRequired)));
	assert_eq!(warden.end_all_voice(admin()).await.expect("end all"), 1);
	assert!(warden.leases().is_empty());
}

#[tokio::test]
async fn end_all_voice_reaches_every_guild() {
	let (gw, warden) = warden();
	let caller = creator(&gw, &warden, UserId::new(1)).await;
	let here = warden.create_voice(caller, "x", None).await.expect("create");
	let elsewhere = warden
		.leases()
		.acquire(UserId::new(2), LeaseRequest::new(GuildId::new(2), "y"))
		.await
		.expect("acquire");

	assert_eq!(warden.end_all_voice(admin()).await.expect("end all"), 2);
	assert!(!gw.channel_exists(here));
	assert!(!gw.channel_exists(elsewhere));
}

#[tokio::test]
async fn sticky_welcome_scenario() {
	let (gw, warden) = warden();
	let c = gw.add_text_channel(GUILD, "lobby");

	let change = warden
		.set_sticky_text(admin(), c, Some("Welcome"))
		.await
		.expect("set");
	let StickyChange::Set(m1) = change else {
		panic!("expected set, got {change:?}");
	};
	assert!(warden.has_sticky(c));

	gw.post_user_message(c, UserId::new(9), "hey all");
	let report = warden.scheduler().run_once().await;
	assert_eq!(report.stickies.reposted, 1);

	let m2 = warden.stickies().get(c).and_then(|r| r.last_posted).expect("reposted");
	assert_ne!(m1, m2);
	let messages = gw.messages(c);
	assert!(messages.iter().all(|m| m.id != m1));
	let newest = messages.last().expect("newest");
	assert_eq!(newest.id, m2);
	assert_eq!(
		newest.content,
		MessageContent::Bot(StickyPayload::text("Welcome").expect("payload"))
	);
}

#[tokio::test]
async fn blank_sticky_text_clears() {
	let (gw, warden) = warden();
	let c = gw.add_text_channel(GUILD, "lobby");

	let err = warden.set_sticky_text(admin(), c, None).await.expect_err("nothing to clear");
	assert_eq!(err.user_message(), "No sticky to remove.");

	warden.set_sticky_text(admin(), c, Some("hi")).await.expect("set");
	let change = warden.set_sticky_text(admin(), c, Some("   ")).await.expect("clear");
	assert_eq!(change, StickyChange::Cleared(Removal::Deleted));
	assert!(!warden.has_sticky(c));
	assert!(gw.messages(c).is_empty());
}

#[tokio::test]
async fn sticky_embed_falls_back_to_default_colour() {
	let (gw, warden) = warden();
	let c = gw.add_text_channel(GUILD, "lobby");

	warden
		.set_sticky_embed(admin(), c, "Rules", "Be kind", Some("not-a-colour"), Some("  ".into()))
		.await
		.expect("set");

	let record = warden.stickies().get(c).expect("record");
	assert_eq!(
		record.payload,
		StickyPayload::Embed {
			title: "Rules".into(),
			body: "Be kind".into(),
			color: EmbedColor::DEFAULT,
			image_ref: None,
		}
	);
}

#[tokio::test]
async fn sticky_commands_are_admin_only() {
	let (gw, warden) = warden();
	let c = gw.add_text_channel(GUILD, "lobby");
	let member = Caller::member(GUILD, UserId::new(3));

	assert!(matches!(
		warden.set_sticky_text(member, c, Some("x")).await,
		Err(Error::AdminRequired)
	));
	assert!(matches!(
		warden
			.set_sticky(member, c, StickyPayload::text("x").expect("payload"))
			.await,
		Err(Error::AdminRequired)
	));
	assert!(matches!(warden.clear_sticky(member, c).await, Err(Error::AdminRequired)));
	assert!(gw.calls().is_empty());
}

#[tokio::test]
async fn purge_deletes_newest_and_sweep_restores_sticky() {
	let (gw, warden) = warden();
	let c = gw.add_text_channel(GUILD, "lobby");
	for i in 0..5 {
		gw.post_user_message(c, UserId::new(9), &format!("msg {i}"));
	}
	warden
		.set_sticky(admin(), c, StickyPayload::text("pinned").expect("payload"))
		.await
		.expect("set");

	assert_eq!(warden.purge(admin(), c, 3).await.expect("purge"), 3);
	assert_eq!(gw.messages(c).len(), 3);

	assert_eq!(warden.scheduler().run_once().await.stickies.reposted, 1);
	assert!(matches!(
		gw.messages(c).last().map(|m| &m.content),
		Some(MessageContent::Bot(_))
	));
}

#[tokio::test]
async fn purge_validates_count_and_caller() {
	let (gw, warden) = warden();
	let c = gw.add_text_channel(GUILD, "lobby");

	assert!(matches!(
		warden.purge(Caller::member(GUILD, UserId::new(1)), c, 5).await,
		Err(Error::AdminRequired)
	));
	let err = warden.purge(admin(), c, 0).await.expect_err("zero");
	assert_eq!(err.user_message(), "Please specify a positive number of messages to purge.");
}
