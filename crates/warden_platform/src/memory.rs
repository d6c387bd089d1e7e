#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use warden_domain::{ChannelId, GuildId, MessageId, RoleId, StickyPayload, UserId};

use crate::{ChannelKind, ChannelSpec, GatewayError, PermissionOverwrite, PlatformGateway, Role};

/// Gateway operations, used to target injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
	CreateChannel,
	DeleteChannel,
	OccupantCount,
	LastMessage,
	PostMessage,
	DeleteMessage,
	GetRole,
	UserHasRole,
	Purge,
}

/// Recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
	CreateChannel { guild: GuildId, name: String },
	DeleteChannel(ChannelId),
	OccupantCount(ChannelId),
	LastMessage(ChannelId),
	PostMessage(ChannelId),
	DeleteMessage(ChannelId, MessageId),
	GetRole(GuildId, RoleId),
	UserHasRole(GuildId, UserId, RoleId),
	Purge(ChannelId, usize),
}

/// Message stored in a memory channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
	/// Posted by the bot through the gateway.
	Bot(StickyPayload),
	/// Posted by someone else (simulated conversation).
	User { author: UserId, text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
	pub id: MessageId,
	pub content: MessageContent,
}

/// Snapshot of a channel in the memory platform.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
	pub guild: GuildId,
	pub kind: ChannelKind,
	pub name: String,
	pub category: Option<ChannelId>,
	pub overwrites: Vec<PermissionOverwrite>,
	pub occupants: BTreeSet<UserId>,
	/// Oldest first.
	pub messages: Vec<PostedMessage>,
}

#[derive(Debug)]
struct State {
	next_id: u64,
	channels: HashMap<ChannelId, MemoryChannel>,
	roles: HashMap<GuildId, Vec<Role>>,
	member_roles: HashMap<(GuildId, UserId), HashSet<RoleId>>,
	calls: Vec<GatewayCall>,
	faults: HashMap<GatewayOp, VecDeque<GatewayError>>,
}

impl Default for State {
	fn default() -> Self {
		Self {
			next_id: 1_000,
			channels: HashMap::new(),
			roles: HashMap::new(),
			member_roles: HashMap::new(),
			calls: Vec::new(),
			faults: HashMap::new(),
		}
	}
}

impl State {
	fn next_id(&mut self) -> u64 {
		self.next_id += 1;
		self.next_id
	}

	/// Record a call and pop an injected fault for it, if any.
	fn enter(&mut self, op: GatewayOp, call: GatewayCall) -> Result<(), GatewayError> {
		self.calls.push(call);
		match self.faults.get_mut(&op).and_then(|q| q.pop_front()) {
			Some(err) => {
				debug!(?op, error = %err, "memory gateway: injected fault");
				Err(err)
			}
			None => Ok(()),
		}
	}

	fn channel_mut(&mut self, channel: ChannelId) -> Result<&mut MemoryChannel, GatewayError> {
		self.channels.get_mut(&channel).ok_or(GatewayError::NotFound)
	}
}

/// In-process platform used by tests and dev runs.
///
/// Every operation yields once before touching state so callers observe the
/// same suspension points a network-backed gateway has.
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
	state: Arc<Mutex<State>>,
}

impl MemoryGateway {
	pub fn new() -> Self {
		Self::default()
	}

	/// Create a text channel directly on the platform.
	pub fn add_text_channel(&self, guild: GuildId, name: &str) -> ChannelId {
		let mut st = self.state.lock();
		let id = ChannelId::new(st.next_id());
		st.channels.insert(
			id,
			MemoryChannel {
				guild,
				kind: ChannelKind::Text,
				name: name.to_string(),
				category: None,
				overwrites: Vec::new(),
				occupants: BTreeSet::new(),
				messages: Vec::new(),
			},
		);
		id
	}

	pub fn add_role(&self, guild: GuildId, name: &str, managed: bool) -> RoleId {
		let mut st = self.state.lock();
		let id = RoleId::new(st.next_id());
		st.roles.entry(guild).or_default().push(Role {
			id,
			name: name.to_string(),
			managed,
		});
		id
	}

	pub fn grant_role(&self, guild: GuildId, user: UserId, role: RoleId) {
		self.state.lock().member_roles.entry((guild, user)).or_default().insert(role);
	}

	pub fn join_voice(&self, channel: ChannelId, user: UserId) {
		let mut st = self.state.lock();
		for ch in st.channels.values_mut() {
			ch.occupants.remove(&user);
		}
		if let Some(ch) = st.channels.get_mut(&channel) {
			ch.occupants.insert(user);
		}
	}

	pub fn leave_voice(&self, user: UserId) {
		for ch in self.state.lock().channels.values_mut() {
			ch.occupants.remove(&user);
		}
	}

	/// Simulate someone else posting in a channel.
	pub fn post_user_message(&self, channel: ChannelId, author: UserId, text: &str) -> Option<MessageId> {
		let mut st = self.state.lock();
		let id = MessageId::new(st.next_id());
		let ch = st.channels.get_mut(&channel)?;
		ch.messages.push(PostedMessage {
			id,
			content: MessageContent::User {
				author,
				text: text.to_string(),
			},
		});
		Some(id)
	}

	/// Simulate a channel being deleted by someone other than the bot.
	pub fn remove_channel(&self, channel: ChannelId) -> bool {
		self.state.lock().channels.remove(&channel).is_some()
	}

	/// Simulate a message being deleted by someone other than the bot.
	pub fn remove_message(&self, channel: ChannelId, message: MessageId) -> bool {
		let mut st = self.state.lock();
		let Some(ch) = st.channels.get_mut(&channel) else {
			return false;
		};
		let before = ch.messages.len();
		ch.messages.retain(|m| m.id != message);
		ch.messages.len() != before
	}

	/// Make the next call of `op` fail with `err`. Faults queue per operation.
	pub fn fail_next(&self, op: GatewayOp, err: GatewayError) {
		self.state.lock().faults.entry(op).or_default().push_back(err);
	}

	pub fn channel(&self, channel: ChannelId) -> Option<MemoryChannel> {
		self.state.lock().channels.get(&channel).cloned()
	}

	pub fn channel_exists(&self, channel: ChannelId) -> bool {
		self.state.lock().channels.contains_key(&channel)
	}

	pub fn messages(&self, channel: ChannelId) -> Vec<PostedMessage> {
		self.channel(channel).map(|c| c.messages).unwrap_or_default()
	}

	pub fn calls(&self) -> Vec<GatewayCall> {
		self.state.lock().calls.clone()
	}

	pub fn clear_calls(&self) {
		self.state.lock().calls.clear();
	}
}

#[async_trait]
impl PlatformGateway for MemoryGateway {
	async fn create_channel(&self, spec: ChannelSpec) -> Result<ChannelId, GatewayError> {
		tokio::task::yield_now().await;
		let mut st = self.state.lock();
		st.enter(
			GatewayOp::CreateChannel,
			GatewayCall::CreateChannel {
				guild: spec.guild,
				name: spec.name.clone(),
			},
		)?;

		let id = ChannelId::new(st.next_id());
		st.channels.insert(
			id,
			MemoryChannel {
				guild: spec.guild,
				kind: spec.kind,
				name: spec.name,
				category: spec.category,
				overwrites: spec.overwrites,
				occupants: BTreeSet::new(),
				messages: Vec::new(),
			},
		);
		Ok(id)
	}

	async fn delete_channel(&self, channel: ChannelId) -> Result<(), GatewayError> {
		tokio::task::yield_now().await;
		let mut st = self.state.lock();
		st.enter(GatewayOp::DeleteChannel, GatewayCall::DeleteChannel(channel))?;
		st.channels.remove(&channel).map(|_| ()).ok_or(GatewayError::NotFound)
	}

	async fn channel_occupant_count(&self, channel: ChannelId) -> Result<usize, GatewayError> {
		tokio::task::yield_now().await;
		let mut st = self.state.lock();
		st.enter(GatewayOp::OccupantCount, GatewayCall::OccupantCount(channel))?;
		Ok(st.channel_mut(channel)?.occupants.len())
	}

	async fn last_message_id(&self, channel: ChannelId) -> Result<Option<MessageId>, GatewayError> {
		tokio::task::yield_now().await;
		let mut st = self.state.lock();
		st.enter(GatewayOp::LastMessage, GatewayCall::LastMessage(channel))?;
		Ok(st.channel_mut(channel)?.messages.last().map(|m| m.id))
	}

	async fn post_message(&self, channel: ChannelId, payload: &StickyPayload) -> Result<MessageId, GatewayError> {
		tokio::task::yield_now().await;
		let mut st = self.state.lock();
		st.enter(GatewayOp::PostMessage, GatewayCall::PostMessage(channel))?;
		let id = MessageId::new(st.next_id());
		st.channel_mut(channel)?.messages.push(PostedMessage {
			id,
			content: MessageContent::Bot(payload.clone()),
		});
		Ok(id)
	}

	async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<(), GatewayError> {
		tokio::task::yield_now().await;
		let mut st = self.state.lock();
		st.enter(GatewayOp::DeleteMessage, GatewayCall::DeleteMessage(channel, message))?;
		let ch = st.channel_mut(channel)?;
		let before = ch.messages.len();
		ch.messages.retain(|m| m.id != message);
		if ch.messages.len() == before {
			return Err(GatewayError::NotFound);
		}
		Ok(())
	}

	async fn get_role(&self, guild: GuildId, role: RoleId) -> Result<Option<Role>, GatewayError> {
		tokio::task::yield_now().await;
		let mut st = self.state.lock();
		st.enter(GatewayOp::GetRole, GatewayCall::GetRole(guild, role))?;
		if role == guild.everyone_role() {
			return Ok(Some(Role {
				id: role,
				name: "@everyone".to_string(),
				managed: false,
			}));
		}
		Ok(st.roles.get(&guild).and_then(|roles| roles.iter().find(|r| r.id == role).cloned()))
	}

	async fn user_has_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<bool, GatewayError> {
		tokio::task::yield_now().await;
		let mut st = self.state.lock();
		st.enter(GatewayOp::UserHasRole, GatewayCall::UserHasRole(guild, user, role))?;
		Ok(st.member_roles.get(&(guild, user)).is_some_and(|roles| roles.contains(&role)))
	}

	async fn purge_messages(&self, channel: ChannelId, limit: usize) -> Result<usize, GatewayError> {
		tokio::task::yield_now().await;
		let mut st = self.state.lock();
		st.enter(GatewayOp::Purge, GatewayCall::Purge(channel, limit))?;
		let ch = st.channel_mut(channel)?;
		let n = limit.min(ch.messages.len());
		let keep = ch.messages.len() - n;
		ch.messages.truncate(keep);
		Ok(n)
	}
}
