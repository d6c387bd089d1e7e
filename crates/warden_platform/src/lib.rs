#![forbid(unsafe_code)]

pub mod discord;
pub mod memory;
pub mod occupancy;

use std::fmt;
use std::ops::BitOr;
use std::time::Duration;

use thiserror::Error;
use warden_domain::{ChannelId, GuildId, MessageId, RoleId, StickyPayload, UserId};

pub use occupancy::VoiceOccupancy;

/// Channel kinds the gateway can create or model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
	Text,
	Voice,
}

impl ChannelKind {
	/// Discord channel type code.
	pub const fn discord_type(self) -> u8 {
		match self {
			Self::Text => 0,
			Self::Voice => 2,
		}
	}
}

/// Discord permission bit set (only the bits this bot grants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Permissions(u64);

impl Permissions {
	pub const NONE: Self = Self(0);
	pub const MANAGE_CHANNELS: Self = Self(1 << 4);
	pub const VIEW_CHANNEL: Self = Self(1 << 10);
	pub const CONNECT: Self = Self(1 << 20);
	pub const SPEAK: Self = Self(1 << 21);

	pub const fn bits(self) -> u64 {
		self.0
	}

	pub const fn union(self, other: Self) -> Self {
		Self(self.0 | other.0)
	}

	pub const fn contains(self, other: Self) -> bool {
		self.0 & other.0 == other.0
	}
}

impl BitOr for Permissions {
	type Output = Self;

	fn bitor(self, rhs: Self) -> Self {
		self.union(rhs)
	}
}

/// Who a permission overwrite applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverwriteTarget {
	Role(RoleId),
	Member(UserId),
}

/// Channel-scoped permission overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionOverwrite {
	pub target: OverwriteTarget,
	pub allow: Permissions,
	pub deny: Permissions,
}

impl PermissionOverwrite {
	pub fn allow(target: OverwriteTarget, allow: Permissions) -> Self {
		Self {
			target,
			allow,
			deny: Permissions::NONE,
		}
	}
}

/// Channel creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
	pub guild: GuildId,
	pub kind: ChannelKind,
	pub name: String,
	pub category: Option<ChannelId>,
	pub overwrites: Vec<PermissionOverwrite>,
}

impl ChannelSpec {
	pub fn voice(guild: GuildId, name: impl Into<String>) -> Self {
		Self {
			guild,
			kind: ChannelKind::Voice,
			name: name.into(),
			category: None,
			overwrites: Vec::new(),
		}
	}

	pub fn in_category(mut self, category: Option<ChannelId>) -> Self {
		self.category = category;
		self
	}

	pub fn with_overwrite(mut self, overwrite: PermissionOverwrite) -> Self {
		self.overwrites.push(overwrite);
		self
	}
}

/// Guild role snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
	pub id: RoleId,
	pub name: String,
	/// Roles owned by an integration/bot cannot be handed out.
	pub managed: bool,
}

/// Gateway call failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
	#[error("resource not found")]
	NotFound,
	#[error("forbidden: {0}")]
	Forbidden(String),
	#[error("rate limited (retry after {retry_after:?})")]
	RateLimited { retry_after: Option<Duration> },
	#[error("http status {status}: {body}")]
	Http { status: u16, body: String },
	#[error("transport: {0}")]
	Transport(String),
	#[error("decode: {0}")]
	Decode(String),
}

impl GatewayError {
	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound)
	}
}

/// Outcome of a delete that tolerates the resource already being gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
	Deleted,
	AlreadyGone,
}

impl fmt::Display for Removal {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Deleted => "deleted",
			Self::AlreadyGone => "already_gone",
		})
	}
}

/// Treat `NotFound` on delete as success: the resource is absent either way.
pub trait GatewayResultExt {
	fn tolerate_not_found(self) -> Result<Removal, GatewayError>;
}

impl GatewayResultExt for Result<(), GatewayError> {
	fn tolerate_not_found(self) -> Result<Removal, GatewayError> {
		match self {
			Ok(()) => Ok(Removal::Deleted),
			Err(GatewayError::NotFound) => Ok(Removal::AlreadyGone),
			Err(e) => Err(e),
		}
	}
}

/// Platform operations consumed by the registries.
///
/// Implementations own no lease or sticky state; they are the source of truth
/// for what actually exists on the platform.
#[async_trait::async_trait]
pub trait PlatformGateway: Send + Sync + 'static {
	async fn create_channel(&self, spec: ChannelSpec) -> Result<ChannelId, GatewayError>;

	async fn delete_channel(&self, channel: ChannelId) -> Result<(), GatewayError>;

	/// Number of members connected to a voice channel; `NotFound` if the channel is gone.
	async fn channel_occupant_count(&self, channel: ChannelId) -> Result<usize, GatewayError>;

	/// Newest message in a channel (`None` when empty); `NotFound` if the channel is gone.
	async fn last_message_id(&self, channel: ChannelId) -> Result<Option<MessageId>, GatewayError>;

	async fn post_message(&self, channel: ChannelId, payload: &StickyPayload) -> Result<MessageId, GatewayError>;

	async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<(), GatewayError>;

	async fn get_role(&self, guild: GuildId, role: RoleId) -> Result<Option<Role>, GatewayError>;

	async fn user_has_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<bool, GatewayError>;

	/// Delete up to `limit` of the newest messages; returns how many were deleted.
	async fn purge_messages(&self, channel: ChannelId, limit: usize) -> Result<usize, GatewayError>;
}

impl fmt::Debug for dyn PlatformGateway {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("dyn PlatformGateway")
	}
}

/// Wrapper that redacts in logs.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
	pub fn new(s: impl Into<String>) -> Self {
		Self(s.into())
	}

	/// Access the inner secret string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SecretString(<redacted>)")
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("<redacted>")
	}
}
