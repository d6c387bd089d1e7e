#![forbid(unsafe_code)]

use std::sync::Arc;

use tracing::{debug, info};
use warden_domain::{ChannelId, EmbedColor, GuildId, MessageId, RoleId, StickyPayload, UserId};
use warden_platform::{PlatformGateway, Removal};

use crate::access::RoleStore;
use crate::error::{Error, Result};
use crate::lease::{LeaseConfig, LeaseRegistry, LeaseRequest};
use crate::scheduler::ReconcileScheduler;
use crate::sticky::StickyRegistry;

/// Who invoked a command. `is_admin` is resolved by the dispatch layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
	pub guild: GuildId,
	pub user: UserId,
	pub is_admin: bool,
}

impl Caller {
	pub fn member(guild: GuildId, user: UserId) -> Self {
		Self {
			guild,
			user,
			is_admin: false,
		}
	}

	pub fn admin(guild: GuildId, user: UserId) -> Self {
		Self {
			guild,
			user,
			is_admin: true,
		}
	}
}

/// What a text sticky command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StickyChange {
	Set(MessageId),
	Cleared(Removal),
}

/// Command-facing entry point: authorization in front of both registries.
#[derive(Debug, Clone)]
pub struct Warden {
	gateway: Arc<dyn PlatformGateway>,
	leases: Arc<LeaseRegistry>,
	stickies: Arc<StickyRegistry>,
	roles: Arc<RoleStore>,
}

impl Warden {
	pub fn new(gateway: Arc<dyn PlatformGateway>, roles: Arc<RoleStore>, lease_cfg: LeaseConfig) -> Self {
		Self {
			leases: Arc::new(LeaseRegistry::new(Arc::clone(&gateway), lease_cfg)),
			stickies: Arc::new(StickyRegistry::new(Arc::clone(&gateway))),
			gateway,
			roles,
		}
	}

	pub fn leases(&self) -> &Arc<LeaseRegistry> {
		&self.leases
	}

	pub fn stickies(&self) -> &Arc<StickyRegistry> {
		&self.stickies
	}

	pub fn roles(&self) -> &RoleStore {
		&self.roles
	}

	/// Scheduler driving this instance's registries.
	pub fn scheduler(&self) -> ReconcileScheduler {
		ReconcileScheduler::new(Arc::clone(&self.leases), Arc::clone(&self.stickies))
	}

	/// Choose which role may create voice channels in the caller's guild.
	pub async fn setup_creator_role(&self, caller: Caller, role: RoleId) -> Result<Option<RoleId>> {
		require_admin(caller)?;
		if role == caller.guild.everyone_role() {
			return Err(Error::RoleNotAssignable { role });
		}

		let found = self
			.gateway
			.get_role(caller.guild, role)
			.await?
			.ok_or(Error::UnknownRole { role })?;
		if found.managed {
			return Err(Error::RoleNotAssignable { role });
		}

		Ok(self.roles.set_creator_role(caller.guild, role)?)
	}

	/// Check the caller holds the guild's creator role.
	pub async fn authorize_creator(&self, caller: Caller) -> Result<()> {
		let role = self
			.roles
			.creator_role(caller.guild)
			.ok_or(Error::SetupRequired { guild: caller.guild })?;

		if !self.gateway.user_has_role(caller.guild, caller.user, role).await? {
			debug!(guild = %caller.guild, user = %caller.user, %role, "caller lacks creator role");
			return Err(Error::Unauthorized);
		}
		Ok(())
	}

	pub async fn create_voice(&self, caller: Caller, name: &str, category: Option<ChannelId>) -> Result<ChannelId> {
		self.authorize_creator(caller).await?;
		let req = LeaseRequest::new(caller.guild, name).in_category(category);
		self.leases.acquire(caller.user, req).await
	}

	pub async fn end_voice(&self, caller: Caller) -> Result<Removal> {
		self.leases.release(caller.user).await
	}

	/// Ends every voice lease the registry holds, across all guilds, not only `caller.guild`.
	pub async fn end_all_voice(&self, caller: Caller) -> Result<usize> {
		require_admin(caller)?;
		let revoked = self.leases.revoke_all().await;
		info!(guild = %caller.guild, admin = %caller.user, revoked, "all voice leases ended");
		Ok(revoked)
	}

	pub async fn set_sticky(&self, caller: Caller, channel: ChannelId, payload: StickyPayload) -> Result<MessageId> {
		require_admin(caller)?;
		self.stickies.set(channel, payload).await
	}

	/// Set a text sticky; blank text removes the existing one instead.
	pub async fn set_sticky_text(&self, caller: Caller, channel: ChannelId, text: Option<&str>) -> Result<StickyChange> {
		require_admin(caller)?;
		match text.filter(|t| !t.trim().is_empty()) {
			Some(text) => {
				let payload = StickyPayload::text(text)?;
				Ok(StickyChange::Set(self.stickies.set(channel, payload).await?))
			}
			None => Ok(StickyChange::Cleared(self.stickies.clear(channel).await?)),
		}
	}

	/// Set an embed sticky. An unparseable colour falls back to the default.
	pub async fn set_sticky_embed(
		&self,
		caller: Caller,
		channel: ChannelId,
		title: &str,
		body: &str,
		color: Option<&str>,
		image_ref: Option<String>,
	) -> Result<MessageId> {
		require_admin(caller)?;
		let payload = StickyPayload::embed(title, body, EmbedColor::parse_or_default(color), image_ref)?;
		self.stickies.set(channel, payload).await
	}

	pub async fn clear_sticky(&self, caller: Caller, channel: ChannelId) -> Result<Removal> {
		require_admin(caller)?;
		self.stickies.clear(channel).await
	}

	pub fn has_sticky(&self, channel: ChannelId) -> bool {
		self.stickies.has_sticky(channel)
	}

	/// Delete up to `count` of the newest messages in `channel`.
	pub async fn purge(&self, caller: Caller, channel: ChannelId, count: usize) -> Result<usize> {
		require_admin(caller)?;
		if count == 0 {
			return Err(Error::InvalidArgument(
				"Please specify a positive number of messages to purge.".to_string(),
			));
		}

		let deleted = self.gateway.purge_messages(channel, count).await?;
		info!(%channel, admin = %caller.user, requested = count, deleted, "channel purged");
		Ok(deleted)
	}
}

fn require_admin(caller: Caller) -> Result<()> {
	if caller.is_admin { Ok(()) } else { Err(Error::AdminRequired) }
}
