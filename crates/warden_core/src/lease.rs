#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use warden_domain::{ChannelId, GuildId, UserId};
use warden_platform::{
	ChannelSpec, GatewayError, GatewayResultExt, OverwriteTarget, PermissionOverwrite, Permissions, PlatformGateway,
	Removal,
};

use crate::error::{Error, Result};
use crate::keyed_lock::KeyedLocks;

/// Platform limit on channel names.
pub const MAX_CHANNEL_NAME_LEN: usize = 100;

pub const DEFAULT_VOICE_NAME_PREFIX: &str = "!";

/// A user's claim on one ephemeral voice channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceLease {
	pub owner: UserId,
	pub channel: ChannelId,
}

#[derive(Debug, Clone)]
pub struct LeaseConfig {
	/// Prepended to every requested channel name.
	pub name_prefix: String,
}

impl Default for LeaseConfig {
	fn default() -> Self {
		Self {
			name_prefix: DEFAULT_VOICE_NAME_PREFIX.to_string(),
		}
	}
}

/// Where and under which name a lease channel is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRequest {
	pub guild: GuildId,
	pub name: String,
	pub category: Option<ChannelId>,
}

impl LeaseRequest {
	pub fn new(guild: GuildId, name: impl Into<String>) -> Self {
		Self {
			guild,
			name: name.into(),
			category: None,
		}
	}

	pub fn in_category(mut self, category: Option<ChannelId>) -> Self {
		self.category = category;
		self
	}
}

/// Result of one lease sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaseSweepReport {
	pub examined: usize,
	pub reclaimed: usize,
	pub failed: usize,
}

/// Owns the user → voice channel map.
pub struct LeaseRegistry {
	gateway: Arc<dyn PlatformGateway>,
	cfg: LeaseConfig,
	leases: Mutex<HashMap<UserId, ChannelId>>,
	locks: KeyedLocks<UserId>,
}

impl std::fmt::Debug for LeaseRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LeaseRegistry")
			.field("cfg", &self.cfg)
			.field("leases", &self.leases.lock().len())
			.finish_non_exhaustive()
	}
}

impl LeaseRegistry {
	pub fn new(gateway: Arc<dyn PlatformGateway>, cfg: LeaseConfig) -> Self {
		Self {
			gateway,
			cfg,
			leases: Mutex::new(HashMap::new()),
			locks: KeyedLocks::new(),
		}
	}

	/// Create a voice channel for `owner` and record the lease.
	///
	/// Authorization is the caller's responsibility.
	pub async fn acquire(&self, owner: UserId, req: LeaseRequest) -> Result<ChannelId> {
		let name = self.channel_name(&req.name)?;
		let _guard = self.locks.lock(owner).await;

		if self.leases.lock().contains_key(&owner) {
			return Err(Error::AlreadyLeased { owner });
		}

		let spec = ChannelSpec::voice(req.guild, name)
			.in_category(req.category)
			.with_overwrite(PermissionOverwrite::allow(
				OverwriteTarget::Role(req.guild.everyone_role()),
				Permissions::VIEW_CHANNEL | Permissions::CONNECT | Permissions::SPEAK,
			))
			.with_overwrite(PermissionOverwrite::allow(
				OverwriteTarget::Member(owner),
				Permissions::MANAGE_CHANNELS | Permissions::CONNECT | Permissions::SPEAK,
			));

		let channel = self.gateway.create_channel(spec).await?;
		self.leases.lock().insert(owner, channel);
		self.publish_gauge();

		info!(%owner, %channel, guild = %req.guild, "voice lease acquired");
		Ok(channel)
	}

	/// Delete the owner's channel and drop the lease.
	pub async fn release(&self, owner: UserId) -> Result<Removal> {
		let _guard = self.locks.lock(owner).await;

		let channel = self.lease_of(owner).ok_or(Error::NoLease { owner })?;
		let removal = self.gateway.delete_channel(channel).await.tolerate_not_found()?;

		self.leases.lock().remove(&owner);
		self.publish_gauge();

		info!(%owner, %channel, %removal, "voice lease released");
		Ok(removal)
	}

	/// Release every lease present when called. Returns how many were revoked.
	///
	/// A lease whose delete fails stays recorded and is logged.
	pub async fn revoke_all(&self) -> usize {
		let snapshot = self.snapshot();
		let mut revoked = 0usize;

		for lease in snapshot {
			let _guard = self.locks.lock(lease.owner).await;
			if !self.holds(lease) {
				continue;
			}

			match self.gateway.delete_channel(lease.channel).await.tolerate_not_found() {
				Ok(removal) => {
					self.leases.lock().remove(&lease.owner);
					revoked += 1;
					debug!(owner = %lease.owner, channel = %lease.channel, %removal, "voice lease revoked");
				}
				Err(e) => {
					warn!(owner = %lease.owner, channel = %lease.channel, error = %e, "failed to revoke voice lease");
				}
			}
		}

		self.publish_gauge();
		info!(revoked, "voice leases revoked");
		revoked
	}

	/// Reclaim leases whose channel is gone or empty.
	pub async fn sweep(&self) -> LeaseSweepReport {
		let mut report = LeaseSweepReport::default();

		for lease in self.snapshot() {
			report.examined += 1;
			match self.sweep_one(lease).await {
				Ok(true) => report.reclaimed += 1,
				Ok(false) => {}
				Err(e) => {
					report.failed += 1;
					metrics::counter!("warden_sweep_failures_total", "registry" => "lease").increment(1);
					warn!(owner = %lease.owner, channel = %lease.channel, error = %e, "lease sweep failed; retrying next tick");
				}
			}
		}

		if report.reclaimed > 0 {
			metrics::counter!("warden_leases_reclaimed_total").increment(report.reclaimed as u64);
		}
		self.publish_gauge();
		report
	}

	async fn sweep_one(&self, lease: VoiceLease) -> std::result::Result<bool, GatewayError> {
		let _guard = self.locks.lock(lease.owner).await;
		if !self.holds(lease) {
			debug!(owner = %lease.owner, channel = %lease.channel, "lease changed since snapshot; skipping");
			return Ok(false);
		}

		let removal = match self.gateway.channel_occupant_count(lease.channel).await {
			Ok(0) => self.gateway.delete_channel(lease.channel).await.tolerate_not_found()?,
			Ok(occupants) => {
				debug!(owner = %lease.owner, channel = %lease.channel, occupants, "voice lease in use");
				return Ok(false);
			}
			Err(GatewayError::NotFound) => Removal::AlreadyGone,
			Err(e) => return Err(e),
		};

		let removed = self.remove_if_held(lease);
		if removed {
			info!(owner = %lease.owner, channel = %lease.channel, %removal, "abandoned voice lease reclaimed");
		}
		Ok(removed)
	}

	pub fn lease_of(&self, owner: UserId) -> Option<ChannelId> {
		self.leases.lock().get(&owner).copied()
	}

	pub fn len(&self) -> usize {
		self.leases.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Point-in-time copy of every lease, ordered by owner.
	pub fn snapshot(&self) -> Vec<VoiceLease> {
		let mut leases: Vec<VoiceLease> = self
			.leases
			.lock()
			.iter()
			.map(|(owner, channel)| VoiceLease {
				owner: *owner,
				channel: *channel,
			})
			.collect();
		leases.sort_by_key(|l| l.owner);
		leases
	}

	fn holds(&self, lease: VoiceLease) -> bool {
		self.leases.lock().get(&lease.owner) == Some(&lease.channel)
	}

	fn remove_if_held(&self, lease: VoiceLease) -> bool {
		let mut leases = self.leases.lock();
		if leases.get(&lease.owner) == Some(&lease.channel) {
			leases.remove(&lease.owner);
			true
		} else {
			false
		}
	}

	fn channel_name(&self, requested: &str) -> Result<String> {
		let requested = requested.trim();
		if requested.is_empty() {
			return Err(Error::InvalidArgument("Channel name cannot be empty.".to_string()));
		}
		let name = format!("{}{}", self.cfg.name_prefix, requested);
		if name.chars().count() > MAX_CHANNEL_NAME_LEN {
			return Err(Error::InvalidArgument(format!(
				"Channel name must be at most {MAX_CHANNEL_NAME_LEN} characters."
			)));
		}
		Ok(name)
	}

	fn publish_gauge(&self) {
		metrics::gauge!("warden_active_leases").set(self.len() as f64);
	}
}
