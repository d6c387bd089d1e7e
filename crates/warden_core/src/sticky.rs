#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use warden_domain::{ChannelId, MessageId, StickyPayload};
use warden_platform::{GatewayError, GatewayResultExt, PlatformGateway, Removal};

use crate::error::{Error, Result};
use crate::keyed_lock::KeyedLocks;

/// A channel's pinned announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StickyRecord {
	pub channel: ChannelId,
	pub payload: StickyPayload,
	/// Most recently posted instance, if any.
	pub last_posted: Option<MessageId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
	/// The sticky is still the newest message.
	Current,
	/// The old instance was replaced by a fresh post.
	Reposted(MessageId),
}

/// Result of one sticky sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StickySweepReport {
	pub examined: usize,
	pub reposted: usize,
	/// Records dropped because their channel no longer exists.
	pub dropped: usize,
	pub failed: usize,
}

enum SweepStep {
	Skipped,
	Refreshed(RefreshOutcome),
	Dropped,
}

/// Owns the channel → sticky map and keeps each sticky the newest message.
pub struct StickyRegistry {
	gateway: Arc<dyn PlatformGateway>,
	records: Mutex<HashMap<ChannelId, StickyRecord>>,
	locks: KeyedLocks<ChannelId>,
}

impl std::fmt::Debug for StickyRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("StickyRegistry")
			.field("records", &self.records.lock().len())
			.finish_non_exhaustive()
	}
}

impl StickyRegistry {
	pub fn new(gateway: Arc<dyn PlatformGateway>) -> Self {
		Self {
			gateway,
			records: Mutex::new(HashMap::new()),
			locks: KeyedLocks::new(),
		}
	}

	/// Replace the channel's sticky and post it immediately.
	///
	/// The previous instance is deleted first. If that delete or the new post
	/// fails, the registry keeps its previous record and the error is returned.
	pub async fn set(&self, channel: ChannelId, payload: StickyPayload) -> Result<MessageId> {
		payload.validate()?;
		let _guard = self.locks.lock(channel).await;

		let previous = self.records.lock().get(&channel).and_then(|r| r.last_posted);
		if let Some(old) = previous {
			let removal = self.gateway.delete_message(channel, old).await.tolerate_not_found()?;
			debug!(%channel, message = %old, %removal, "previous sticky instance removed");
		}

		let posted = self.gateway.post_message(channel, &payload).await?;
		let kind = payload.kind();
		self.records.lock().insert(
			channel,
			StickyRecord {
				channel,
				payload,
				last_posted: Some(posted),
			},
		);
		self.publish_gauge();

		info!(%channel, message = %posted, kind, "sticky set");
		Ok(posted)
	}

	/// Remove the channel's sticky and its posted instance.
	pub async fn clear(&self, channel: ChannelId) -> Result<Removal> {
		let _guard = self.locks.lock(channel).await;

		let last_posted = self
			.records
			.lock()
			.get(&channel)
			.map(|r| r.last_posted)
			.ok_or(Error::NoSticky { channel })?;

		let removal = match last_posted {
			Some(message) => self.gateway.delete_message(channel, message).await.tolerate_not_found()?,
			None => Removal::AlreadyGone,
		};

		self.records.lock().remove(&channel);
		self.publish_gauge();

		info!(%channel, %removal, "sticky cleared");
		Ok(removal)
	}

	/// Re-assert the sticky given the channel's actual newest message.
	pub async fn refresh(&self, channel: ChannelId, current_last: Option<MessageId>) -> Result<RefreshOutcome> {
		let _guard = self.locks.lock(channel).await;
		self.refresh_locked(channel, current_last).await
	}

	async fn refresh_locked(&self, channel: ChannelId, current_last: Option<MessageId>) -> Result<RefreshOutcome> {
		let record = self.get(channel).ok_or(Error::NoSticky { channel })?;

		if record.last_posted.is_some() && record.last_posted == current_last {
			debug!(%channel, "sticky is current");
			return Ok(RefreshOutcome::Current);
		}

		if let Some(old) = record.last_posted {
			self.gateway.delete_message(channel, old).await.tolerate_not_found()?;
		}

		let posted = match self.gateway.post_message(channel, &record.payload).await {
			Ok(posted) => posted,
			Err(e) => {
				// The old instance is gone; make sure the next pass reposts.
				if let Some(r) = self.records.lock().get_mut(&channel) {
					r.last_posted = None;
				}
				return Err(e.into());
			}
		};

		if let Some(r) = self.records.lock().get_mut(&channel) {
			r.last_posted = Some(posted);
		}

		info!(%channel, superseded_by = ?current_last, message = %posted, "sticky reposted");
		Ok(RefreshOutcome::Reposted(posted))
	}

	/// Refresh every sticky, dropping those whose channel is gone.
	pub async fn sweep(&self) -> StickySweepReport {
		let mut report = StickySweepReport::default();

		for channel in self.channels() {
			report.examined += 1;
			match self.sweep_one(channel).await {
				Ok(SweepStep::Skipped) | Ok(SweepStep::Refreshed(RefreshOutcome::Current)) => {}
				Ok(SweepStep::Refreshed(RefreshOutcome::Reposted(_))) => report.reposted += 1,
				Ok(SweepStep::Dropped) => report.dropped += 1,
				Err(e) => {
					report.failed += 1;
					metrics::counter!("warden_sweep_failures_total", "registry" => "sticky").increment(1);
					warn!(%channel, error = %e, "sticky sweep failed; retrying next tick");
				}
			}
		}

		if report.reposted > 0 {
			metrics::counter!("warden_stickies_reposted_total").increment(report.reposted as u64);
		}
		if report.dropped > 0 {
			metrics::counter!("warden_stickies_dropped_total").increment(report.dropped as u64);
		}
		self.publish_gauge();
		report
	}

	async fn sweep_one(&self, channel: ChannelId) -> Result<SweepStep> {
		let _guard = self.locks.lock(channel).await;
		if !self.has_sticky(channel) {
			return Ok(SweepStep::Skipped);
		}

		let current_last = match self.gateway.last_message_id(channel).await {
			Ok(last) => last,
			Err(GatewayError::NotFound) => {
				self.drop_record(channel);
				return Ok(SweepStep::Dropped);
			}
			Err(e) => return Err(e.into()),
		};

		match self.refresh_locked(channel, current_last).await {
			// Channel deleted between the lookup and the repost.
			Err(Error::Gateway(GatewayError::NotFound)) => {
				self.drop_record(channel);
				Ok(SweepStep::Dropped)
			}
			other => other.map(SweepStep::Refreshed),
		}
	}

	fn drop_record(&self, channel: ChannelId) {
		self.records.lock().remove(&channel);
		debug!(%channel, "sticky channel gone; record dropped");
	}

	pub fn get(&self, channel: ChannelId) -> Option<StickyRecord> {
		self.records.lock().get(&channel).cloned()
	}

	pub fn has_sticky(&self, channel: ChannelId) -> bool {
		self.records.lock().contains_key(&channel)
	}

	pub fn len(&self) -> usize {
		self.records.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Point-in-time copy of the sticky channels, ordered.
	pub fn channels(&self) -> Vec<ChannelId> {
		let mut channels: Vec<ChannelId> = self.records.lock().keys().copied().collect();
		channels.sort();
		channels
	}

	fn publish_gauge(&self) {
		metrics::gauge!("warden_active_stickies").set(self.len() as f64);
	}
}
