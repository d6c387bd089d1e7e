#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use warden_domain::{ChannelId, UserId};

/// Live map of which voice channel each user is connected to.
///
/// The platform's REST surface cannot list voice channel members, so the
/// event-delivery layer feeds this from voice state updates and the Discord
/// gateway answers occupancy queries from it.
#[derive(Debug, Clone, Default)]
pub struct VoiceOccupancy {
	inner: Arc<RwLock<HashMap<UserId, ChannelId>>>,
}

impl VoiceOccupancy {
	pub fn new() -> Self {
		Self::default()
	}

	/// Record that `user` is now in `channel` (`None` = disconnected). Returns the previous channel.
	pub fn observe(&self, user: UserId, channel: Option<ChannelId>) -> Option<ChannelId> {
		let mut map = self.inner.write();
		let previous = match channel {
			Some(channel) => map.insert(user, channel),
			None => map.remove(&user),
		};
		if previous != channel {
			debug!(%user, from = ?previous, to = ?channel, "voice occupancy changed");
		}
		previous
	}

	pub fn count(&self, channel: ChannelId) -> usize {
		self.inner.read().values().filter(|c| **c == channel).count()
	}

	pub fn occupants(&self, channel: ChannelId) -> Vec<UserId> {
		let mut users: Vec<UserId> = self
			.inner
			.read()
			.iter()
			.filter(|(_, c)| **c == channel)
			.map(|(u, _)| *u)
			.collect();
		users.sort();
		users
	}

	/// Drop every member of a deleted channel. Returns how many were removed.
	pub fn forget_channel(&self, channel: ChannelId) -> usize {
		let mut map = self.inner.write();
		let before = map.len();
		map.retain(|_, c| *c != channel);
		before - map.len()
	}

	/// Discard all state, e.g. before a full resync after reconnecting.
	pub fn clear(&self) {
		self.inner.write().clear();
	}
}
