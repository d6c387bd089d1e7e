#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-key async mutual exclusion.
///
/// Holders of the same key are serialized, including across `.await`; holders
/// of different keys never wait on each other. The outer map lock is only held
/// for the lookup, never across a suspension point.
#[derive(Debug)]
pub struct KeyedLocks<K> {
	slots: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
	fn default() -> Self {
		Self {
			slots: Mutex::new(HashMap::new()),
		}
	}
}

impl<K: Eq + Hash + Copy> KeyedLocks<K> {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
		let slot = {
			let mut slots = self.slots.lock();
			// Entries nobody holds or waits on can go.
			slots.retain(|k, slot| *k == key || Arc::strong_count(slot) > 1);
			Arc::clone(slots.entry(key).or_default())
		};
		slot.lock_owned().await
	}

	#[cfg(test)]
	fn slot_count(&self) -> usize {
		self.slots.lock().len()
	}
}
