#![forbid(unsafe_code)]
//! Reconciliation engine for ephemeral voice leases and sticky announcements.
//!
//! Commands mutate a registry and reflect the change on the platform before
//! returning. The [`ReconcileScheduler`] re-derives platform state from the
//! registries on a fixed interval, correcting drift caused by other actors.

pub mod access;
pub mod error;
pub mod keyed_lock;
pub mod lease;
pub mod scheduler;
pub mod sticky;
pub mod warden;

#[cfg(test)]
mod sticky_tests;
#[cfg(test)]
mod warden_tests;

pub use access::RoleStore;
pub use error::{Error, Result, StoreError};
pub use lease::{LeaseConfig, LeaseRegistry, LeaseRequest, LeaseSweepReport, VoiceLease};
pub use scheduler::{ReconcileScheduler, SchedulerConfig, SchedulerHandle, TickReport};
pub use sticky::{RefreshOutcome, StickyRecord, StickyRegistry, StickySweepReport};
pub use warden::{Caller, StickyChange, Warden};
