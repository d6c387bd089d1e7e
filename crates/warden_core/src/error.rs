#![forbid(unsafe_code)]

use std::path::PathBuf;

use thiserror::Error;
use warden_domain::{ChannelId, GuildId, PayloadError, RoleId, UserId};
use warden_platform::GatewayError;

/// Errors surfaced to the command-dispatch layer.
///
/// The first four are the caller-facing lifecycle errors; `Gateway` is the
/// generic failure of a command whose platform call did not succeed.
#[derive(Debug, Error)]
pub enum Error {
	#[error("user {owner} already holds a voice lease")]
	AlreadyLeased { owner: UserId },

	#[error("user {owner} holds no voice lease")]
	NoLease { owner: UserId },

	#[error("caller is not allowed to create voice channels")]
	Unauthorized,

	#[error("no sticky configured for channel {channel}")]
	NoSticky { channel: ChannelId },

	#[error("administrator permission required")]
	AdminRequired,

	#[error("guild {guild} has no creator role configured")]
	SetupRequired { guild: GuildId },

	#[error("role {role} does not exist")]
	UnknownRole { role: RoleId },

	#[error("role {role} cannot be used as creator role")]
	RoleNotAssignable { role: RoleId },

	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	#[error(transparent)]
	Payload(#[from] PayloadError),

	#[error(transparent)]
	Store(#[from] StoreError),

	#[error("platform call failed: {0}")]
	Gateway(#[from] GatewayError),
}

impl Error {
	/// Short reply suitable for showing to the invoking user.
	pub fn user_message(&self) -> String {
		match self {
			Self::AlreadyLeased { .. } => "You already have a VC!".to_string(),
			Self::NoLease { .. } => "You have no VC.".to_string(),
			Self::Unauthorized => "You don't have permission.".to_string(),
			Self::NoSticky { .. } => "No sticky to remove.".to_string(),
			Self::AdminRequired => "Admin only.".to_string(),
			Self::SetupRequired { .. } => "Bot not set up yet. Use /setup.".to_string(),
			Self::UnknownRole { .. } => "That role does not exist.".to_string(),
			Self::RoleNotAssignable { .. } => "That role cannot be used.".to_string(),
			Self::InvalidArgument(msg) => msg.clone(),
			Self::Payload(e) => format!("Invalid sticky: {e}."),
			Self::Store(_) | Self::Gateway(_) => "Something went wrong, try again later.".to_string(),
		}
	}
}

/// Role store persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("role store io error at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("role store json error at {path}: {source}")]
	Json {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("unsupported role store schema version {found} (expected {expected})")]
	UnsupportedSchema { found: u32, expected: u32 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn caller_facing_messages() {
		assert_eq!(
			Error::AlreadyLeased { owner: UserId::new(1) }.user_message(),
			"You already have a VC!"
		);
		assert_eq!(Error::NoLease { owner: UserId::new(1) }.user_message(), "You have no VC.");
		assert_eq!(
			Error::SetupRequired { guild: GuildId::new(1) }.user_message(),
			"Bot not set up yet. Use /setup."
		);
	}

	#[test]
	fn gateway_failures_are_generic() {
		let err = Error::from(GatewayError::RateLimited { retry_after: None });
		assert_eq!(err.user_message(), "Something went wrong, try again later.");
		assert!(err.to_string().contains("rate limited"));
	}
}
