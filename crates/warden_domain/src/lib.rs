#![forbid(unsafe_code)]

mod payload;

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub use payload::{EmbedColor, MAX_EMBED_BODY_LEN, MAX_EMBED_TITLE_LEN, MAX_TEXT_LEN, PayloadError, StickyPayload};

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("invalid format: {0}")]
	InvalidFormat(String),
}

fn parse_snowflake(s: &str) -> Result<u64, ParseIdError> {
	let s = s.trim();
	if s.is_empty() {
		return Err(ParseIdError::Empty);
	}

	let raw: u64 = s
		.parse()
		.map_err(|_| ParseIdError::InvalidFormat(format!("expected a decimal snowflake, got {s:?}")))?;

	if raw == 0 {
		return Err(ParseIdError::InvalidFormat("snowflake must be non-zero".into()));
	}
	Ok(raw)
}

/// Platform snowflakes travel as decimal strings on the wire and in stored state.
macro_rules! snowflake_id {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
		pub struct $name(u64);

		impl $name {
			pub const fn new(raw: u64) -> Self {
				Self(raw)
			}

			pub const fn get(self) -> u64 {
				self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl FromStr for $name {
			type Err = ParseIdError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				parse_snowflake(s).map(Self)
			}
		}

		impl Serialize for $name {
			fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
			where
				S: Serializer,
			{
				serializer.collect_str(self)
			}
		}

		impl<'de> Deserialize<'de> for $name {
			fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
			where
				D: Deserializer<'de>,
			{
				let s = String::deserialize(deserializer)?;
				s.parse().map_err(serde::de::Error::custom)
			}
		}
	};
}

snowflake_id!(
	/// Guild (server) identifier. The guild's `@everyone` role shares this id.
	GuildId
);
snowflake_id!(
	/// User identifier; the key of a voice lease.
	UserId
);
snowflake_id!(
	/// Channel identifier (voice or text).
	ChannelId
);
snowflake_id!(
	/// Message identifier.
	MessageId
);
snowflake_id!(
	/// Role identifier.
	RoleId
);

impl GuildId {
	/// The `@everyone` role of this guild.
	pub const fn everyone_role(self) -> RoleId {
		RoleId(self.0)
	}
}
