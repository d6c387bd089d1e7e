#![forbid(unsafe_code)]

use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum characters in a plain text message.
pub const MAX_TEXT_LEN: usize = 2_000;
/// Maximum characters in an embed title.
pub const MAX_EMBED_TITLE_LEN: usize = 256;
/// Maximum characters in an embed description.
pub const MAX_EMBED_BODY_LEN: usize = 4_096;

/// Payload validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayloadError {
	#[error("message body must be non-empty")]
	EmptyBody,
	#[error("embed title must be non-empty")]
	EmptyTitle,
	#[error("{field} exceeds {max} characters")]
	TooLong { field: &'static str, max: usize },
}

/// 24-bit RGB embed colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbedColor(u32);

impl EmbedColor {
	/// Colour used when none (or an unparsable one) is given.
	pub const DEFAULT: EmbedColor = EmbedColor(0x2e_cc_71);

	pub const fn new(rgb: u32) -> Self {
		Self(rgb & 0x00ff_ffff)
	}

	pub const fn get(self) -> u32 {
		self.0
	}

	/// Parse `#RRGGBB` or `RRGGBB`.
	pub fn parse(s: &str) -> Option<Self> {
		let hex = s.trim().trim_start_matches('#');
		if hex.is_empty() || hex.len() > 6 {
			return None;
		}
		u32::from_str_radix(hex, 16).ok().map(Self::new)
	}

	/// Parse an optional user-supplied colour, falling back to [`EmbedColor::DEFAULT`].
	pub fn parse_or_default(s: Option<&str>) -> Self {
		s.and_then(Self::parse).unwrap_or(Self::DEFAULT)
	}
}

impl Default for EmbedColor {
	fn default() -> Self {
		Self::DEFAULT
	}
}

impl fmt::Display for EmbedColor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{:06x}", self.0)
	}
}

/// Content of a sticky announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StickyPayload {
	Text {
		body: String,
	},
	Embed {
		title: String,
		body: String,
		#[serde(default)]
		color: EmbedColor,
		#[serde(default)]
		image_ref: Option<String>,
	},
}

impl StickyPayload {
	/// Build a validated text payload.
	pub fn text(body: impl Into<String>) -> Result<Self, PayloadError> {
		let payload = Self::Text { body: body.into() };
		payload.validate()?;
		Ok(payload)
	}

	/// Build a validated embed payload. A blank `image_ref` is treated as absent.
	pub fn embed(
		title: impl Into<String>,
		body: impl Into<String>,
		color: EmbedColor,
		image_ref: Option<String>,
	) -> Result<Self, PayloadError> {
		let payload = Self::Embed {
			title: title.into(),
			body: body.into(),
			color,
			image_ref: image_ref.filter(|s| !s.trim().is_empty()),
		};
		payload.validate()?;
		Ok(payload)
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Self::Text { .. } => "text",
			Self::Embed { .. } => "embed",
		}
	}

	pub fn validate(&self) -> Result<(), PayloadError> {
		match self {
			Self::Text { body } => {
				if body.trim().is_empty() {
					return Err(PayloadError::EmptyBody);
				}
				check_len("text", body, MAX_TEXT_LEN)
			}
			Self::Embed { title, body, .. } => {
				if title.trim().is_empty() {
					return Err(PayloadError::EmptyTitle);
				}
				if body.trim().is_empty() {
					return Err(PayloadError::EmptyBody);
				}
				check_len("embed title", title, MAX_EMBED_TITLE_LEN)?;
				check_len("embed body", body, MAX_EMBED_BODY_LEN)
			}
		}
	}
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), PayloadError> {
	if value.chars().count() > max {
		return Err(PayloadError::TooLong { field, max });
	}
	Ok(())
}
