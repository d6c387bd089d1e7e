#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use warden_domain::{GuildId, RoleId};

use crate::error::StoreError;

pub const ROLE_STORE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct RoleFile {
	schema_version: u32,
	#[serde(default)]
	creator_roles: BTreeMap<GuildId, RoleId>,
}

/// Which role may create voice leases, per guild.
///
/// Loaded once at start; every change is written back before it takes effect.
#[derive(Debug)]
pub struct RoleStore {
	path: Option<PathBuf>,
	roles: Mutex<BTreeMap<GuildId, RoleId>>,
}

impl RoleStore {
	/// Non-persistent store.
	pub fn in_memory() -> Self {
		Self {
			path: None,
			roles: Mutex::new(BTreeMap::new()),
		}
	}

	/// Load from `path`; a missing file yields an empty store.
	pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();
		let roles = match std::fs::read_to_string(&path) {
			Ok(raw) => {
				let file: RoleFile = serde_json::from_str(&raw).map_err(|source| StoreError::Json {
					path: path.clone(),
					source,
				})?;
				if file.schema_version != ROLE_STORE_SCHEMA_VERSION {
					return Err(StoreError::UnsupportedSchema {
						found: file.schema_version,
						expected: ROLE_STORE_SCHEMA_VERSION,
					});
				}
				file.creator_roles
			}
			Err(e) if e.kind() == ErrorKind::NotFound => {
				debug!(path = %path.display(), "role store missing; starting empty");
				BTreeMap::new()
			}
			Err(source) => return Err(StoreError::Io { path, source }),
		};

		info!(path = %path.display(), guilds = roles.len(), "role store loaded");
		Ok(Self {
			path: Some(path),
			roles: Mutex::new(roles),
		})
	}

	pub fn path(&self) -> Option<&Path> {
		self.path.as_deref()
	}

	pub fn creator_role(&self, guild: GuildId) -> Option<RoleId> {
		self.roles.lock().get(&guild).copied()
	}

	/// Set the guild's creator role, returning the previous one.
	pub fn set_creator_role(&self, guild: GuildId, role: RoleId) -> Result<Option<RoleId>, StoreError> {
		let mut roles = self.roles.lock();
		let mut next = roles.clone();
		let previous = next.insert(guild, role);

		if let Some(path) = &self.path {
			persist(path, &next)?;
		}
		*roles = next;

		info!(%guild, %role, previous = ?previous, "creator role configured");
		Ok(previous)
	}

	pub fn len(&self) -> usize {
		self.roles.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

fn persist(path: &Path, roles: &BTreeMap<GuildId, RoleId>) -> Result<(), StoreError> {
	let file = RoleFile {
		schema_version: ROLE_STORE_SCHEMA_VERSION,
		creator_roles: roles.clone(),
	};
	let body = serde_json::to_string_pretty(&file).map_err(|source| StoreError::Json {
		path: path.to_path_buf(),
		source,
	})?;
	write_atomic(path, &body)
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
	StoreError::Io {
		path: path.to_path_buf(),
		source,
	}
}

/// Write to a sibling temp file, then rename over the destination.
fn write_atomic(path: &Path, body: &str) -> Result<(), StoreError> {
	let parent = path
		.parent()
		.filter(|dir| !dir.as_os_str().is_empty())
		.unwrap_or_else(|| Path::new("."));
	std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;

	let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("roles.json");
	let temp = parent.join(format!(".{file_name}.tmp-{}", std::process::id()));
	std::fs::write(&temp, body).map_err(|e| io_error(&temp, e))?;
	if let Err(e) = std::fs::rename(&temp, path) {
		let _ = std::fs::remove_file(&temp);
		return Err(io_error(path, e));
	}
	Ok(())
}
