#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use serde::Deserialize;
use tracing::{debug, info, warn};
use warden_platform::SecretString;
use warden_platform::discord::DEFAULT_API_BASE;

pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;
pub const MIN_RECONCILE_INTERVAL_SECS: u64 = 1;

/// Dev-only in-memory platform flag.
pub const WARDEN_ENABLE_MEMORY_GATEWAY_ENV: &str = "WARDEN_ENABLE_MEMORY_GATEWAY";

fn warden_home() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".warden"))
}

/// Default config path: `~/.warden/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	Ok(warden_home()?.join("config.toml"))
}

/// Default role store path: `~/.warden/roles.json`.
pub fn default_role_store_path() -> anyhow::Result<PathBuf> {
	Ok(warden_home()?.join("roles.json"))
}

/// Load the bot config from TOML and env overrides.
pub fn load_bot_config_from_path(path: &Path) -> anyhow::Result<BotConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = BotConfig::from_file(file_cfg);
	apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());

	if cfg.role_store_path.is_none() {
		cfg.role_store_path = Some(default_role_store_path()?);
	}

	Ok(cfg)
}

#[derive(Debug, Clone)]
pub struct BotConfig {
	pub discord: DiscordSettings,
	pub reconcile_interval: Duration,
	/// Prepended to every created voice channel name.
	pub voice_name_prefix: String,
	/// Creator-role store location; resolved to the default when unset.
	pub role_store_path: Option<PathBuf>,
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
	/// Optional health/readiness HTTP bind address (host:port).
	pub health_bind: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DiscordSettings {
	/// Bot token.
	pub token: Option<SecretString>,
	pub api_base: String,
	pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	discord: FileDiscordSettings,

	#[serde(default)]
	reconcile: FileReconcileSettings,

	#[serde(default)]
	voice: FileVoiceSettings,

	#[serde(default)]
	storage: FileStorageSettings,

	#[serde(default)]
	server: FileServerSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileDiscordSettings {
	token: Option<String>,
	api_base: Option<String>,
	user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileReconcileSettings {
	interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileVoiceSettings {
	name_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileStorageSettings {
	role_store_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileServerSettings {
	metrics_bind: Option<String>,
	health_bind: Option<String>,
}

fn reconcile_interval(secs: u64) -> Duration {
	if secs < MIN_RECONCILE_INTERVAL_SECS {
		warn!(
			secs,
			min = MIN_RECONCILE_INTERVAL_SECS,
			"reconcile interval below minimum; clamping"
		);
	}
	Duration::from_secs(secs.max(MIN_RECONCILE_INTERVAL_SECS))
}

impl BotConfig {
	fn from_file(file: FileConfig) -> Self {
		Self {
			discord: DiscordSettings {
				token: file.discord.token.filter(|s| !s.trim().is_empty()).map(SecretString::new),
				api_base: file
					.discord
					.api_base
					.filter(|s| !s.trim().is_empty())
					.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
				user_agent: file.discord.user_agent.filter(|s| !s.trim().is_empty()),
			},
			reconcile_interval: reconcile_interval(
				file.reconcile.interval_secs.unwrap_or(DEFAULT_RECONCILE_INTERVAL_SECS),
			),
			// An empty prefix is allowed; only absence means default.
			voice_name_prefix: file
				.voice
				.name_prefix
				.unwrap_or_else(|| warden_core::lease::DEFAULT_VOICE_NAME_PREFIX.to_string()),
			role_store_path: file
				.storage
				.role_store_path
				.filter(|s| !s.trim().is_empty())
				.map(PathBuf::from),
			metrics_bind: file.server.metrics_bind.filter(|s| !s.trim().is_empty()),
			health_bind: file.server.health_bind.filter(|s| !s.trim().is_empty()),
		}
	}
}

pub fn parse_env_bool(v: &str) -> Option<bool> {
	match v.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn apply_env_overrides(cfg: &mut BotConfig, env: impl Fn(&str) -> Option<String>) {
	let non_empty = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

	if let Some(v) = non_empty("WARDEN_DISCORD_TOKEN") {
		cfg.discord.token = Some(SecretString::new(v));
		info!("discord config: token overridden by env");
	}

	if let Some(v) = non_empty("WARDEN_DISCORD_API_BASE") {
		cfg.discord.api_base = v;
		debug!("discord config: api_base overridden by env");
	}

	if let Some(v) = non_empty("WARDEN_RECONCILE_INTERVAL_SECS") {
		match v.parse::<u64>() {
			Ok(secs) => {
				cfg.reconcile_interval = reconcile_interval(secs);
				debug!("reconcile config: interval overridden by env");
			}
			Err(e) => warn!(error = %e, value = %v, "ignoring invalid WARDEN_RECONCILE_INTERVAL_SECS"),
		}
	}

	if let Some(v) = env("WARDEN_VOICE_NAME_PREFIX") {
		cfg.voice_name_prefix = v;
		debug!("voice config: name_prefix overridden by env");
	}

	if let Some(v) = non_empty("WARDEN_ROLE_STORE_PATH") {
		cfg.role_store_path = Some(PathBuf::from(v));
		debug!("storage config: role_store_path overridden by env");
	}

	if let Some(v) = non_empty("WARDEN_METRICS_BIND") {
		cfg.metrics_bind = Some(v);
		debug!("server config: metrics_bind overridden by env");
	}

	if let Some(v) = non_empty("WARDEN_HEALTH_BIND") {
		cfg.health_bind = Some(v);
		debug!("server config: health_bind overridden by env");
	}

	if cfg.discord.token.is_none() {
		warn!("discord config: no bot token configured");
	}
}
