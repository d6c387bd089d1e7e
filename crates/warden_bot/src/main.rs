#![forbid(unsafe_code)]

mod config;
mod health;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, anyhow};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use warden_core::{LeaseConfig, RoleStore, SchedulerConfig, Warden};
use warden_platform::discord::{DiscordConfig, DiscordGateway};
use warden_platform::memory::MemoryGateway;
use warden_platform::{PlatformGateway, VoiceOccupancy};

use crate::config::{BotConfig, WARDEN_ENABLE_MEMORY_GATEWAY_ENV, parse_env_bool};
use crate::health::{HealthState, spawn_health_server};

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: warden_bot [--config <path>]\n\
\n\
Options:\n\
\t--config  Config file (default: ~/.warden/config.toml)\n\
\t--help    Show this help\n\
"
	);
	std::process::exit(2)
}

fn parse_args() -> Option<PathBuf> {
	let mut config_path = None;

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--config" | "-c" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--config must be non-empty");
					usage_and_exit();
				}
				config_path = Some(PathBuf::from(v));
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	config_path
}

fn init_tracing() {
	let filter =
		std::env::var("RUST_LOG").unwrap_or_else(|_| "info,warden_bot=debug,warden_core=debug".to_string());

	let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
		.ok()
		.map(|v| v.trim().to_string())
		.filter(|v| !v.is_empty());
	let base = tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(filter))
		.with(tracing_subscriber::fmt::layer().with_target(false));

	if let Some(endpoint) = otlp_endpoint {
		use opentelemetry::global;
		use opentelemetry::trace::TracerProvider as _;
		use opentelemetry_otlp::WithExportConfig;

		match opentelemetry_otlp::SpanExporter::builder()
			.with_tonic()
			.with_endpoint(endpoint.clone())
			.build()
		{
			Ok(exporter) => {
				let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
					.with_batch_exporter(exporter)
					.build();
				let tracer = tracer_provider.tracer("warden_bot");
				global::set_tracer_provider(tracer_provider);

				let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
				base.with(otel_layer).init();
				info!(endpoint = %endpoint, "otlp tracing enabled");
			}
			Err(e) => {
				base.init();
				warn!(error = %e, "failed to initialize otlp tracing");
			}
		}
	} else {
		base.init();
	}
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<std::net::SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
				.with_http_listener(addr)
				.install()
			{
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => {
			warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)");
		}
	}
}

fn build_gateway(cfg: &BotConfig, occupancy: VoiceOccupancy) -> anyhow::Result<Arc<dyn PlatformGateway>> {
	let memory_enabled = cfg!(debug_assertions)
		&& std::env::var(WARDEN_ENABLE_MEMORY_GATEWAY_ENV)
			.ok()
			.as_deref()
			.and_then(parse_env_bool)
			.unwrap_or(false);
	if memory_enabled {
		warn!(env = WARDEN_ENABLE_MEMORY_GATEWAY_ENV, "using in-memory platform; nothing reaches discord");
		return Ok(Arc::new(MemoryGateway::new()));
	}

	let token = cfg
		.discord
		.token
		.clone()
		.ok_or_else(|| anyhow!("discord token missing (set [discord].token or WARDEN_DISCORD_TOKEN)"))?;

	let mut discord = DiscordConfig::new(token).with_api_base(cfg.discord.api_base.clone());
	if let Some(user_agent) = &cfg.discord.user_agent {
		discord.user_agent = user_agent.clone();
	}

	let gateway = DiscordGateway::new(&discord, occupancy).context("build discord gateway")?;
	info!(api_base = %discord.api_base, "discord gateway ready");
	Ok(Arc::new(gateway))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();

	let config_path = match parse_args() {
		Some(path) => path,
		None => config::default_config_path()?,
	};
	let cfg = config::load_bot_config_from_path(&config_path)?;
	info!(path = %config_path.display(), "loaded bot config (toml + env overrides)");

	init_metrics(cfg.metrics_bind.as_deref());

	let health_state = HealthState::new();
	if let Some(bind) = cfg.health_bind.as_deref() {
		match bind.parse::<std::net::SocketAddr>() {
			Ok(addr) => spawn_health_server(addr, health_state.clone()),
			Err(e) => warn!(error = %e, %bind, "invalid health bind address (expected host:port)"),
		}
	}

	let role_store_path = match cfg.role_store_path.clone() {
		Some(path) => path,
		None => config::default_role_store_path()?,
	};
	let roles = RoleStore::load(&role_store_path)
		.with_context(|| format!("load role store from {}", role_store_path.display()))?;

	// Fed by the event-delivery layer from voice state updates.
	let occupancy = VoiceOccupancy::new();
	let gateway = build_gateway(&cfg, occupancy)?;

	let warden = Warden::new(
		gateway,
		Arc::new(roles),
		LeaseConfig {
			name_prefix: cfg.voice_name_prefix.clone(),
		},
	);

	let scheduler = warden.scheduler().spawn(SchedulerConfig {
		interval: cfg.reconcile_interval,
	});
	health_state.mark_ready();
	info!(
		interval_secs = cfg.reconcile_interval.as_secs(),
		prefix = %cfg.voice_name_prefix,
		"warden_bot running"
	);

	tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
	info!("shutdown requested");

	health_state.mark_not_ready();
	scheduler.shutdown().await;
	info!(
		leases = warden.leases().len(),
		stickies = warden.stickies().len(),
		"warden_bot stopped"
	);
	Ok(())
}
