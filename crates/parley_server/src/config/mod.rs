#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, anyhow};
use parley_domain::SecretString;
use serde::Deserialize;
use tracing::info;

/// Default config path: `~/.parley/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".parley").join("config.toml"))
}

/// Load the server config from TOML and env overrides.
pub fn load_server_config_from_path(path: &Path) -> anyhow::Result<ServerConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ServerConfig::from_file(file_cfg);

	apply_env_overrides(&mut cfg);

	Ok(cfg)
}

/// Server config (v1).
#[derive(Debug, Clone)]
pub struct ServerConfig {
	pub server: ServerSettings,
	pub persistence: PersistenceSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
	/// HMAC secret for stateless access tokens. Without it every credential
	/// resolves to an anonymous identity.
	pub auth_hmac_secret: Option<SecretString>,
	/// Maximum number of queued frames per fan-out subscriber.
	pub subscriber_queue_capacity: usize,
	/// Default page size for paginated message listings.
	pub page_size: u32,
}

impl Default for ServerSettings {
	fn default() -> Self {
		Self {
			metrics_bind: None,
			auth_hmac_secret: None,
			subscriber_queue_capacity: 1024,
			page_size: 50,
		}
	}
}

#[derive(Debug, Clone)]
pub struct PersistenceSettings {
	/// SQLite database URL.
	pub database_url: String,
}

impl Default for PersistenceSettings {
	fn default() -> Self {
		Self {
			database_url: "sqlite:parley.db".to_string(),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	server: FileServerSettings,

	#[serde(default)]
	persistence: FilePersistenceSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileServerSettings {
	metrics_bind: Option<String>,
	auth_hmac_secret: Option<String>,
	subscriber_queue_capacity: Option<usize>,
	page_size: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FilePersistenceSettings {
	database_url: Option<String>,
}

impl ServerConfig {
	fn from_file(file: FileConfig) -> Self {
		let defaults = ServerSettings::default();

		Self {
			server: ServerSettings {
				metrics_bind: file.server.metrics_bind.filter(|s| !s.trim().is_empty()),
				auth_hmac_secret: file
					.server
					.auth_hmac_secret
					.filter(|s| !s.trim().is_empty())
					.map(SecretString::new),
				subscriber_queue_capacity: file
					.server
					.subscriber_queue_capacity
					.filter(|v| *v > 0)
					.unwrap_or(defaults.subscriber_queue_capacity),
				page_size: file.server.page_size.filter(|v| *v > 0).unwrap_or(defaults.page_size),
			},
			persistence: PersistenceSettings {
				database_url: file
					.persistence
					.database_url
					.filter(|s| !s.trim().is_empty())
					.unwrap_or_else(|| PersistenceSettings::default().database_url),
			},
		}
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

fn apply_env_overrides(cfg: &mut ServerConfig) {
	if let Ok(v) = std::env::var("PARLEY_AUTH_HMAC_SECRET") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.auth_hmac_secret = Some(SecretString::new(v));
			info!("server auth: auth_hmac_secret overridden by env");
		}
	}

	if let Ok(v) = std::env::var("PARLEY_METRICS_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.metrics_bind = Some(v);
			info!("server config: metrics_bind overridden by env");
		}
	}

	if let Ok(v) = std::env::var("PARLEY_SUBSCRIBER_QUEUE_CAPACITY")
		&& let Ok(capacity) = v.trim().parse::<usize>()
		&& capacity > 0
	{
		cfg.server.subscriber_queue_capacity = capacity;
		info!(capacity, "server config: subscriber_queue_capacity overridden by env");
	}

	if let Ok(v) = std::env::var("PARLEY_PAGE_SIZE")
		&& let Ok(page_size) = v.trim().parse::<u32>()
		&& page_size > 0
	{
		cfg.server.page_size = page_size;
		info!(page_size, "server config: page_size overridden by env");
	}

	if let Ok(v) = std::env::var("PARLEY_DATABASE_URL") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.persistence.database_url = v;
			info!("persistence: database_url overridden by env");
		}
	}
}
