#![forbid(unsafe_code)]

mod config;
mod server;
mod util;

use std::net::SocketAddr;
use std::sync::Arc;

use parley_store::Store;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::server::api::router;
use crate::server::chats::{ChatService, FollowBackPolicy};
use crate::server::health::HealthState;
use crate::server::messages::MessageService;
use crate::server::notify::{DisabledPush, Dispatcher};
use crate::server::registry::{GroupRegistry, RegistryConfig};
use crate::server::state::AppState;

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: parley_server [--bind host:port]\n\
\n\
Options:\n\
\t--bind    Bind address (default: 127.0.0.1:8803)\n\
\t--help   Show this help\n\
"
	);
	std::process::exit(2)
}

fn parse_args() -> SocketAddr {
	let mut bind = "127.0.0.1:8803".to_string();

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--bind" | "--listen" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--bind must be non-empty (expected host:port)");
					usage_and_exit();
				}
				bind = v;
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	bind.parse::<SocketAddr>().unwrap_or_else(|e| {
		eprintln!("invalid bind address {bind}: {e}");
		usage_and_exit();
	})
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,parley_server=debug".to_string());

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
				let tracer = tracer_provider.tracer("parley_server");
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();

	let bind_addr = parse_args();

	let config_path = crate::config::default_config_path()?;
	let server_cfg = crate::config::load_server_config_from_path(&config_path)?;
	info!(path = %config_path.display(), "loaded server config (toml + env overrides)");

	init_metrics(server_cfg.server.metrics_bind.as_deref());

	if server_cfg.server.auth_hmac_secret.is_none() {
		warn!("no auth_hmac_secret configured; every credential resolves to anonymous");
	}

	let store = Store::connect(&server_cfg.persistence.database_url).await?;
	info!(database_url = %server_cfg.persistence.database_url, "store ready");

	let registry = GroupRegistry::new(RegistryConfig {
		subscriber_queue_capacity: server_cfg.server.subscriber_queue_capacity,
	});

	let notifier = Dispatcher::new(store.clone(), registry.clone(), Arc::new(DisabledPush));
	let chats = ChatService::new(store.clone(), notifier.clone(), Arc::new(FollowBackPolicy));
	let messages = MessageService::new(store.clone());

	let health = HealthState::new();

	let state = AppState {
		store,
		registry,
		chats,
		messages,
		notifier,
		auth_hmac_secret: server_cfg.server.auth_hmac_secret.clone(),
		health: health.clone(),
		page_size: server_cfg.server.page_size,
	};

	let app = router(state);

	let listener = tokio::net::TcpListener::bind(bind_addr).await?;
	health.mark_ready();
	info!(bind = %bind_addr, "parley_server listening");

	axum::serve(listener, app).await?;

	Ok(())
}
