#![forbid(unsafe_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::State;
use axum::http::StatusCode;

use crate::server::state::AppState;

#[derive(Clone, Default)]
pub struct HealthState {
	ready: Arc<AtomicBool>,
}

impl HealthState {
	pub fn new() -> Self {
		Self {
			ready: Arc::new(AtomicBool::new(false)),
		}
	}

	pub fn mark_ready(&self) {
		self.ready.store(true, Ordering::Relaxed);
	}

	pub fn is_ready(&self) -> bool {
		self.ready.load(Ordering::Relaxed)
	}
}

pub async fn healthz() -> &'static str {
	"ok"
}

pub async fn readyz(State(state): State<AppState>) -> (StatusCode, &'static str) {
	if state.health.is_ready() {
		(StatusCode::OK, "ready")
	} else {
		(StatusCode::SERVICE_UNAVAILABLE, "not-ready")
	}
}
