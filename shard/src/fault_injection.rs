use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use axum::{
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

use crate::state::ShardState;

/// Fault injection state for testing
#[derive(Debug, Default)]
pub struct FaultInjector {
    pub fail_store_once: AtomicBool,
    pub fail_store_always: AtomicBool,

    pub fail_fetch_once: AtomicBool,
    pub fail_fetch_always: AtomicBool,

    pub inject_latency_ms: AtomicU64,
}

fn take_flag(once: &AtomicBool, always: &AtomicBool) -> bool {
    if always.load(Ordering::Relaxed) {
        return true;
    }
    once.swap(false, Ordering::Relaxed)
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_fail_store(&self) -> bool {
        take_flag(&self.fail_store_once, &self.fail_store_always)
    }

    pub fn should_fail_fetch(&self) -> bool {
        take_flag(&self.fail_fetch_once, &self.fail_fetch_always)
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.inject_latency_ms.load(Ordering::Relaxed))
    }

    pub async fn apply_latency(&self) {
        let latency = self.latency();
        if !latency.is_zero() {
            sleep(latency).await;
        }
    }

    pub fn reset(&self) {
        self.fail_store_once.store(false, Ordering::Relaxed);
        self.fail_store_always.store(false, Ordering::Relaxed);
        self.fail_fetch_once.store(false, Ordering::Relaxed);
        self.fail_fetch_always.store(false, Ordering::Relaxed);
        self.inject_latency_ms.store(0, Ordering::Relaxed);
    }
}

#[derive(Deserialize, Debug)]
pub struct FaultQuery {
    #[serde(default)]
    pub once: bool,
    #[serde(default)]
    pub always: bool,
    #[serde(default)]
    pub latency_ms: Option<u64>,
}

/// POST /admin/fail/store?once=true -> next store returns 500.
pub async fn fail_store(
    Query(params): Query<FaultQuery>,
    State(ctx): State<ShardState>,
) -> StatusCode {
    let faults = &ctx.fault_injector;
    if params.once {
        faults.fail_store_once.store(true, Ordering::Relaxed);
    }
    if params.always {
        faults.fail_store_always.store(true, Ordering::Relaxed);
    }
    info!(?params, "store fault armed");
    StatusCode::OK
}

/// POST /admin/fail/fetch?always=true -> every fetch returns 500.
pub async fn fail_fetch(
    Query(params): Query<FaultQuery>,
    State(ctx): State<ShardState>,
) -> StatusCode {
    let faults = &ctx.fault_injector;
    if params.once {
        faults.fail_fetch_once.store(true, Ordering::Relaxed);
    }
    if params.always {
        faults.fail_fetch_always.store(true, Ordering::Relaxed);
    }
    info!(?params, "fetch fault armed");
    StatusCode::OK
}

/// POST /admin/inject/latency?latency_ms=1000 -> delay every store and fetch.
pub async fn inject_latency(
    Query(params): Query<FaultQuery>,
    State(ctx): State<ShardState>,
) -> StatusCode {
    if let Some(latency_ms) = params.latency_ms {
        ctx.fault_injector
            .inject_latency_ms
            .store(latency_ms, Ordering::Relaxed);
    }
    StatusCode::OK
}

/// POST /admin/reset -> clear all faults
pub async fn reset_faults(State(ctx): State<ShardState>) -> StatusCode {
    ctx.fault_injector.reset();
    StatusCode::OK
}
