/*!
 * Structured Tracing
 * Subscriber setup and per-dispatch spans using the tracing crate
 *
 * Features:
 * - Env-filtered levels via RUST_LOG
 * - JSON-formatted logs for structured parsing
 * - One span per dispatch carrying cpu, pid and level
 */

use crate::core::types::{CpuId, Pid};
use crate::process::{Level as QueueLevel, Trap};
use std::time::Instant;
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - KERNEL_TRACE_JSON: Enable JSON output (default: false)
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("KERNEL_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .init();
        info!("Structured tracing initialized with JSON output");
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::NONE)
                    .compact(),
            )
            .init();
        info!("Structured tracing initialized");
    }
}

/// Dispatches running longer than this are reported
const SLOW_DISPATCH_MS: u128 = 10;

/// Span covering one context switch into a program and back
pub struct DispatchSpan {
    span: tracing::Span,
    start: Instant,
    pid: Pid,
}

impl DispatchSpan {
    pub fn new(cpu: CpuId, pid: Pid, level: QueueLevel) -> Self {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            cpu = cpu,
            pid = pid,
            level = %level,
            trap = tracing::field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
            pid,
        }
    }

    /// Enter the span while the program runs
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    /// Record why the program handed the CPU back
    pub fn record_trap(&self, trap: Trap) {
        self.span.record("trap", tracing::field::debug(trap));
    }
}

impl Drop for DispatchSpan {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let _entered = self.span.enter();
        if elapsed.as_millis() > SLOW_DISPATCH_MS {
            warn!(
                pid = self.pid,
                duration_ms = elapsed.as_millis() as u64,
                "slow dispatch: program held the CPU without trapping"
            );
        } else {
            debug!(
                pid = self.pid,
                duration_us = elapsed.as_micros() as u64,
                "dispatch completed"
            );
        }
    }
}

/// Helper to create a dispatch span
#[inline]
pub fn span_dispatch(cpu: CpuId, pid: Pid, level: QueueLevel) -> DispatchSpan {
    DispatchSpan::new(cpu, pid, level)
}
