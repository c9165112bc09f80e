//! httpq runtime metrics.
//!
//! Process-wide counters for request lifecycle, body bytes and completion
//! dispatch, registered with metriken so any exposition layer picks them
//! up. A host is single-threaded, so plain (unsharded) counters suffice.

use metriken::{Counter, Gauge, metric};

// ── Request lifecycle ────────────────────────────────────────────

#[metric(
    name = "httpq/requests/accepted",
    description = "Requests received from the kernel queue"
)]
pub static REQUESTS_ACCEPTED: Counter = Counter::new();

#[metric(
    name = "httpq/requests/released",
    description = "Request contexts released"
)]
pub static REQUESTS_RELEASED: Counter = Counter::new();

#[metric(
    name = "httpq/requests/active",
    description = "Request contexts currently allocated"
)]
pub static REQUESTS_ACTIVE: Gauge = Gauge::new();

// ── Bytes ────────────────────────────────────────────────────────

#[metric(
    name = "httpq/bytes/received",
    description = "Request body bytes received"
)]
pub static BYTES_RECEIVED: Counter = Counter::new();

#[metric(name = "httpq/bytes/sent", description = "Response bytes sent")]
pub static BYTES_SENT: Counter = Counter::new();

// ── Dispatch ─────────────────────────────────────────────────────

#[metric(
    name = "httpq/completions/dispatched",
    description = "Queued completions dispatched"
)]
pub static COMPLETIONS_DISPATCHED: Counter = Counter::new();

#[metric(
    name = "httpq/completions/stale",
    description = "Completions dropped because their request was already released"
)]
pub static COMPLETIONS_STALE: Counter = Counter::new();

// ── Replenishment ────────────────────────────────────────────────

#[metric(
    name = "httpq/accept/starved",
    description = "Replenishment attempts that could not allocate a request context"
)]
pub static ACCEPT_STARVED: Counter = Counter::new();
