//! Telemetry metric name constants.
//!
//! Consumers install their own `metrics` recorder (e.g. prometheus); without
//! a recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `mimir_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider`: upstream or embedding provider name (e.g. "openai")
//! - `status`: "ok" or "error"
//! - `operation`: "chat" or "embed"
//! - `mode`: harness pass, "cached" or "uncached"

/// Cache lookups answered from a stored entry.
pub const CACHE_HITS_TOTAL: &str = "mimir_cache_hits_total";

/// Cache lookups that fell through to upstream.
pub const CACHE_MISSES_TOTAL: &str = "mimir_cache_misses_total";

/// Number of entries held by a cache instance after the last write.
pub const CACHE_ENTRIES: &str = "mimir_cache_entries";

/// End-to-end `resolve` duration in seconds.
///
/// Labels: `outcome` ("hit" | "miss" | "error").
pub const RESOLVE_DURATION_SECONDS: &str = "mimir_resolve_duration_seconds";

/// Attempts against an external service (including retries).
///
/// Labels: `provider`, `operation` ("chat" | "embed"), `status` ("ok" | "error").
pub const UPSTREAM_REQUESTS_TOTAL: &str = "mimir_upstream_requests_total";

/// Retry attempts (not counting the initial request).
///
/// Labels: `provider`, `operation`.
pub const UPSTREAM_RETRIES_TOTAL: &str = "mimir_upstream_retries_total";

/// Harness rows processed.
///
/// Labels: `mode`, `status` ("correct" | "incorrect" | "failed").
pub const HARNESS_ROWS_TOTAL: &str = "mimir_harness_rows_total";
