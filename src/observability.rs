//! Metric names. Recorded through the `metrics` facade; the embedding
//! application installs whatever recorder/exporter it uses.

// ── Request-driven ──────────────────────────────────────────────

/// Counter: availability checks. Labels: outcome.
pub const AVAILABILITY_CHECKS_TOTAL: &str = "lodge_availability_checks_total";

/// Counter: alternative lodge searches (one per unavailable search).
pub const ALTERNATIVE_SEARCHES_TOTAL: &str = "lodge_alternative_searches_total";

/// Histogram: alternative search latency in seconds, list fetch included.
pub const ALTERNATIVE_SEARCH_DURATION_SECONDS: &str = "lodge_alternative_search_duration_seconds";

/// Counter: confirmed admin toggles. Labels: from, to.
pub const TOGGLES_TOTAL: &str = "lodge_toggles_total";

/// Counter: admin clicks dropped by a guard. Labels: reason.
pub const TOGGLES_IGNORED_TOTAL: &str = "lodge_toggles_ignored_total";

/// Counter: availability writes the repository did not commit.
pub const PERSISTENCE_FAILURES_TOTAL: &str = "lodge_persistence_failures_total";

// ── Durable store ───────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "lodge_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "lodge_wal_flush_batch_size";

/// Counter: WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "lodge_wal_compactions_total";
