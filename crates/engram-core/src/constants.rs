/// Engram system version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum accepted content length in bytes.
pub const MAX_CONTENT_BYTES: usize = 64 * 1024;

/// Confirmation sentinel required for hard deletes.
pub const CONFIRMED: &str = "CONFIRMED";

/// Maximum notify payload size accepted by the channel, in bytes.
/// Mirrors the 8 KB limit of relational NOTIFY payloads.
pub const NOTIFY_PAYLOAD_LIMIT: usize = 7999;

/// Poll period of the channel listener thread.
pub const CHANNEL_POLL_INTERVAL_MS: u64 = 500;

/// Access-count saturation point for the relevance access signal:
/// `min(1, ln(1 + access_count) / ln(1 + ACCESS_SATURATION))`.
pub const ACCESS_SATURATION: u64 = 100;

/// Composite relevance scores are rescaled from [0,1] to [0,RELEVANCE_SCALE].
pub const RELEVANCE_SCALE: f64 = 10.0;

/// Maximum hierarchy depth of a tag (levels separated by ':').
pub const MAX_TAG_DEPTH: usize = 4;

/// Candidate pool size for the full-text prefilter stage of hybrid search.
pub const DEFAULT_HYBRID_PREFILTER_LIMIT: usize = 100;
