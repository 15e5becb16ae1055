use std::path::PathBuf;

use blogport_core::CardError;
use thiserror::Error;

use crate::persist::PersistError;

/// Fatal errors that abort a migration run. Every variant carries enough
/// context for an operator to re-run with adjusted flags
/// (`overwrite_cached_imgs`, `skip_until`).
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error(
        "cache collision for {url} at {local_path:?} (post {slug}): \
         local file is {local_len} bytes, remote reports {remote_len}; \
         enable overwrite_cached_imgs to replace it"
    )]
    CacheCollision {
        url: String,
        local_path: PathBuf,
        slug: String,
        local_len: u64,
        remote_len: u64,
    },
    #[error("fetching {url} failed (post {slug}): {reason}")]
    RemoteFetch {
        url: String,
        slug: String,
        reason: String,
    },
    #[error("post {slug} references an unparsable image source {src:?}")]
    MalformedReference { slug: String, src: String },
    #[error("post {slug} has an unparsable body: {source}")]
    BadBody {
        slug: String,
        #[source]
        source: CardError,
    },
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Posts that went through image localization.
    pub posts_processed: usize,
    /// Posts passed through untouched by the `skip_until` gate.
    pub posts_gated: usize,
    /// Images downloaded for the first time.
    pub images_fetched: u64,
    /// Images downloaded again over a stale or empty local file.
    pub images_refetched: u64,
    /// Images skipped after a successful size check.
    pub images_verified: u64,
    /// Images skipped on trust, remote never contacted.
    pub images_trusted: u64,
}
