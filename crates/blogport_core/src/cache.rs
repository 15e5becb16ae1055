//! Caching decision engine.
//!
//! Pure functions: the engine crate supplies the local file length and, when
//! asked to, the remote content length from a HEAD request. No IO happens
//! here.

/// What the fetch step should do for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    /// Local file verified against the remote length; nothing to do.
    Skip,
    /// Local file trusted without contacting the remote server.
    SkipUnverified,
    /// No local file yet; download it.
    Fetch,
    /// Local file is stale or corrupt; download it again.
    Refetch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub overwrite_cached_imgs: bool,
    pub skip_cached_imgs: bool,
}

/// Outcome of the purely local half of the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalVerdict {
    Decided(CacheDecision),
    /// A remote length is needed; the caller issues the HEAD and finishes
    /// with [`compare_lengths`].
    CompareRemote { local_len: u64 },
}

/// Local size mismatch with overwrites disabled: a cache collision, fatal
/// for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeMismatch {
    pub local_len: u64,
    pub remote_len: u64,
}

/// First stage: decide from the local file alone where possible.
///
/// A zero-length file is always refetched; it is the footprint of an
/// interrupted prior download, and neither `skip_cached_imgs` nor a
/// disabled overwrite flag may mask it.
pub fn local_verdict(local_len: Option<u64>, policy: CachePolicy) -> LocalVerdict {
    match local_len {
        None => LocalVerdict::Decided(CacheDecision::Fetch),
        Some(0) => LocalVerdict::Decided(CacheDecision::Refetch),
        Some(_) if policy.skip_cached_imgs => {
            LocalVerdict::Decided(CacheDecision::SkipUnverified)
        }
        Some(local_len) => LocalVerdict::CompareRemote { local_len },
    }
}

/// Second stage, once the remote length is known.
pub fn compare_lengths(
    local_len: u64,
    remote_len: u64,
    policy: CachePolicy,
) -> Result<CacheDecision, SizeMismatch> {
    if local_len == remote_len {
        Ok(CacheDecision::Skip)
    } else if policy.overwrite_cached_imgs {
        Ok(CacheDecision::Refetch)
    } else {
        Err(SizeMismatch {
            local_len,
            remote_len,
        })
    }
}
