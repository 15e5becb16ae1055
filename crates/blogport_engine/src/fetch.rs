//! Decision-driven image localization: one HEAD at most for the size
//! check, one GET at most for the bytes.

use std::fs;
use std::path::Path;

use blogport_core::{compare_lengths, local_verdict, CacheDecision, CachePolicy, LocalVerdict};
use futures_util::StreamExt;
use port_logging::{port_debug, port_warn};
use reqwest::header::CONTENT_LENGTH;
use thiserror::Error;
use url::Url;

use crate::persist::{write_image, PersistError};
use crate::pool::{HostPool, PoolError};

#[derive(Debug, Error)]
pub enum LocalizeError {
    #[error("local file is {local_len} bytes but remote reports {remote_len}")]
    Collision { local_len: u64, remote_len: u64 },
    #[error("remote did not report a content length")]
    NoRemoteLength,
    #[error("response truncated: expected {expected} bytes, received {actual}")]
    Truncated { expected: u64, actual: u64 },
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// What actually happened for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalizeOutcome {
    /// Downloaded for the first time.
    Fetched,
    /// Downloaded again over a stale or empty local file.
    Refetched,
    /// Skipped after the size check matched.
    Verified,
    /// Skipped on trust; remote never contacted.
    Trusted,
}

/// Makes the caching decision for `url` at `local_path` and carries it out.
pub async fn localize_image(
    pool: &mut HostPool,
    policy: CachePolicy,
    url: &Url,
    local_path: &Path,
) -> Result<LocalizeOutcome, LocalizeError> {
    let local_len = fs::metadata(local_path).ok().map(|meta| meta.len());

    let decision = match local_verdict(local_len, policy) {
        LocalVerdict::Decided(decision) => {
            if decision == CacheDecision::Refetch
                && (policy.skip_cached_imgs || !policy.overwrite_cached_imgs)
            {
                // Empty file from an interrupted earlier run; the flags
                // would normally have left it alone.
                port_warn!(
                    "zero-length cached file at {}, refetching",
                    local_path.display()
                );
            }
            decision
        }
        LocalVerdict::CompareRemote { local_len } => {
            let response = pool.head(url).await?;
            let remote_len = content_length(&response).ok_or(LocalizeError::NoRemoteLength)?;
            compare_lengths(local_len, remote_len, policy).map_err(|mismatch| {
                LocalizeError::Collision {
                    local_len: mismatch.local_len,
                    remote_len: mismatch.remote_len,
                }
            })?
        }
    };

    match decision {
        CacheDecision::Skip => {
            port_debug!("cache hit (size verified) for {url}");
            Ok(LocalizeOutcome::Verified)
        }
        CacheDecision::SkipUnverified => {
            port_debug!("cache hit (unverified) for {url}");
            Ok(LocalizeOutcome::Trusted)
        }
        CacheDecision::Fetch => {
            download(pool, url, local_path).await?;
            Ok(LocalizeOutcome::Fetched)
        }
        CacheDecision::Refetch => {
            download(pool, url, local_path).await?;
            Ok(LocalizeOutcome::Refetched)
        }
    }
}

async fn download(pool: &mut HostPool, url: &Url, local_path: &Path) -> Result<(), LocalizeError> {
    let response = pool.get(url).await?;
    let expected = content_length(&response);

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(PoolError::from)?;
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected {
        if expected != bytes.len() as u64 {
            return Err(LocalizeError::Truncated {
                expected,
                actual: bytes.len() as u64,
            });
        }
    }

    write_image(local_path, &bytes)?;
    port_debug!("wrote {} bytes to {}", bytes.len(), local_path.display());
    Ok(())
}

fn content_length(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}
