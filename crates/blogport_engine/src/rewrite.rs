//! Per-post card walk: localize every image card, rewrite its source to
//! the placeholder form, promote the first image to `feature_image`.

use std::path::Path;

use blogport_core::{
    filename_from_url, image_rel_path, placeholder_src, Card, Mobiledoc, Post, RunConfig,
};
use port_logging::port_debug;
use url::Url;

use crate::fetch::{localize_image, LocalizeError, LocalizeOutcome};
use crate::pool::HostPool;
use crate::types::{MigrateError, RunStats};

pub async fn localize_post(
    pool: &mut HostPool,
    config: &RunConfig,
    post: &mut Post,
    stats: &mut RunStats,
) -> Result<(), MigrateError> {
    let mut body = Mobiledoc::parse(&post.mobiledoc).map_err(|source| MigrateError::BadBody {
        slug: post.slug.clone(),
        source,
    })?;

    let mut feature_index: Option<usize> = None;
    let mut failure: Option<MigrateError> = None;
    for (index, card) in body.cards.iter_mut().enumerate() {
        let Card::Image(image) = card else { continue };

        match localize_card(pool, config, &post.slug, post.created_at, &image.src).await {
            Ok((outcome, new_src)) => {
                match outcome {
                    LocalizeOutcome::Fetched => stats.images_fetched += 1,
                    LocalizeOutcome::Refetched => stats.images_refetched += 1,
                    LocalizeOutcome::Verified => stats.images_verified += 1,
                    LocalizeOutcome::Trusted => stats.images_trusted += 1,
                }
                port_debug!("rewrote {} -> {new_src}", image.src);
                image.src = new_src;
                if feature_index.is_none() {
                    feature_index = Some(index);
                }
            }
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }

    if failure.is_none() {
        if let Some(index) = feature_index {
            if let Card::Image(image) = &body.cards[index] {
                post.feature_image = Some(image.src.clone());
            }
            if !config.duplicate_feature_img {
                // Rebuild the list rather than deleting mid-iteration.
                let cards = std::mem::take(&mut body.cards);
                body.cards = cards
                    .into_iter()
                    .enumerate()
                    .filter(|(position, _)| *position != index)
                    .map(|(_, card)| card)
                    .collect();
            }
        }
    }

    // Cards rewritten before a failure stay rewritten; their files are
    // already on disk.
    post.mobiledoc = body.render().map_err(|source| MigrateError::BadBody {
        slug: post.slug.clone(),
        source,
    })?;

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Localizes a single image card source; returns the action taken and the
/// placeholder-prefixed replacement source.
async fn localize_card(
    pool: &mut HostPool,
    config: &RunConfig,
    slug: &str,
    created_at: i64,
    src: &str,
) -> Result<(LocalizeOutcome, String), MigrateError> {
    let url = Url::parse(src).map_err(|_| MigrateError::MalformedReference {
        slug: slug.to_string(),
        src: src.to_string(),
    })?;
    let filename = filename_from_url(&url).ok_or_else(|| MigrateError::MalformedReference {
        slug: slug.to_string(),
        src: src.to_string(),
    })?;

    let rel = image_rel_path(slug, created_at, &filename, config.year_month_subdirs);
    let local_path = config.output_dir.join(&rel);

    let outcome = localize_image(pool, config.cache_policy(), &url, &local_path)
        .await
        .map_err(|err| into_migrate_error(err, &url, &local_path, slug))?;
    Ok((outcome, placeholder_src(&config.placeholder_prefix, &rel)))
}

fn into_migrate_error(
    err: LocalizeError,
    url: &Url,
    local_path: &Path,
    slug: &str,
) -> MigrateError {
    match err {
        LocalizeError::Collision {
            local_len,
            remote_len,
        } => MigrateError::CacheCollision {
            url: url.to_string(),
            local_path: local_path.to_path_buf(),
            slug: slug.to_string(),
            local_len,
            remote_len,
        },
        LocalizeError::Persist(source) => MigrateError::Persist(source),
        other => MigrateError::RemoteFetch {
            url: url.to_string(),
            slug: slug.to_string(),
            reason: other.to_string(),
        },
    }
}
