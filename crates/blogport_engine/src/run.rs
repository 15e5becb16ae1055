use blogport_core::{Document, RunConfig};
use port_logging::{port_info, port_warn};

use crate::persist::ensure_output_dir;
use crate::pool::HostPool;
use crate::rewrite::localize_post;
use crate::types::{MigrateError, RunStats};

/// Drives one migration run: iterates posts in document order, applies the
/// `skip_until` gate, and localizes each post's images to completion before
/// moving on. The document is mutated in place; on a fatal error the posts
/// rewritten so far stay rewritten and the error propagates.
pub struct RunController {
    config: RunConfig,
}

impl RunController {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, document: &mut Document) -> Result<RunStats, MigrateError> {
        ensure_output_dir(&self.config.output_dir)?;
        let mut pool = HostPool::new(&self.config);
        let mut stats = RunStats::default();

        let result = self.process_posts(&mut pool, document, &mut stats).await;
        // Best-effort release even when a post failed.
        pool.close_all();
        result.map(|()| stats)
    }

    async fn process_posts(
        &self,
        pool: &mut HostPool,
        document: &mut Document,
        stats: &mut RunStats,
    ) -> Result<(), MigrateError> {
        let mut gate = self.config.skip_until.as_deref();
        for post in document.data.posts.iter_mut() {
            if let Some(marker) = gate {
                if post.slug != marker {
                    port_info!("skipping post {} (resuming at {marker})", post.slug);
                    stats.posts_gated += 1;
                    continue;
                }
                gate = None;
            }
            port_info!("localizing images for post {}", post.slug);
            localize_post(pool, &self.config, post, stats).await?;
            stats.posts_processed += 1;
        }
        if let Some(marker) = gate {
            port_warn!("skip_until slug {marker:?} matched no post; nothing was processed");
        }
        Ok(())
    }
}
