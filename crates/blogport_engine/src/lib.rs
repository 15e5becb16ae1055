//! Blogport engine: rate-limited fetching and document rewriting.
mod fetch;
mod persist;
mod pool;
mod rewrite;
mod run;
mod types;

pub use fetch::{localize_image, LocalizeError, LocalizeOutcome};
pub use persist::{ensure_output_dir, write_image, PersistError};
pub use pool::{HostPool, PoolError};
pub use rewrite::localize_post;
pub use run::RunController;
pub use types::{MigrateError, RunStats};
