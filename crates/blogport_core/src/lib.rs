//! Blogport core: pure migration logic, no IO.
mod cache;
mod config;
mod model;
mod paths;

pub use cache::{compare_lengths, local_verdict, CacheDecision, CachePolicy, LocalVerdict, SizeMismatch};
pub use config::{ConfigError, HostRewrites, RunConfig};
pub use model::{Card, CardError, Document, DocumentData, ImageCard, Mobiledoc, Post};
pub use paths::{filename_from_url, image_rel_path, placeholder_src, year_month};
