use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::cache::CachePolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("rewrite rule must be \"<original-host> <replacement-host>\", got {0:?}")]
    BadRewriteRule(String),
}

/// Host-remap rules applied before any connection is opened.
///
/// Lookup is get-or-default: a host without a rule maps to itself. In
/// configuration files the map is written as repeated `"hostA hostB"` rule
/// strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostRewrites {
    rules: HashMap<String, String>,
}

impl Serialize for HostRewrites {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut rules: Vec<String> = self
            .rules
            .iter()
            .map(|(from, to)| format!("{from} {to}"))
            .collect();
        rules.sort();
        rules.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HostRewrites {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rules = Vec::<String>::deserialize(deserializer)?;
        Self::from_rules(&rules).map_err(serde::de::Error::custom)
    }
}

impl HostRewrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the map from `"hostA hostB"` rule strings.
    pub fn from_rules<I, S>(rules: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Self::new();
        for rule in rules {
            out.add_rule(rule.as_ref())?;
        }
        Ok(out)
    }

    /// Parses and installs a single `"hostA hostB"` rule.
    pub fn add_rule(&mut self, rule: &str) -> Result<(), ConfigError> {
        let mut parts = rule.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(from), Some(to), None) => {
                self.insert(from, to);
                Ok(())
            }
            _ => Err(ConfigError::BadRewriteRule(rule.to_string())),
        }
    }

    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.rules.insert(from.into(), to.into());
    }

    /// Returns the replacement for `host`, or `host` itself when no rule matches.
    pub fn resolve<'a>(&'a self, host: &'a str) -> &'a str {
        self.rules.get(host).map(String::as_str).unwrap_or(host)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Immutable run configuration, constructed once and passed to every
/// component that needs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Keep the promoted feature card in the card list (`true`) or remove it.
    pub duplicate_feature_img: bool,
    /// Per-host ceiling on outbound request issue rate. Non-positive
    /// values disable the ceiling.
    pub max_qps: f64,
    /// Image root on the local filesystem.
    pub output_dir: PathBuf,
    /// Re-download when the local size disagrees with the remote size.
    pub overwrite_cached_imgs: bool,
    /// Trust any existing non-empty local file without contacting the remote.
    pub skip_cached_imgs: bool,
    /// Insert `YYYY/MM` between the image root and the post slug.
    pub year_month_subdirs: bool,
    /// Original host -> replacement host, consulted before every connection.
    pub rewrites: HostRewrites,
    /// Pass posts through untouched until this slug is reached.
    pub skip_until: Option<String>,
    /// Marker prepended to rewritten image sources; the import step
    /// substitutes the final public base URL for it.
    pub placeholder_prefix: String,
    pub verbose: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            duplicate_feature_img: true,
            max_qps: 4.0,
            output_dir: PathBuf::from("images"),
            overwrite_cached_imgs: false,
            skip_cached_imgs: false,
            year_month_subdirs: true,
            rewrites: HostRewrites::new(),
            skip_until: None,
            placeholder_prefix: "__GHOST_URL__/content/images".to_string(),
            verbose: false,
        }
    }
}

impl RunConfig {
    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            overwrite_cached_imgs: self.overwrite_cached_imgs,
            skip_cached_imgs: self.skip_cached_imgs,
        }
    }

    /// Minimum interval between two requests issued to the same host.
    pub fn min_request_gap(&self) -> Duration {
        if self.max_qps > 0.0 {
            Duration::from_secs_f64(1.0 / self.max_qps)
        } else {
            Duration::ZERO
        }
    }
}
