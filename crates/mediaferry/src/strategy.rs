// Copyright 2026 Mediaferry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Strategy Catalog: ordered, read-only extraction profiles.
//!
//! The catalog order encodes which client identity is currently least likely
//! to be rejected by the remote service. Reordering the table changes the
//! fallback sequence without touching orchestration code.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

const IOS_SAFARI_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
                             AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 \
                             Mobile/15E148 Safari/604.1";

const ANDROID_CHROME_UA: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) \
                                 AppleWebKit/537.36 (KHTML, like Gecko) \
                                 Chrome/131.0.0.0 Mobile Safari/537.36";

const DESKTOP_CHROME_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                                 AppleWebKit/537.36 (KHTML, like Gecko) \
                                 Chrome/131.0.0.0 Safari/537.36";

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("failed to read strategy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid strategy file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("strategy catalog is empty")]
    Empty,

    #[error("duplicate strategy name: {0}")]
    DuplicateName(String),
}

/// Network egress for one strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EgressPolicy {
    /// Connect directly, even when a proxy is configured.
    Direct,
    /// Route through the process-wide proxy if one is configured.
    #[default]
    ConfiguredProxy,
}

/// Retry budgets handed to the extractor for a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBudget {
    pub retries: u32,
    pub fragment_retries: u32,
    pub file_access_retries: u32,
    pub extractor_retries: u32,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self {
            retries: 15,
            fragment_retries: 15,
            file_access_retries: 10,
            extractor_retries: 10,
        }
    }
}

/// Pacing between requests inside one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepPolicy {
    pub min_interval_secs: u32,
    pub max_interval_secs: u32,
    pub request_interval_secs: u32,
}

impl Default for SleepPolicy {
    fn default() -> Self {
        Self {
            min_interval_secs: 2,
            max_interval_secs: 8,
            request_interval_secs: 1,
        }
    }
}

/// One immutable extraction configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    /// Sent verbatim on every request of the attempt.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Sub-client aliases presented to the extractor, in order.
    #[serde(default)]
    pub player_clients: Vec<String>,
    #[serde(default)]
    pub player_skip: Vec<String>,
    #[serde(default)]
    pub retry: RetryBudget,
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout_secs: u32,
    #[serde(default)]
    pub sleep: Option<SleepPolicy>,
    #[serde(default)]
    pub geo_bypass_country: Option<String>,
    #[serde(default = "default_true")]
    pub check_certificates: bool,
    #[serde(default)]
    pub egress: EgressPolicy,
}

fn default_socket_timeout() -> u32 {
    90
}

fn default_true() -> bool {
    true
}

fn browser_headers(user_agent: &str, mobile: bool) -> BTreeMap<String, String> {
    let mut h = BTreeMap::new();
    h.insert("User-Agent".into(), user_agent.into());
    h.insert(
        "Accept".into(),
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".into(),
    );
    h.insert("Accept-Language".into(), "en-US,en;q=0.9".into());
    h.insert("DNT".into(), "1".into());
    h.insert("Sec-Fetch-Dest".into(), "document".into());
    h.insert("Sec-Fetch-Mode".into(), "navigate".into());
    h.insert("Sec-Fetch-Site".into(), "none".into());
    h.insert("Sec-Fetch-User".into(), "?1".into());
    h.insert("Upgrade-Insecure-Requests".into(), "1".into());
    if mobile {
        h.insert("Sec-CH-UA-Mobile".into(), "?1".into());
    }
    h
}

impl Strategy {
    fn profile(name: &str, user_agent: &str, mobile: bool, clients: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            headers: browser_headers(user_agent, mobile),
            player_clients: clients.iter().map(|c| c.to_string()).collect(),
            player_skip: vec!["webpage".into(), "configs".into()],
            retry: RetryBudget::default(),
            socket_timeout_secs: default_socket_timeout(),
            sleep: Some(SleepPolicy::default()),
            geo_bypass_country: Some("US".into()),
            check_certificates: false,
            egress: EgressPolicy::ConfiguredProxy,
        }
    }

    /// `User-Agent` of the header profile, if any.
    pub fn user_agent(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("user-agent"))
            .map(|(_, v)| v.as_str())
    }
}

/// Ordered list of strategies. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyCatalog {
    strategies: Vec<Strategy>,
}

impl StrategyCatalog {
    /// Validate and wrap a strategy list. Names must be unique.
    pub fn new(strategies: Vec<Strategy>) -> Result<Self, CatalogError> {
        if strategies.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut seen = HashSet::new();
        for s in &strategies {
            if !seen.insert(s.name.as_str()) {
                return Err(CatalogError::DuplicateName(s.name.clone()));
            }
        }
        Ok(Self { strategies })
    }

    /// Default table: mobile app identities first, desktop browser last.
    pub fn builtin() -> Self {
        let mut desktop = Strategy::profile("desktop-web", DESKTOP_CHROME_UA, false, &["web"]);
        desktop.player_skip.clear();
        let mut direct = desktop.clone();
        direct.name = "desktop-web-direct".into();
        direct.egress = EgressPolicy::Direct;

        Self {
            strategies: vec![
                Strategy::profile("ios-app", IOS_SAFARI_UA, true, &["ios"]),
                Strategy::profile("android-app", ANDROID_CHROME_UA, true, &["android"]),
                Strategy::profile("mobile-web", IOS_SAFARI_UA, true, &["mweb"]),
                desktop,
                direct,
            ],
        }
    }

    /// Load a catalog from a JSON file: `{"strategies": [...]}`.
    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let parsed: StrategyCatalog = serde_json::from_str(raw)?;
        Self::new(parsed.strategies)
    }

    /// First strategy in catalog order whose index is not in `attempted`.
    pub fn next(&self, attempted: &[usize]) -> Option<(usize, &Strategy)> {
        self.strategies
            .iter()
            .enumerate()
            .find(|(idx, _)| !attempted.contains(idx))
    }

    pub fn get(&self, index: usize) -> Option<&Strategy> {
        self.strategies.get(index)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Strategy> {
        self.strategies.iter()
    }
}
