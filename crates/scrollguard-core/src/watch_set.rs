use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque application identifier (Android package name, X11 `WM_CLASS`, macOS bundle ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(String);

impl AppId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AppId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AppId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Applications whose foreground use triggers escalating warnings.
///
/// Several IDs may share one display name (TikTok ships under two package
/// names). Sessions are keyed by `AppId`, so switching between two such
/// packages still starts a new session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchSet {
    targets: BTreeMap<AppId, String>,
}

impl WatchSet {
    #[must_use]
    pub fn new(targets: BTreeMap<AppId, String>) -> Self {
        Self { targets }
    }

    /// Build from plain string pairs, as read from the config file
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            targets: pairs
                .into_iter()
                .map(|(id, name)| (AppId::new(id), name.into()))
                .collect(),
        }
    }

    #[must_use]
    pub fn contains(&self, app_id: &AppId) -> bool {
        self.targets.contains_key(app_id)
    }

    #[must_use]
    pub fn display_name(&self, app_id: &AppId) -> Option<&str> {
        self.targets.get(app_id).map(String::as_str)
    }

    /// Display name for a target, falling back to the raw ID for unknown apps
    #[must_use]
    pub fn label<'a>(&'a self, app_id: &'a AppId) -> &'a str {
        self.display_name(app_id).unwrap_or_else(|| app_id.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl Default for WatchSet {
    fn default() -> Self {
        Self::from_pairs([
            ("com.instagram.android", "Instagram"),
            ("com.zhiliaoapp.musically", "TikTok"),
            ("com.ss.android.ugc.trill", "TikTok"),
        ])
    }
}
