//! Memoization of remote loads keyed by URL.
//!
//! The first request for a URL stores the in-flight future itself, so
//! concurrent callers share one fetch and later callers get the settled
//! value. Failures are cached like successes (a failed font settles to an
//! empty string, a failed stylesheet to `None`).

use crate::css::LoadedStylesheet;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// How long cached resources live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    /// Kept for the lifetime of the exporter
    #[default]
    Session,
    /// Every export call starts from an empty cache
    PerExport,
}

pub struct RemoteCache<T: Clone + Send + Sync + 'static> {
    entries: Mutex<HashMap<String, Shared<BoxFuture<'static, T>>>>,
}

impl<T: Clone + Send + Sync + 'static> Default for RemoteCache<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> RemoteCache<T> {
    /// Return the cached (possibly still pending) value for `key`, starting
    /// `make()` only when nothing is cached yet.
    pub async fn get_or_fetch<F>(&self, key: &str, make: F) -> T
    where
        F: FnOnce() -> BoxFuture<'static, T>,
    {
        let pending = {
            let mut entries = match self.entries.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            entries
                .entry(key.to_string())
                .or_insert_with(|| make().shared())
                .clone()
        };
        pending.await
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|e| e.contains_key(key))
            .unwrap_or(false)
    }

    pub fn evict(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|mut e| e.remove(key).is_some())
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut e) = self.entries.lock() {
            e.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Font and stylesheet caches shared by every export on one exporter.
#[derive(Default)]
pub struct ResourceCache {
    /// Font URL to the finished `@font-face` text, `""` on failure
    pub fonts: RemoteCache<String>,
    /// Stylesheet href to its parsed rules, `None` on failure
    pub stylesheets: RemoteCache<Option<Arc<LoadedStylesheet>>>,
}

impl ResourceCache {
    pub fn clear(&self) {
        self.fonts.clear();
        self.stylesheets.clear();
    }

    /// Forget `url` in both caches so the next export fetches it again.
    pub fn evict(&self, url: &str) -> bool {
        let font = self.fonts.evict(url);
        let sheet = self.stylesheets.evict(url);
        font || sheet
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty() && self.stylesheets.is_empty()
    }
}
