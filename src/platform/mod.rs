//! Platform surface the pipeline consumes: media/feature evaluation, device
//! metrics and network fetches.
//!
//! Everything here sits behind small traits so hosts can plug in their own
//! environment; [`ScreenEnvironment`] and the fetchers in [`fetch`] are the
//! defaults used by the CLI and the tests.

pub mod device;
pub mod fetch;
pub mod media;

pub use device::DeviceMetrics;
pub use fetch::{decode_data_uri, FetchError, FetchResponse, Fetcher, MemoryFetcher};
#[cfg(feature = "http")]
pub use fetch::HttpFetcher;

use std::sync::Mutex;

/// The viewing environment style rules are evaluated in.
pub trait Environment: Send + Sync {
    /// Whether a media query list currently matches (`@media`, `media=""`).
    fn matches_media(&self, query: &str) -> bool;

    /// Whether an `@supports` condition holds.
    fn supports(&self, condition: &str) -> bool;

    /// Output device pixel density used when drawing bitmaps.
    fn device_pixel_ratio(&self) -> f32;
}

/// Default environment: a screen with configurable metrics.
pub struct ScreenEnvironment {
    metrics: Mutex<DeviceMetrics>,
    media_type: String,
}

impl ScreenEnvironment {
    pub fn new(metrics: DeviceMetrics) -> Self {
        Self::with_media_type(metrics, "screen")
    }

    pub fn with_media_type(metrics: DeviceMetrics, media_type: impl Into<String>) -> Self {
        ScreenEnvironment {
            metrics: Mutex::new(metrics),
            media_type: media_type.into(),
        }
    }

    pub fn set_metrics(&self, m: DeviceMetrics) {
        if let Ok(mut g) = self.metrics.lock() {
            *g = m;
        }
    }

    pub fn metrics(&self) -> DeviceMetrics {
        self.metrics
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

impl Default for ScreenEnvironment {
    fn default() -> Self {
        Self::new(DeviceMetrics::default())
    }
}

impl Environment for ScreenEnvironment {
    fn matches_media(&self, query: &str) -> bool {
        media::matches_media_list(query, &self.metrics(), &self.media_type)
    }

    fn supports(&self, condition: &str) -> bool {
        media::evaluate_supports(condition)
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.metrics().pixel_ratio()
    }
}
