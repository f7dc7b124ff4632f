/// Platform detection.
///
/// Maps a mint identifier to its origin platform. Three methods in
/// priority order: a mint-suffix rule (free, no external call), an
/// optional authoritative program-id lookup, and a fallback to `unknown`.
/// Results are memoized; unresolved mints can be parked in a retry
/// buffer that re-attempts the authoritative lookup a few times before
/// giving up.
pub mod cache;
pub mod lookup;
pub mod retry;

use std::sync::Arc;

use serde::{ Deserialize, Serialize };

use crate::arguments::is_debug_platform_enabled;
use crate::events::{ BusEvent, EventBus };
use crate::logger::{ log, LogTag };
use crate::types::Platform;

pub use cache::DetectionCache;
pub use lookup::{ platform_for_program, ProgramLookup };
pub use retry::RetryBuffer;

/// How a detection result was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    MintPattern,
    ProgramId,
    Fallback,
}

/// Outcome of a platform detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub platform: Platform,
    pub confidence: f64,
    pub method: DetectionMethod,
}

impl Detection {
    fn fallback() -> Self {
        Self {
            platform: Platform::Unknown,
            confidence: 0.0,
            method: DetectionMethod::Fallback,
        }
    }
}

/// Suffix markers platforms append to their mints. Checked first; a hit
/// needs no external call.
fn suffix_rule(mint: &str) -> Option<Platform> {
    if mint.ends_with("pump") {
        Some(Platform::PumpFun)
    } else if mint.ends_with("bonk") {
        Some(Platform::LetsBonk)
    } else {
        None
    }
}

/// Process-lifetime detector. The cache and retry buffer live inside it;
/// everything else receives the detector by dependency injection.
pub struct PlatformDetector {
    cache: DetectionCache,
    lookup: Option<Arc<dyn ProgramLookup>>,
    retry: RetryBuffer,
    bus: EventBus,
}

impl PlatformDetector {
    pub fn new(lookup: Option<Arc<dyn ProgramLookup>>, bus: EventBus) -> Self {
        Self {
            cache: DetectionCache::with_defaults(),
            lookup,
            retry: RetryBuffer::new(),
            bus,
        }
    }

    /// Detect the platform for a mint.
    ///
    /// Callers that cannot block get a provisional `unknown` when only
    /// the retry buffer could still resolve it; the resolution arrives
    /// later as a `PlatformResolved` bus event.
    pub async fn detect(&self, mint: &str) -> Detection {
        if let Some(platform) = suffix_rule(mint) {
            return Detection {
                platform,
                confidence: 0.99,
                method: DetectionMethod::MintPattern,
            };
        }

        if let Some(cached) = self.cache.get(mint) {
            return cached;
        }

        if let Some(detection) = self.try_authoritative(mint).await {
            self.cache.insert(mint, detection.clone());
            return detection;
        }

        // Authoritative path unavailable or unresolved: park for retry
        // and answer provisionally.
        if self.lookup.is_some() {
            self.retry.enqueue(mint);
        }
        Detection::fallback()
    }

    /// One authoritative lookup attempt. `None` means miss or failure.
    pub(crate) async fn try_authoritative(&self, mint: &str) -> Option<Detection> {
        let lookup = self.lookup.as_ref()?;
        match lookup.resolve_program(mint).await {
            Ok(Some(program_id)) => {
                let platform = platform_for_program(&program_id)?;
                Some(Detection {
                    platform,
                    confidence: 0.95,
                    method: DetectionMethod::ProgramId,
                })
            }
            Ok(None) => None,
            Err(e) => {
                if is_debug_platform_enabled() {
                    log(
                        LogTag::Platform,
                        "DEBUG",
                        &format!("Program lookup failed for {}: {}", mint, e),
                    );
                }
                None
            }
        }
    }

    /// Called by the retry worker when a parked mint finally resolves.
    pub(crate) fn resolve_parked(&self, mint: &str, detection: Detection) {
        self.cache.insert(mint, detection.clone());
        self.bus.publish(BusEvent::PlatformResolved {
            mint: mint.to_string(),
            detection,
        });
    }

    pub(crate) fn retry_buffer(&self) -> &RetryBuffer {
        &self.retry
    }

    pub fn cache_metrics(&self) -> cache::CacheMetrics {
        self.cache.metrics()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Drop parked retries and stop accepting new ones.
    pub fn shutdown(&self) {
        self.retry.shutdown();
    }
}
