use serde::Deserialize;

use crate::constants::*;
use crate::error::CoreError;

/// Tunables for chunk streaming, loaded from RON.
///
/// Every field has a default, so an empty `()` document is valid.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Region side length in chunks.
    pub chunks_per_region_side: u32,
    /// Seconds an unreferenced chunk stays resident before eviction.
    pub eviction_delay_secs: f64,
    /// Chunk jobs started per tick across all coordinates.
    pub max_jobs_per_tick: usize,
    /// Background worker threads. 0 runs all jobs inline on the caller.
    pub worker_threads: usize,
    /// Loader view radius in chunks.
    pub loader_radius: i32,
    /// Ticks a failed cross-region move is retried before giving up.
    pub move_retry_limit: u32,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunks_per_region_side: DEFAULT_CHUNKS_PER_REGION_SIDE,
            eviction_delay_secs: DEFAULT_EVICTION_DELAY_SECS,
            max_jobs_per_tick: DEFAULT_MAX_JOBS_PER_TICK,
            worker_threads: DEFAULT_WORKER_THREADS,
            loader_radius: DEFAULT_LOADER_RADIUS,
            move_retry_limit: DEFAULT_MOVE_RETRY_LIMIT,
        }
    }
}

impl StreamingConfig {
    pub fn from_ron_str(ron_str: &str) -> Result<Self, CoreError> {
        let options = ron::Options::default();
        let config: StreamingConfig = options
            .from_str(ron_str)
            .map_err(|e| CoreError::ConfigParse(e.to_string()))?;
        Ok(config.sanitized())
    }

    /// Clamp values that would stall streaming.
    fn sanitized(mut self) -> Self {
        self.chunks_per_region_side = self.chunks_per_region_side.max(1);
        self.max_jobs_per_tick = self.max_jobs_per_tick.max(1);
        self.loader_radius = self.loader_radius.max(0);
        if !self.eviction_delay_secs.is_finite() || self.eviction_delay_secs < 0.0 {
            self.eviction_delay_secs = 0.0;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = StreamingConfig::from_ron_str("()").expect("parse");
        assert_eq!(config, StreamingConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config =
            StreamingConfig::from_ron_str("(max_jobs_per_tick: 2, eviction_delay_secs: 0.5)")
                .expect("parse");
        assert_eq!(config.max_jobs_per_tick, 2);
        assert_eq!(config.eviction_delay_secs, 0.5);
        assert_eq!(config.chunks_per_region_side, DEFAULT_CHUNKS_PER_REGION_SIDE);
    }

    #[test]
    fn test_zero_values_clamped() {
        let config = StreamingConfig::from_ron_str("(max_jobs_per_tick: 0, chunks_per_region_side: 0)")
            .expect("parse");
        assert_eq!(config.max_jobs_per_tick, 1);
        assert_eq!(config.chunks_per_region_side, 1);
    }

    #[test]
    fn test_malformed_config_rejected() {
        let result = StreamingConfig::from_ron_str("(max_jobs_per_tick: \"many\")");
        assert!(matches!(result, Err(CoreError::ConfigParse(_))));
    }
}
