//! Pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::render::Rgba;
use crate::resource::RetrieverConfig;

/// Settings for a frame pipeline and its resource cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Redraw frames that may wait for the GPU thread before assembly is
    /// skipped.
    pub max_frame_queue_size: usize,
    /// Frames available for assembly. The pool holds one more for the frame
    /// being displayed.
    pub frame_pool_size: usize,
    pub pick_timeout_ms: u64,
    /// Texture budget in bytes.
    pub resource_cache_capacity: usize,
    /// Eviction stops at this many bytes. Defaults to 75 % of capacity.
    pub resource_cache_low_water: Option<usize>,
    pub retrieval_workers: usize,
    pub max_simultaneous_retrievals: usize,
    /// Decoded images not turned into textures within this age are dropped.
    pub stale_retrieval_age_ms: u64,
    /// Vertical field of view in degrees.
    pub field_of_view: f64,
    pub clear_color: Rgba,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_frame_queue_size: 2,
            frame_pool_size: 3,
            pick_timeout_ms: 2000,
            resource_cache_capacity: 64 * 1024 * 1024,
            resource_cache_low_water: None,
            retrieval_workers: 4,
            max_simultaneous_retrievals: 8,
            stale_retrieval_age_ms: 3000,
            field_of_view: 45.0,
            clear_color: [0, 0, 0, 255],
        }
    }
}

impl PipelineConfig {
    /// Check that the values describe a working pipeline.
    pub fn validate(&self) -> Result<()> {
        let fail = |detail: String| Err(Error::Config { detail });
        if self.max_frame_queue_size == 0 {
            return fail("max_frame_queue_size must be at least 1".to_string());
        }
        if self.frame_pool_size < self.max_frame_queue_size {
            return fail(format!(
                "frame_pool_size {} is smaller than max_frame_queue_size {}",
                self.frame_pool_size, self.max_frame_queue_size
            ));
        }
        if self.pick_timeout_ms == 0 {
            return fail("pick_timeout_ms must be positive".to_string());
        }
        if self.resource_cache_capacity == 0 {
            return fail("resource_cache_capacity must be positive".to_string());
        }
        if let Some(low_water) = self.resource_cache_low_water
            && low_water >= self.resource_cache_capacity
        {
            return fail(format!(
                "resource_cache_low_water {low_water} is not below capacity {}",
                self.resource_cache_capacity
            ));
        }
        if self.retrieval_workers == 0 || self.max_simultaneous_retrievals == 0 {
            return fail("retrieval needs at least one worker and one slot".to_string());
        }
        if !(self.field_of_view > 0.0 && self.field_of_view < 180.0) {
            return fail(format!(
                "field_of_view {} is outside (0, 180)",
                self.field_of_view
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn pick_timeout(&self) -> Duration {
        Duration::from_millis(self.pick_timeout_ms)
    }

    #[must_use]
    pub fn stale_retrieval_age(&self) -> Duration {
        Duration::from_millis(self.stale_retrieval_age_ms)
    }

    #[must_use]
    pub fn retriever(&self) -> RetrieverConfig {
        RetrieverConfig {
            workers: self.retrieval_workers,
            max_simultaneous: self.max_simultaneous_retrievals,
        }
    }
}
