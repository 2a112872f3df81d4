//! Explicitly owned construction context shared by every node of a trace.

use std::sync::Arc;

use log::debug;

use crate::config::IrConfig;

use super::cache::ShapeCache;

/// Owns the shape cache and hashing mode used while recording graphs.
///
/// Cloning is cheap and shares the same cache, so one context is created per process or per
/// execution context and handed to every node constructor. Graphs recorded through contexts that
/// share a cache reuse each other's inferred shapes.
#[derive(Debug, Clone)]
pub struct IrContext {
    config: IrConfig,
    shape_cache: Arc<ShapeCache>,
}

impl IrContext {
    pub fn new(config: IrConfig) -> Self {
        debug!(
            "creating IR context (shape cache capacity {}, dynamic shapes {})",
            config.shape_cache_capacity, config.dynamic_shapes
        );
        IrContext {
            config,
            shape_cache: Arc::new(ShapeCache::new(config.shape_cache_capacity)),
        }
    }

    pub fn from_env() -> Self {
        IrContext::new(IrConfig::from_env())
    }

    /// Builds a context around an existing cache, e.g. one shared with another context.
    pub fn with_shape_cache(config: IrConfig, shape_cache: Arc<ShapeCache>) -> Self {
        IrContext {
            config: IrConfig {
                shape_cache_capacity: shape_cache.capacity(),
                ..config
            },
            shape_cache,
        }
    }

    pub fn config(&self) -> &IrConfig {
        &self.config
    }

    pub fn shape_cache(&self) -> &Arc<ShapeCache> {
        &self.shape_cache
    }

    pub fn dynamic_shapes(&self) -> bool {
        self.config.dynamic_shapes
    }
}

impl Default for IrContext {
    fn default() -> Self {
        IrContext::new(IrConfig::default())
    }
}
