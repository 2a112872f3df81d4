//! Tunables for IR construction, overridable through the process environment.

use std::env;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::IrError;
use crate::ir::cache::DEFAULT_SHAPE_CACHE_CAPACITY;

pub const SHAPE_CACHE_SIZE_VAR: &str = "LAZY_IR_SHAPE_CACHE_SIZE";
pub const DYNAMIC_SHAPES_VAR: &str = "LAZY_IR_DYNAMIC_SHAPES";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IrConfig {
    /// Maximum number of entries kept by the shape cache.
    pub shape_cache_capacity: usize,
    /// Hash leaf shapes by rank only, so traces with different extents share fingerprints.
    pub dynamic_shapes: bool,
}

impl Default for IrConfig {
    fn default() -> Self {
        IrConfig {
            shape_cache_capacity: DEFAULT_SHAPE_CACHE_CAPACITY,
            dynamic_shapes: false,
        }
    }
}

impl IrConfig {
    /// Reads overrides from the environment, falling back to defaults on malformed values.
    pub fn from_env() -> Self {
        let defaults = IrConfig::default();
        let shape_cache_capacity = match read_var(SHAPE_CACHE_SIZE_VAR) {
            Some(raw) => parse_capacity(&raw).unwrap_or_else(|err| {
                warn!("{err}; using {}", defaults.shape_cache_capacity);
                defaults.shape_cache_capacity
            }),
            None => defaults.shape_cache_capacity,
        };
        let dynamic_shapes = match read_var(DYNAMIC_SHAPES_VAR) {
            Some(raw) => parse_bool(&raw),
            None => defaults.dynamic_shapes,
        };
        IrConfig {
            shape_cache_capacity,
            dynamic_shapes,
        }
    }

    /// Like [`IrConfig::from_env`], but rejects malformed values.
    pub fn try_from_env() -> Result<Self, IrError> {
        let mut config = IrConfig::default();
        if let Some(raw) = read_var(SHAPE_CACHE_SIZE_VAR) {
            config.shape_cache_capacity = parse_capacity(&raw)?;
        }
        if let Some(raw) = read_var(DYNAMIC_SHAPES_VAR) {
            config.dynamic_shapes = parse_bool(&raw);
        }
        Ok(config)
    }

    /// Parses a JSON object; missing fields keep their defaults.
    pub fn from_json(src: &str) -> Result<Self, IrError> {
        let config: IrConfig = serde_json::from_str(src).map_err(|err| IrError::InvalidConfig {
            key: "json".to_string(),
            value: err.to_string(),
        })?;
        if config.shape_cache_capacity == 0 {
            return Err(IrError::InvalidConfig {
                key: "shape_cache_capacity".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(config)
    }

    pub fn with_shape_cache_capacity(mut self, capacity: usize) -> Self {
        self.shape_cache_capacity = capacity;
        self
    }

    pub fn with_dynamic_shapes(mut self, enabled: bool) -> Self {
        self.dynamic_shapes = enabled;
        self
    }
}

fn read_var(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

fn parse_capacity(value: &str) -> Result<usize, IrError> {
    match value.trim().parse::<usize>() {
        Ok(capacity) if capacity > 0 => Ok(capacity),
        _ => Err(IrError::InvalidConfig {
            key: SHAPE_CACHE_SIZE_VAR.to_string(),
            value: value.to_string(),
        }),
    }
}
