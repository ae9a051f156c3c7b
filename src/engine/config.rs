// src/engine/config.rs
//
// Engine configuration: rendering granularity, tile geometry and parallelism.
//
// A process-wide instance is created lazily from LAZY_IMAGE_OPS_* environment
// variables on first use, unless the embedding application installs one first.

use crate::error::{ImageOpsError, Result};
use std::sync::OnceLock;

const DEFAULT_STRIP_HEIGHT: u32 = 64;
const DEFAULT_TILE_WIDTH: u32 = 128;
const DEFAULT_TILE_HEIGHT: u32 = 128;
const DEFAULT_CROP_CANDIDATES: u32 = 64;

pub const ENV_STRIP_HEIGHT: &str = "LAZY_IMAGE_OPS_STRIP_HEIGHT";
pub const ENV_TILE_SIZE: &str = "LAZY_IMAGE_OPS_TILE_SIZE";
pub const ENV_PARALLEL: &str = "LAZY_IMAGE_OPS_PARALLEL";
pub const ENV_CROP_CANDIDATES: &str = "LAZY_IMAGE_OPS_CROP_CANDIDATES";
pub const ENV_THREADS: &str = "LAZY_IMAGE_OPS_THREADS";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Rows per strip when materializing a whole image
    pub strip_height: u32,
    /// Natural tile extent used by tile caches
    pub tile_width: u32,
    pub tile_height: u32,
    /// Render strips on the global pool
    pub parallel: bool,
    /// Candidate offsets per axis for crop window search
    pub crop_candidates: u32,
    /// Worker threads for the global pool (None = available parallelism)
    pub threads: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strip_height: DEFAULT_STRIP_HEIGHT,
            tile_width: DEFAULT_TILE_WIDTH,
            tile_height: DEFAULT_TILE_HEIGHT,
            parallel: true,
            crop_candidates: DEFAULT_CROP_CANDIDATES,
            threads: None,
        }
    }
}

impl EngineConfig {
    /// Single-threaded rendering, otherwise default geometry.
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    pub fn with_strip_height(mut self, rows: u32) -> Self {
        self.strip_height = rows;
        self
    }

    pub fn with_tile_size(mut self, width: u32, height: u32) -> Self {
        self.tile_width = width;
        self.tile_height = height;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_crop_candidates(mut self, candidates: u32) -> Self {
        self.crop_candidates = candidates;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("strip_height", self.strip_height),
            ("tile_width", self.tile_width),
            ("tile_height", self.tile_height),
            ("crop_candidates", self.crop_candidates),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ImageOpsError::invalid_argument(
                    name,
                    value.to_string(),
                    "must be at least 1",
                ));
            }
        }
        if self.threads == Some(0) {
            return Err(ImageOpsError::invalid_argument(
                "threads",
                "0",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Defaults overridden by LAZY_IMAGE_OPS_* variables. Unparseable values
    /// are rejected rather than silently ignored.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_STRIP_HEIGHT) {
            config.strip_height = parse_u32(ENV_STRIP_HEIGHT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_TILE_SIZE) {
            let (w, h) = parse_tile_size(&raw)?;
            config.tile_width = w;
            config.tile_height = h;
        }
        if let Some(raw) = lookup(ENV_PARALLEL) {
            config.parallel = parse_bool(ENV_PARALLEL, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CROP_CANDIDATES) {
            config.crop_candidates = parse_u32(ENV_CROP_CANDIDATES, &raw)?;
        }
        if let Some(raw) = lookup(ENV_THREADS) {
            config.threads = Some(parse_u32(ENV_THREADS, &raw)? as usize);
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_u32(name: &'static str, raw: &str) -> Result<u32> {
    raw.trim().parse::<u32>().map_err(|_| {
        ImageOpsError::invalid_argument(name, raw.to_string(), "expected an unsigned integer")
    })
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ImageOpsError::invalid_argument(
            name,
            raw.to_string(),
            "expected true/false",
        )),
    }
}

/// "256" or "256x64"
fn parse_tile_size(raw: &str) -> Result<(u32, u32)> {
    match raw.trim().split_once(['x', 'X']) {
        Some((w, h)) => Ok((parse_u32(ENV_TILE_SIZE, w)?, parse_u32(ENV_TILE_SIZE, h)?)),
        None => {
            let side = parse_u32(ENV_TILE_SIZE, raw)?;
            Ok((side, side))
        }
    }
}

static GLOBAL_CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Process-wide configuration. Falls back to defaults when the environment
/// holds invalid values.
pub fn config() -> &'static EngineConfig {
    GLOBAL_CONFIG.get_or_init(|| {
        EngineConfig::from_env().unwrap_or_else(|err| {
            tracing::warn!(target: "lazy_image_ops::config", %err, "ignoring invalid environment configuration");
            EngineConfig::default()
        })
    })
}

/// Install the process-wide configuration. Only the first call (before any
/// rendering) takes effect.
pub fn install_config(config: EngineConfig) -> Result<()> {
    config.validate()?;
    GLOBAL_CONFIG.set(config).map_err(|_| {
        ImageOpsError::invalid_argument(
            "config",
            "install_config",
            "engine configuration is already initialized",
        )
    })
}
