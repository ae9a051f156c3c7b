// src/engine.rs
//
// The core of lazy-image-ops. A lazy region pipeline that:
// 1. Records operations as immutable graph nodes without touching pixels
// 2. Renders any rectangle on demand, pulling only the input area it needs
// 3. Materializes whole images strip by strip on a shared rayon pool
//
// This file is a facade over the modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// The same limit is used by libvips/sharp.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 1.6GB of f32 RGBA samples.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod api;
pub mod cache;
pub mod composite;
pub mod config;
pub mod crop;
pub mod filter;
pub mod image;
mod pipeline;
pub mod pool;
pub mod region;
pub mod threshold;
pub mod tone;
pub mod trim;

pub use cache::{tile_cache, tile_cache_with, TileCacheStats};
pub use composite::{
    composite, composite_at, composite_image, cutout, ensure_alpha, is_input_valid_for_composition,
    premultiply, unpremultiply,
};
pub use config::{config, install_config, EngineConfig};
pub use crop::{
    crop, crop_with, extract_area, smart_crop, AttentionStrategy, CropStrategy, EntropyStrategy,
    Strategy,
};
pub use filter::{blur, convolve, convolve_kernel, sharpen, FAST_SIGMA};
pub use image::{check_dimensions, Image, ImageHeader, RegionSource, SampleFormat};
pub use region::{Rect, Region};
pub use threshold::{bandbool, boolean, threshold};
pub use tone::{gamma, normalise};
pub use trim::trim;
