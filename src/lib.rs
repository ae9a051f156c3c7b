// lib.rs
//
// lazy-image-ops: sharp-style image operations over a lazy region pipeline
//
// Design goals:
// - Building a pipeline never touches pixels
// - Rendering a region pulls only the input area it needs
// - Premultiplied-alpha compositing, saliency crops, unsharp masking
// - Shared upstream work memoized by a thread-safe tile cache

pub mod engine;
pub mod error;
pub mod ops;

pub use engine::{
    bandbool, blur, boolean, check_dimensions, composite, composite_at, composite_image, config,
    convolve, convolve_kernel, crop, crop_with, cutout, ensure_alpha, extract_area, gamma,
    install_config, is_input_valid_for_composition, normalise, premultiply, sharpen, smart_crop,
    threshold, tile_cache, tile_cache_with, trim, unpremultiply, AttentionStrategy, CropStrategy,
    EngineConfig, EntropyStrategy, Image, ImageHeader, Rect, Region, RegionSource, SampleFormat,
    Strategy, TileCacheStats, FAST_SIGMA, MAX_DIMENSION, MAX_PIXELS,
};
pub use error::{ErrorCategory, ImageOpsError, Result};
pub use ops::{BooleanOp, Gravity, Kernel, Operation};
