// src/error.rs
//
// Unified error handling for lazy-image-ops
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Invalid arguments or incompatible inputs, recoverable
// - FormatError: Sample layouts the pipeline cannot represent
// - ResourceLimit: Dimension limits
// - InternalBug: Failures reported by upstream sources (should not happen)

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Invalid input, recoverable by the caller
    UserError,
    /// Unsupported sample layout
    FormatError,
    /// Dimension/pixel-count limits
    ResourceLimit,
    /// Library or upstream bugs
    InternalBug,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::FormatError => "FormatError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }
}

/// lazy-image-ops error types
///
/// Every precondition is checked when an operation is constructed, so these
/// surface synchronously from the call that built the bad node.
#[derive(Debug, Clone, Error)]
pub enum ImageOpsError {
    // Argument Errors
    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    #[error(
        "Shape mismatch: {left_width}x{left_height}x{left_bands} vs {right_width}x{right_height}x{right_bands}"
    )]
    ShapeMismatch {
        left_width: u32,
        left_height: u32,
        left_bands: u32,
        right_width: u32,
        right_height: u32,
        right_bands: u32,
    },

    #[error("Cannot composite {src_bands}-band image over {dst_bands}-band image: {reason}")]
    InvalidComposition {
        src_bands: u32,
        dst_bands: u32,
        reason: Cow<'static, str>,
    },

    // Construction Errors
    #[error("Invalid image dimensions: width={width}, height={height}, bands={bands}")]
    InvalidDimensions { width: u32, height: u32, bands: u32 },

    #[error("Sample buffer holds {actual} samples, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("Region ({x}+{width}, {y}+{height}) exceeds image dimensions ({img_width}x{img_height})")]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        img_width: u32,
        img_height: u32,
    },

    // Size Limit Errors
    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Interop Errors
    #[error("Unsupported sample layout: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    // Upstream Errors
    #[error("Region source failed: {message}")]
    Source { message: Cow<'static, str> },
}

// Constructor Helpers
impl ImageOpsError {
    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn shape_mismatch(left: (u32, u32, u32), right: (u32, u32, u32)) -> Self {
        Self::ShapeMismatch {
            left_width: left.0,
            left_height: left.1,
            left_bands: left.2,
            right_width: right.0,
            right_height: right.1,
            right_bands: right.2,
        }
    }

    pub fn invalid_composition(
        src_bands: u32,
        dst_bands: u32,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidComposition {
            src_bands,
            dst_bands,
            reason: reason.into(),
        }
    }

    pub fn invalid_dimensions(width: u32, height: u32, bands: u32) -> Self {
        Self::InvalidDimensions {
            width,
            height,
            bands,
        }
    }

    pub fn buffer_size_mismatch(expected: usize, actual: usize) -> Self {
        Self::BufferSizeMismatch { expected, actual }
    }

    pub fn region_out_of_bounds(
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        img_width: u32,
        img_height: u32,
    ) -> Self {
        Self::RegionOutOfBounds {
            x,
            y,
            width,
            height,
            img_width,
            img_height,
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn source(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Source {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (caller can fix it)
    ///
    /// Consistent with category(): UserError and ResourceLimit are
    /// recoverable, FormatError and InternalBug are not.
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ResourceLimit => true,
            ErrorCategory::FormatError | ErrorCategory::InternalBug => false,
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArgument { .. }
            | Self::ShapeMismatch { .. }
            | Self::InvalidComposition { .. }
            | Self::InvalidDimensions { .. }
            | Self::BufferSizeMismatch { .. }
            | Self::RegionOutOfBounds { .. } => ErrorCategory::UserError,

            Self::UnsupportedFormat { .. } => ErrorCategory::FormatError,

            Self::DimensionExceedsLimit { .. } | Self::PixelCountExceedsLimit { .. } => {
                ErrorCategory::ResourceLimit
            }

            Self::Source { .. } => ErrorCategory::InternalBug,
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, ImageOpsError>;
