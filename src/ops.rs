// src/ops.rs
//
// Lazy pipeline operations.
// These are cheap to create and store - the expensive work happens when a
// region of the resulting image is rendered.

use crate::engine::MAX_DIMENSION;
use crate::error::{ImageOpsError, Result};
use bitflags::bitflags;
use std::str::FromStr;
use std::sync::Arc;

/// Image operations recorded as graph nodes.
///
/// Design principle: each operation is self-contained and stateless.
/// Inputs live on the node, not in the descriptor.
#[derive(Clone, Debug)]
pub enum Operation {
    /// Extract a region of the input
    Extract {
        left: u32,
        top: u32,
        width: u32,
        height: u32,
    },

    /// Append an opaque alpha band when the input has none
    EnsureAlpha,

    /// Scale colour bands by alpha
    Premultiply,

    /// Divide colour bands by alpha
    Unpremultiply,

    /// Porter-Duff over of premultiplied inputs [src, dst], src placed at (left, top)
    Composite { left: i64, top: i64 },

    /// Punch src's alpha shape out of dst, src placed at (left, top)
    Cutout { left: i64, top: i64 },

    /// Stretch luminance to the full range
    Normalise,

    /// Power curve on colour bands
    Gamma { exponent: f64 },

    /// General 2-D convolution with mirrored edges
    Convolve { kernel: Kernel },

    /// Separable Gaussian blur
    Blur { sigma: f64 },

    /// Unsharp mask with independent flat/jagged gain
    Sharpen { sigma: f64, flat: f64, jagged: f64 },

    /// Binarize to {0, max}
    Threshold { threshold: f64, colour: bool },

    /// Fold all bands into one with a bitwise operator
    Bandbool { op: BooleanOp },

    /// Bitwise operator between two images of identical shape
    Boolean { op: BooleanOp },
}

bitflags! {
    /// What an operation needs from its inputs.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OperationRequirement: u8 {
        /// Takes a second image input
        const SECOND_INPUT = 1 << 0;
        /// The first input must carry an alpha band
        const ALPHA = 1 << 1;
        /// The first input must have at least two bands
        const MULTI_BAND = 1 << 2;
    }
}

bitflags! {
    /// How an operation relates output regions to input regions.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OperationEffect: u8 {
        /// Output samples read a neighbourhood of input samples
        const NEIGHBOURHOOD = 1 << 0;
        /// Output depends on statistics of the whole input
        const GLOBAL_STATS = 1 << 1;
        /// Output extent differs from the first input
        const CHANGES_EXTENT = 1 << 2;
        /// Output band count differs from the first input
        const CHANGES_BANDS = 1 << 3;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationContract {
    pub name: &'static str,
    pub requires: OperationRequirement,
    pub effects: OperationEffect,
}

impl OperationContract {
    const fn new(
        name: &'static str,
        requires: OperationRequirement,
        effects: OperationEffect,
    ) -> Self {
        Self {
            name,
            requires,
            effects,
        }
    }

    pub fn input_count(&self) -> usize {
        if self.requires.contains(OperationRequirement::SECOND_INPUT) {
            2
        } else {
            1
        }
    }
}

impl Operation {
    pub fn contract(&self) -> OperationContract {
        use OperationEffect as E;
        use OperationRequirement as R;
        match self {
            Operation::Extract { .. } => {
                OperationContract::new("extract", R::empty(), E::CHANGES_EXTENT)
            }
            Operation::EnsureAlpha => {
                OperationContract::new("ensure_alpha", R::empty(), E::CHANGES_BANDS)
            }
            Operation::Premultiply => OperationContract::new("premultiply", R::empty(), E::empty()),
            Operation::Unpremultiply => {
                OperationContract::new("unpremultiply", R::empty(), E::empty())
            }
            Operation::Composite { .. } => OperationContract::new(
                "composite",
                R::SECOND_INPUT | R::ALPHA,
                E::CHANGES_EXTENT | E::CHANGES_BANDS,
            ),
            Operation::Cutout { .. } => OperationContract::new(
                "cutout",
                R::SECOND_INPUT,
                E::CHANGES_EXTENT | E::CHANGES_BANDS,
            ),
            Operation::Normalise => {
                OperationContract::new("normalise", R::empty(), E::GLOBAL_STATS)
            }
            Operation::Gamma { .. } => OperationContract::new("gamma", R::empty(), E::empty()),
            Operation::Convolve { .. } => {
                OperationContract::new("convolve", R::empty(), E::NEIGHBOURHOOD)
            }
            Operation::Blur { .. } => OperationContract::new("blur", R::empty(), E::NEIGHBOURHOOD),
            Operation::Sharpen { .. } => {
                OperationContract::new("sharpen", R::empty(), E::NEIGHBOURHOOD)
            }
            Operation::Threshold { .. } => {
                OperationContract::new("threshold", R::empty(), E::empty())
            }
            Operation::Bandbool { .. } => {
                OperationContract::new("bandbool", R::MULTI_BAND, E::CHANGES_BANDS)
            }
            Operation::Boolean { .. } => {
                OperationContract::new("boolean", R::SECOND_INPUT, E::empty())
            }
        }
    }

    /// Extra input pixels needed on every side of a requested region.
    pub fn margin(&self) -> u32 {
        match self {
            Operation::Convolve { kernel } => kernel.margin(),
            Operation::Blur { sigma } | Operation::Sharpen { sigma, .. } => {
                gaussian_radius(*sigma)
            }
            _ => 0,
        }
    }
}

/// Radius of the Gaussian kernel used for `sigma`: the tail beyond 3 sigma
/// carries well under 1% of the weight. Capped at [`MAX_DIMENSION`], past which
/// every tap is clamped to an image edge anyway.
pub fn gaussian_radius(sigma: f64) -> u32 {
    ((3.0 * sigma).ceil().min(MAX_DIMENSION as f64) as u32).max(1)
}

// =============================================================================
// GRAVITY
// =============================================================================

/// Nine-way anchor used to derive a placement offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Gravity {
    #[default]
    Centre,
    North,
    East,
    South,
    West,
    NorthEast,
    SouthEast,
    SouthWest,
    NorthWest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Anchor {
    Low,
    Middle,
    High,
}

impl Anchor {
    fn place(self, dst_extent: u32, src_extent: u32) -> i64 {
        let slack = dst_extent as i64 - src_extent as i64;
        match self {
            Anchor::Low => 0,
            // i64 division truncates toward zero
            Anchor::Middle => slack / 2,
            Anchor::High => slack,
        }
    }
}

impl Gravity {
    pub const ALL: [Gravity; 9] = [
        Gravity::Centre,
        Gravity::North,
        Gravity::East,
        Gravity::South,
        Gravity::West,
        Gravity::NorthEast,
        Gravity::SouthEast,
        Gravity::SouthWest,
        Gravity::NorthWest,
    ];

    /// Integer codes 0..=8 in the order centre, north, east, south, west,
    /// northeast, southeast, southwest, northwest.
    pub fn from_code(code: i32) -> Result<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
            .ok_or_else(|| {
                ImageOpsError::invalid_argument("gravity", code.to_string(), "expected 0..=8")
            })
    }

    fn anchors(self) -> (Anchor, Anchor) {
        match self {
            Gravity::Centre => (Anchor::Middle, Anchor::Middle),
            Gravity::North => (Anchor::Middle, Anchor::Low),
            Gravity::East => (Anchor::High, Anchor::Middle),
            Gravity::South => (Anchor::Middle, Anchor::High),
            Gravity::West => (Anchor::Low, Anchor::Middle),
            Gravity::NorthEast => (Anchor::High, Anchor::Low),
            Gravity::SouthEast => (Anchor::High, Anchor::High),
            Gravity::SouthWest => (Anchor::Low, Anchor::High),
            Gravity::NorthWest => (Anchor::Low, Anchor::Low),
        }
    }

    /// Top-left offset of a `src_w x src_h` box inside a `dst_w x dst_h` box.
    pub fn offset(self, dst_w: u32, dst_h: u32, src_w: u32, src_h: u32) -> (i64, i64) {
        let (horizontal, vertical) = self.anchors();
        (
            horizontal.place(dst_w, src_w),
            vertical.place(dst_h, src_h),
        )
    }
}

impl FromStr for Gravity {
    type Err = ImageOpsError;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "centre" | "center" => Ok(Gravity::Centre),
            "north" => Ok(Gravity::North),
            "east" => Ok(Gravity::East),
            "south" => Ok(Gravity::South),
            "west" => Ok(Gravity::West),
            "northeast" => Ok(Gravity::NorthEast),
            "southeast" => Ok(Gravity::SouthEast),
            "southwest" => Ok(Gravity::SouthWest),
            "northwest" => Ok(Gravity::NorthWest),
            other => Err(ImageOpsError::invalid_argument(
                "gravity",
                other.to_string(),
                "expected a compass point or centre",
            )),
        }
    }
}

// =============================================================================
// BOOLEAN OPERATORS
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BooleanOp {
    And,
    Or,
    Eor,
}

impl BooleanOp {
    pub const ALL: [BooleanOp; 3] = [BooleanOp::And, BooleanOp::Or, BooleanOp::Eor];

    #[inline]
    pub fn apply(self, a: u32, b: u32) -> u32 {
        match self {
            BooleanOp::And => a & b,
            BooleanOp::Or => a | b,
            BooleanOp::Eor => a ^ b,
        }
    }
}

impl FromStr for BooleanOp {
    type Err = ImageOpsError;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "and" => Ok(BooleanOp::And),
            "or" => Ok(BooleanOp::Or),
            "eor" | "xor" => Ok(BooleanOp::Eor),
            other => Err(ImageOpsError::invalid_argument(
                "boolean",
                other.to_string(),
                "expected and, or or eor",
            )),
        }
    }
}

// =============================================================================
// KERNELS
// =============================================================================

/// Convolution kernel: row-major coefficients plus scale and offset applied
/// to the weighted sum.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    width: u32,
    height: u32,
    scale: f64,
    offset: f64,
    data: Arc<[f64]>,
}

impl Kernel {
    pub fn new(width: u32, height: u32, scale: f64, offset: f64, data: Vec<f64>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ImageOpsError::invalid_argument(
                "kernel",
                format!("{width}x{height}"),
                "width and height must be at least 1",
            ));
        }
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(ImageOpsError::invalid_argument(
                "kernel",
                format!("{} coefficients", data.len()),
                format!("expected {expected} for a {width}x{height} kernel"),
            ));
        }
        if !scale.is_finite() || !offset.is_finite() {
            return Err(ImageOpsError::invalid_argument(
                "kernel",
                format!("scale={scale}, offset={offset}"),
                "scale and offset must be finite",
            ));
        }
        if data.iter().any(|c| !c.is_finite()) {
            return Err(ImageOpsError::invalid_argument(
                "kernel",
                "non-finite coefficient",
                "coefficients must be finite",
            ));
        }
        Ok(Self {
            width,
            height,
            scale,
            offset,
            data: data.into(),
        })
    }

    /// 1 at the anchor, 0 elsewhere.
    pub fn identity(width: u32, height: u32) -> Result<Self> {
        let mut data = vec![0.0; width as usize * height as usize];
        if let Some(centre) = data.get_mut(
            ((height as usize).saturating_sub(1) / 2) * width as usize
                + (width as usize).saturating_sub(1) / 2,
        ) {
            *centre = 1.0;
        }
        Self::new(width, height, 1.0, 0.0, data)
    }

    /// Fixed 3x3 box low-pass used for the fast blur.
    pub fn fast_blur() -> Self {
        Self {
            width: 3,
            height: 3,
            scale: 1.0 / 9.0,
            offset: 0.0,
            data: vec![1.0; 9].into(),
        }
    }

    /// Fixed 3x3 sharpening kernel used for the fast sharpen.
    pub fn fast_sharpen() -> Self {
        #[rustfmt::skip]
        let data = vec![
            -1.0, -1.0, -1.0,
            -1.0, 32.0, -1.0,
            -1.0, -1.0, -1.0,
        ];
        Self {
            width: 3,
            height: 3,
            scale: 1.0 / 24.0,
            offset: 0.0,
            data: data.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.data
    }

    /// Anchor position within the kernel.
    pub fn anchor(&self) -> (u32, u32) {
        ((self.width - 1) / 2, (self.height - 1) / 2)
    }

    pub fn margin(&self) -> u32 {
        (self.width / 2).max(self.height / 2)
    }
}
