// src/engine/pipeline.rs
//
// Region rendering: turns a node plus a requested rectangle into samples,
// asking each input only for the rectangle it has to provide.

use crate::engine::composite;
use crate::engine::filter;
use crate::engine::image::{Image, ImageHeader, LumaRange, NodeKind};
use crate::engine::region::{Rect, Region};
use crate::engine::threshold;
use crate::engine::tone;
use crate::error::ImageOpsError;
use crate::ops::{Operation, OperationEffect};
use once_cell::sync::OnceCell;
use tracing::trace;

// Always ImageOpsError so upstream failures keep their category.
type PipelineResult<T> = std::result::Result<T, ImageOpsError>;

/// Render `rect` (already validated against the image bounds) of `image`.
pub(crate) fn render(image: &Image, rect: Rect) -> PipelineResult<Region> {
    let node = image.node();
    match &node.kind {
        NodeKind::Buffer(region) => {
            if region.rect() == rect {
                Ok(region.clone())
            } else {
                Ok(region.crop(rect))
            }
        }
        NodeKind::Source(source) => {
            let region = source.render(rect)?;
            if region.rect() != rect || region.bands() != node.header.bands as usize {
                return Err(ImageOpsError::source(format!(
                    "source returned {:?} with {} bands for request {:?} with {} bands",
                    region.rect(),
                    region.bands(),
                    rect,
                    node.header.bands
                )));
            }
            Ok(region)
        }
        NodeKind::Cache(cache) => cache.render(rect),
        NodeKind::Op { op, inputs, stats } => render_operation(op, inputs, stats, &node.header, rect),
    }
}

/// Rectangle of the first input needed for `rect` of a same-extent operation.
fn input_rect(op: &Operation, input: &Image, rect: Rect) -> Rect {
    if op.contract().effects.contains(OperationEffect::NEIGHBOURHOOD) {
        rect.expand(op.margin(), &input.bounds())
    } else {
        rect
    }
}

fn luma_range<'a>(
    stats: &'a OnceCell<LumaRange>,
    input: &Image,
) -> PipelineResult<&'a LumaRange> {
    stats.get_or_try_init(|| {
        // Rendered on the calling thread: this may run inside a pool worker
        // while other workers wait on the cell.
        let full = input.render(input.bounds())?;
        let range = tone::luma_range(&full, input.header());
        trace!(target: "lazy_image_ops::pipeline", min = range.min, max = range.max, "luminance range");
        Ok(range)
    })
}

fn render_operation(
    op: &Operation,
    inputs: &[Image],
    stats: &OnceCell<LumaRange>,
    header: &ImageHeader,
    rect: Rect,
) -> PipelineResult<Region> {
    trace!(
        target: "lazy_image_ops::pipeline",
        op = op.contract().name,
        x = rect.x,
        y = rect.y,
        width = rect.width,
        height = rect.height,
        "render"
    );

    let first = &inputs[0];
    match op {
        Operation::Extract { left, top, .. } => {
            let source = Rect::new(rect.x + left, rect.y + top, rect.width, rect.height);
            Ok(first.render(source)?.relocated(rect.x, rect.y))
        }
        Operation::Composite { left, top } | Operation::Cutout { left, top } => {
            let (src, dst) = (&inputs[0], &inputs[1]);
            let dst_region = dst.render(rect)?;
            let src_region = rect
                .translate_clipped(-left, -top, &src.bounds())
                .map(|src_rect| src.render(src_rect))
                .transpose()?;
            let placement = composite::Placement {
                left: *left,
                top: *top,
                src: src.header(),
                dst: dst.header(),
                out: header,
            };
            Ok(match op {
                Operation::Composite { .. } => {
                    composite::composite_region(src_region.as_ref(), &dst_region, &placement)
                }
                _ => composite::cutout_region(src_region.as_ref(), &dst_region, &placement),
            })
        }
        Operation::Boolean { op: boolean } => {
            let left = first.render(rect)?;
            let right = inputs[1].render(rect)?;
            Ok(threshold::boolean_region(left, &right, *boolean, header))
        }
        _ => {
            let input = first.render(input_rect(op, first, rect))?;
            let in_header = first.header();
            Ok(match op {
                Operation::EnsureAlpha => composite::ensure_alpha_region(&input, in_header, header),
                Operation::Premultiply => composite::premultiply_region(input, in_header),
                Operation::Unpremultiply => composite::unpremultiply_region(input, in_header),
                Operation::Normalise => {
                    let range = luma_range(stats, first)?;
                    tone::normalise_region(input, in_header, *range)
                }
                Operation::Gamma { exponent } => tone::gamma_region(input, in_header, *exponent),
                Operation::Convolve { kernel } => {
                    filter::convolve_region(&input, rect, kernel, in_header)
                }
                Operation::Blur { sigma } => filter::gaussian_region(&input, rect, *sigma, in_header),
                Operation::Sharpen {
                    sigma,
                    flat,
                    jagged,
                } => filter::sharpen_region(&input, rect, *sigma, *flat, *jagged, in_header),
                Operation::Threshold {
                    threshold: level,
                    colour,
                } => threshold::threshold_region(input, in_header, *level, *colour),
                Operation::Bandbool { op: boolean } => {
                    threshold::bandbool_region(&input, *boolean, header)
                }
                Operation::Extract { .. }
                | Operation::Composite { .. }
                | Operation::Cutout { .. }
                | Operation::Boolean { .. } => unreachable!("handled above"),
            })
        }
    }
}
