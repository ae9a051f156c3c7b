#![no_main]

use arbitrary::Arbitrary;
use lazy_image_ops::{convolve_kernel, EngineConfig, Image, Kernel, SampleFormat};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    width: u8,
    height: u8,
    kernel_width: u8,
    kernel_height: u8,
    scale: f64,
    offset: f64,
    weights: Vec<f64>,
    float_samples: bool,
}

fuzz_target!(|input: Input| {
    let format = if input.float_samples { SampleFormat::F32 } else { SampleFormat::U8 };
    let width = input.width as u32 % 32 + 1;
    let height = input.height as u32 % 32 + 1;
    let Ok(image) = Image::from_fn(width, height, 2, format, |x, y, b| {
        ((x * 3 + y * 5 + b as u32) % 256) as f32 / if input.float_samples { 255.0 } else { 1.0 }
    }) else {
        return;
    };
    let Ok(kernel) = Kernel::new(
        input.kernel_width as u32 % 16,
        input.kernel_height as u32 % 16,
        input.scale,
        input.offset,
        input.weights,
    ) else {
        return;
    };
    if let Ok(out) = convolve_kernel(&image, kernel) {
        let _ = out.materialize_with(&EngineConfig::sequential());
    }
});
