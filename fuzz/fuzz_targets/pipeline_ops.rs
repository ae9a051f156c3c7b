#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use lazy_image_ops::{
    BooleanOp, EngineConfig, Gravity, Image, Rect, SampleFormat, Strategy,
};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct OperationSeed {
    kind: u8,
    a: i16,
    b: i16,
    c: u8,
    d: u8,
}

fn build_image(data: &[u8]) -> Option<Image> {
    let width = *data.first()? as u32 % 48 + 1;
    let height = *data.get(1)? as u32 % 48 + 1;
    let bands = *data.get(2)? as u32 % 4 + 1;
    Image::from_fn(width, height, bands, SampleFormat::U8, |x, y, b| {
        let i = (y * width + x) * bands + b as u32;
        data[i as usize % data.len()] as f32
    })
    .ok()
}

fn apply(image: &Image, seed: &OperationSeed) -> lazy_image_ops::Result<Image> {
    let scalar = seed.a as f64 / 16.0;
    let gravity = Gravity::ALL[seed.c as usize % Gravity::ALL.len()];
    match seed.kind % 16 {
        0 => lazy_image_ops::blur(image, scalar),
        1 => lazy_image_ops::sharpen(image, scalar, seed.c as f64 / 32.0, seed.d as f64 / 32.0),
        2 => lazy_image_ops::gamma(image, scalar),
        3 => lazy_image_ops::normalise(image),
        4 => lazy_image_ops::threshold(image, scalar * 4.0, seed.d % 2 == 0),
        5 => lazy_image_ops::bandbool(image, BooleanOp::ALL[seed.d as usize % 3]),
        6 => lazy_image_ops::boolean(image, image, BooleanOp::ALL[seed.d as usize % 3]),
        7 => lazy_image_ops::ensure_alpha(image),
        8 => lazy_image_ops::premultiply(image),
        9 => lazy_image_ops::unpremultiply(image),
        10 => lazy_image_ops::composite_at(&lazy_image_ops::ensure_alpha(image)?, image, seed.a as i64, seed.b as i64),
        11 => lazy_image_ops::cutout(image, image, gravity),
        12 => lazy_image_ops::extract_area(image, seed.c as u32, seed.d as u32, seed.a.unsigned_abs() as u32, seed.b.unsigned_abs() as u32),
        13 => {
            let strategy = if seed.d % 2 == 0 { Strategy::Entropy } else { Strategy::Attention };
            lazy_image_ops::smart_crop(image, seed.c as u32 + 1, seed.d as u32 + 1, &strategy)
        }
        14 => lazy_image_ops::trim(image, seed.c as f64),
        _ => lazy_image_ops::tile_cache_with(
            image,
            scalar,
            &EngineConfig::sequential().with_tile_size(seed.c as u32 % 32 + 1, seed.d as u32 % 32 + 1),
        ),
    }
}

fuzz_target!(|data: &[u8]| {
    let Some(mut image) = build_image(data) else {
        return;
    };
    let mut unstructured = Unstructured::new(data);
    let seeds: Vec<OperationSeed> = match Vec::arbitrary(&mut unstructured) {
        Ok(v) => v,
        Err(_) => return,
    };

    // Errors are expected for invalid arguments; only panics matter here.
    for seed in seeds.iter().take(8) {
        if let Ok(next) = apply(&image, seed) {
            image = next;
        }
    }
    let bounds = image.bounds();
    let half = Rect::new(bounds.width / 2, 0, bounds.width - bounds.width / 2, bounds.height);
    let _ = image.render(half);
    let _ = image.materialize_with(&EngineConfig::sequential());
});
