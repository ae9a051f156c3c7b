use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use lazy_image_ops::{
    blur, composite, convolve, crop_with, ensure_alpha, normalise, premultiply, sharpen,
    EngineConfig, Gravity, Image, SampleFormat, Strategy,
};

fn test_image(width: u32, height: u32, bands: u32) -> Image {
    Image::from_fn(width, height, bands, SampleFormat::U8, |x, y, b| {
        ((x * 7 + y * 13 + b as u32 * 29) % 256) as f32
    })
    .unwrap()
}

fn bench_filters(c: &mut Criterion) {
    let img = test_image(512, 512, 3);
    let sequential = EngineConfig::sequential();
    let laplacian = [0.0, -1.0, 0.0, -1.0, 4.0, -1.0, 0.0, -1.0, 0.0];

    let mut group = c.benchmark_group("filters");
    group.bench_function("convolve_3x3", |b| {
        let out = convolve(&img, 3, 3, 1.0, 128.0, &laplacian).unwrap();
        b.iter(|| black_box(out.materialize_with(&sequential).unwrap()))
    });
    group.bench_function("blur_fast", |b| {
        let out = blur(&img, -1.0).unwrap();
        b.iter(|| black_box(out.materialize_with(&sequential).unwrap()))
    });
    group.bench_function("blur_sigma_3", |b| {
        let out = blur(&img, 3.0).unwrap();
        b.iter(|| black_box(out.materialize_with(&sequential).unwrap()))
    });
    group.bench_function("blur_sigma_3_parallel", |b| {
        let out = blur(&img, 3.0).unwrap();
        b.iter(|| black_box(out.materialize().unwrap()))
    });
    group.bench_function("sharpen", |b| {
        let out = sharpen(&img, 1.5, 1.0, 2.0).unwrap();
        b.iter(|| black_box(out.materialize_with(&sequential).unwrap()))
    });
    group.bench_function("normalise", |b| {
        // stats are memoized per node, so rebuild the node every iteration
        b.iter_batched(
            || normalise(&img).unwrap(),
            |out| black_box(out.materialize_with(&sequential).unwrap()),
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_crop(c: &mut Criterion) {
    let img = test_image(640, 480, 3);
    let config = EngineConfig::default();

    let mut group = c.benchmark_group("crop");
    group.bench_function("entropy", |b| {
        b.iter(|| black_box(crop_with(&img, 320, 320, &Strategy::Entropy, &config).unwrap()))
    });
    group.bench_function("attention", |b| {
        b.iter(|| black_box(crop_with(&img, 320, 320, &Strategy::Attention, &config).unwrap()))
    });
    group.finish();
}

fn bench_composite(c: &mut Criterion) {
    let dst = premultiply(&ensure_alpha(&test_image(1024, 768, 3)).unwrap()).unwrap();
    let src = premultiply(&test_image(256, 256, 4)).unwrap();

    c.bench_function("composite_centre", |b| {
        let out = composite(&src, &dst, Gravity::Centre).unwrap();
        b.iter(|| black_box(out.materialize().unwrap()))
    });
}

criterion_group!(benches, bench_filters, bench_crop, bench_composite);
criterion_main!(benches);
