use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use lazy_image_ops::{blur, tile_cache_with, EngineConfig, Image, Rect, SampleFormat};
use std::sync::Arc;
use std::thread;

fn upstream() -> Image {
    let img = Image::from_fn(512, 512, 3, SampleFormat::U8, |x, y, b| {
        ((x ^ y) + b as u32 * 40) as f32 % 256.0
    })
    .unwrap();
    blur(&img, 2.5).unwrap()
}

fn hammer(image: &Image, threads: usize, rounds: u32) {
    let image = Arc::new(image.clone());
    let mut handles = Vec::with_capacity(threads);
    for t in 0..threads {
        let image = Arc::clone(&image);
        handles.push(thread::spawn(move || {
            for r in 0..rounds {
                let offset = (t as u32 * 37 + r * 53) % 384;
                image.render(Rect::new(offset, offset / 2, 128, 128)).unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
}

fn bench_shared_upstream(c: &mut Criterion) {
    let image = upstream();
    let config = EngineConfig::sequential().with_tile_size(64, 64);

    let mut group = c.benchmark_group("tile_cache");
    group.bench_function("uncached_16_threads", |b| {
        b.iter(|| hammer(black_box(&image), 16, 8))
    });
    group.bench_function("cached_16_threads", |b| {
        // fresh cache each batch so hit ratios stay comparable
        b.iter_batched(
            || tile_cache_with(&image, 2.0, &config).unwrap(),
            |cached| hammer(&cached, 16, 8),
            BatchSize::SmallInput,
        )
    });
    group.bench_function("cached_small_capacity", |b| {
        b.iter_batched(
            || tile_cache_with(&image, 0.1, &config).unwrap(),
            |cached| hammer(&cached, 16, 8),
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(tile_cache, bench_shared_upstream);
criterion_main!(tile_cache);
