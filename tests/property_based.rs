// tests/property_based.rs
//
// Property-based tests for lazy-image-ops

use lazy_image_ops::{
    blur, composite, convolve, crop_with, cutout, gamma, sharpen, tile_cache_with, EngineConfig,
    Gravity, Image, Rect, SampleFormat, Strategy as CropKind,
};
use proptest::prelude::*;

fn create_test_image(width: u32, height: u32, bands: u32, seed: u32) -> Image {
    Image::from_fn(width, height, bands, SampleFormat::U8, |x, y, b| {
        ((x.wrapping_mul(31) ^ y.wrapping_mul(17) ^ seed).wrapping_add(b as u32 * 71) % 256) as f32
    })
    .unwrap()
}

fn gravity_strategy() -> impl Strategy<Value = Gravity> {
    (0usize..9).prop_map(|i| Gravity::ALL[i])
}

fn sub_rect_strategy() -> impl Strategy<Value = (u32, u32, Rect)> {
    (1u32..=24, 1u32..=24)
        .prop_flat_map(|(w, h)| (Just(w), Just(h), 0..w, 0..h))
        .prop_flat_map(|(w, h, x, y)| (Just(w), Just(h), Just(x), Just(y), 1..=w - x, 1..=h - y))
        .prop_map(|(w, h, x, y, rw, rh)| (w, h, Rect::new(x, y, rw, rh)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_gravity_offset_places_src_on_anchor(
        gravity in gravity_strategy(),
        dst_w in 1u32..=200,
        dst_h in 1u32..=200,
        src_w in 1u32..=200,
        src_h in 1u32..=200,
    ) {
        let (left, top) = gravity.offset(dst_w, dst_h, src_w, src_h);
        let (dx, dy) = (dst_w as i64 - src_w as i64, dst_h as i64 - src_h as i64);
        prop_assert!([0, dx / 2, dx].contains(&left));
        prop_assert!([0, dy / 2, dy].contains(&top));
        if gravity == Gravity::NorthWest {
            prop_assert_eq!((left, top), (0, 0));
        }
        if gravity == Gravity::SouthEast {
            prop_assert_eq!((left, top), (dx, dy));
        }
    }

    #[test]
    fn prop_transparent_src_is_identity(
        gravity in gravity_strategy(),
        w in 1u32..=12,
        h in 1u32..=12,
        sw in 1u32..=16,
        sh in 1u32..=16,
    ) {
        let dst = lazy_image_ops::ensure_alpha(&create_test_image(w, h, 3, 3)).unwrap();
        let src = Image::filled(sw, sh, SampleFormat::U8, &[0.0; 4]).unwrap();
        let out = composite(&src, &dst, gravity).unwrap().materialize().unwrap();
        prop_assert_eq!(out, dst.materialize().unwrap());
    }

    #[test]
    fn prop_sub_rect_render_matches_full(
        (w, h, rect) in sub_rect_strategy(),
        sigma in 0.3f64..2.5,
        seed in 0u32..1000,
    ) {
        let img = create_test_image(w, h, 3, seed);
        let pipelines = [
            blur(&img, sigma).unwrap(),
            sharpen(&img, sigma, 1.0, 2.0).unwrap(),
            convolve(&img, 3, 2, 0.25, 1.0, &[1.0, 0.0, -1.0, 2.0, 1.0, 0.0]).unwrap(),
            gamma(&img, sigma).unwrap(),
        ];
        for out in pipelines {
            let full = out.materialize_with(&EngineConfig::sequential()).unwrap();
            prop_assert_eq!(out.render(rect).unwrap(), full.crop(rect));
        }
    }

    #[test]
    fn prop_cutout_never_raises_alpha(
        gravity in gravity_strategy(),
        seed in 0u32..1000,
    ) {
        let dst = create_test_image(10, 8, 4, seed);
        let stencil = create_test_image(5, 5, 2, seed.wrapping_add(1));
        let out = cutout(&stencil, &dst, gravity).unwrap().materialize().unwrap();
        let before = dst.materialize().unwrap();
        for (after, original) in out.pixels().zip(before.pixels()) {
            prop_assert!(after[3] <= original[3]);
            prop_assert_eq!(&after[..3], &original[..3]);
        }
    }

    #[test]
    fn prop_tile_cache_is_transparent(
        (w, h, rect) in sub_rect_strategy(),
        tile_w in 1u32..=9,
        tile_h in 1u32..=9,
        factor in 0.05f64..2.0,
    ) {
        let img = blur(&create_test_image(w, h, 2, 7), 1.0).unwrap();
        let config = EngineConfig::sequential().with_tile_size(tile_w, tile_h);
        let cached = tile_cache_with(&img, factor, &config).unwrap();
        prop_assert_eq!(cached.render(rect).unwrap(), img.render(rect).unwrap());
        prop_assert_eq!(cached.render(rect).unwrap(), img.render(rect).unwrap());
        let stats = cached.tile_cache_stats().unwrap();
        prop_assert!(stats.resident <= stats.capacity);
    }

    #[test]
    fn prop_crop_offset_within_bounds(
        w in 1u32..=40,
        h in 1u32..=40,
        tw in 1u32..=40,
        th in 1u32..=40,
        candidates in 1u32..=16,
    ) {
        let img = create_test_image(w, h, 3, 11);
        let config = EngineConfig::sequential().with_crop_candidates(candidates);
        let result = crop_with(&img, tw, th, &CropKind::Entropy, &config);
        if tw > w || th > h {
            prop_assert!(result.is_err());
        } else {
            let (x, y) = result.unwrap();
            prop_assert!(x + tw <= w);
            prop_assert!(y + th <= h);
        }
    }
}
