// src/engine/cache.rs
//
// Tile cache: a memoizing node placed after shared upstream work.
//
// Requests are split on a fixed tile grid. Each tile lives in a slot
// (Arc<OnceCell>) indexed by an LRU map. The map lock is held only long enough
// to find or insert the slot; the computation itself runs inside
// OnceCell::get_or_try_init, so concurrent requesters for the same tile block
// on the first one instead of recomputing (single flight). Failed computations
// leave the slot empty and the next requester tries again.

use crate::engine::config::{config, EngineConfig};
use crate::engine::image::Image;
use crate::engine::region::{Rect, Region};
use crate::error::{ImageOpsError, Result};
use lru::LruCache;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// (column, row) on the tile grid
type TileKey = (u32, u32);
type TileSlot = Arc<OnceCell<Arc<Region>>>;

/// Counters exposed for diagnostics and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TileCacheStats {
    /// Tile reads served without running the upstream
    pub hits: u64,
    /// Upstream tile computations
    pub misses: u64,
    /// Slots dropped to respect the capacity
    pub evictions: u64,
    /// Slots currently held
    pub resident: usize,
    pub capacity: usize,
}

pub(crate) struct TileCache {
    upstream: Image,
    tile_width: u32,
    tile_height: u32,
    capacity: usize,
    tiles: Mutex<LruCache<TileKey, TileSlot>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl TileCache {
    fn new(upstream: Image, tile_width: u32, tile_height: u32, capacity: NonZeroUsize) -> Self {
        Self {
            upstream,
            tile_width,
            tile_height,
            capacity: capacity.get(),
            tiles: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn tile_rect(&self, (col, row): TileKey) -> Rect {
        let bounds = self.upstream.bounds();
        let x = col * self.tile_width;
        let y = row * self.tile_height;
        Rect::new(
            x,
            y,
            self.tile_width.min(bounds.right() - x),
            self.tile_height.min(bounds.bottom() - y),
        )
    }

    fn slot(&self, key: TileKey) -> TileSlot {
        let mut tiles = self.tiles.lock();
        if let Some(slot) = tiles.get(&key) {
            return Arc::clone(slot);
        }
        let slot: TileSlot = Arc::new(OnceCell::new());
        if let Some((evicted, _)) = tiles.push(key, Arc::clone(&slot)) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            trace!(target: "lazy_image_ops::cache", col = evicted.0, row = evicted.1, "tile evicted");
        }
        slot
    }

    fn tile(&self, key: TileKey) -> Result<Arc<Region>> {
        let slot = self.slot(key);
        let mut computed = false;
        let tile = slot.get_or_try_init(|| {
            computed = true;
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(target: "lazy_image_ops::cache", col = key.0, row = key.1, "tile miss");
            self.upstream.render(self.tile_rect(key)).map(Arc::new)
        })?;
        if !computed {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Arc::clone(tile))
    }

    pub(crate) fn render(&self, rect: Rect) -> Result<Region> {
        let first_col = rect.x / self.tile_width;
        let last_col = (rect.right() - 1) / self.tile_width;
        let first_row = rect.y / self.tile_height;
        let last_row = (rect.bottom() - 1) / self.tile_height;

        if first_col == last_col && first_row == last_row {
            let tile = self.tile((first_col, first_row))?;
            if tile.rect() == rect {
                return Ok((*tile).clone());
            }
            return Ok(tile.crop(rect));
        }

        let mut out = Region::new(rect, self.upstream.bands() as usize);
        for row in first_row..=last_row {
            for col in first_col..=last_col {
                let tile = self.tile((col, row))?;
                out.paste(&tile);
            }
        }
        Ok(out)
    }

    pub(crate) fn stats(&self) -> TileCacheStats {
        TileCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            resident: self.tiles.lock().len(),
            capacity: self.capacity,
        }
    }
}

/// Insert a tile cache after `image` using the process-wide tile geometry.
pub fn tile_cache(image: &Image, factor: f64) -> Result<Image> {
    tile_cache_with(image, factor, config())
}

/// Insert a tile cache after `image`. The cache holds
/// `ceil(factor * tiles_in_image)` tiles (at least one, at most all of them).
pub fn tile_cache_with(image: &Image, factor: f64, config: &EngineConfig) -> Result<Image> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err(ImageOpsError::invalid_argument(
            "factor",
            factor.to_string(),
            "must be a positive finite number",
        ));
    }
    config.validate()?;

    let tile_width = config.tile_width.min(image.width());
    let tile_height = config.tile_height.min(image.height());
    let total_tiles = image.width().div_ceil(tile_width) as usize
        * image.height().div_ceil(tile_height) as usize;
    let wanted = (factor * total_tiles as f64).ceil() as usize;
    let capacity = NonZeroUsize::new(wanted.clamp(1, total_tiles.max(1))).unwrap_or(NonZeroUsize::MIN);

    debug!(
        target: "lazy_image_ops::cache",
        tile_width,
        tile_height,
        capacity = capacity.get(),
        total_tiles,
        "tile cache inserted"
    );

    let header = *image.header();
    Ok(Image::with_cache(
        TileCache::new(image.clone(), tile_width, tile_height, capacity),
        header,
    ))
}

impl Image {
    /// Counters of the tile cache at this node, if it is one.
    pub fn tile_cache_stats(&self) -> Option<TileCacheStats> {
        self.cache().map(TileCache::stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::image::{ImageHeader, SampleFormat};
    use std::sync::atomic::AtomicUsize;

    fn counting_source(width: u32, height: u32) -> (Image, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let header = ImageHeader::new(width, height, 1, SampleFormat::U16).unwrap();
        let img = Image::from_source(header, move |rect: Rect| -> crate::Result<Region> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Region::from_fn(rect, 1, |x, y, _| (x * 7 + y * 13) as f32))
        });
        (img, calls)
    }

    fn small_tiles() -> EngineConfig {
        EngineConfig::sequential().with_tile_size(4, 4)
    }

    #[test]
    fn test_rejects_bad_factor() {
        let (img, _) = counting_source(8, 8);
        assert!(tile_cache(&img, 0.0).is_err());
        assert!(tile_cache(&img, -1.0).is_err());
        assert!(tile_cache(&img, f64::NAN).is_err());
    }

    #[test]
    fn test_repeated_reads_hit_cache() {
        let (img, calls) = counting_source(8, 8);
        let cached = tile_cache_with(&img, 1.0, &small_tiles()).unwrap();

        let first = cached.render(Rect::new(0, 0, 8, 8)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let second = cached.render(Rect::new(0, 0, 8, 8)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(first, second);

        let stats = cached.tile_cache_stats().unwrap();
        assert_eq!(stats.misses, 4);
        assert_eq!(stats.hits, 4);
        assert_eq!(stats.resident, 4);
    }

    #[test]
    fn test_values_match_upstream() {
        let (img, _) = counting_source(10, 7);
        let cached = tile_cache_with(&img, 1.0, &small_tiles()).unwrap();
        let rect = Rect::new(3, 2, 6, 5);
        assert_eq!(cached.render(rect).unwrap(), img.render(rect).unwrap());
    }

    #[test]
    fn test_capacity_bounds_residency() {
        let (img, calls) = counting_source(8, 8);
        // 4 tiles, factor 0.25 -> 1 resident tile
        let cached = tile_cache_with(&img, 0.25, &small_tiles()).unwrap();
        assert_eq!(cached.tile_cache_stats().unwrap().capacity, 1);

        cached.render(Rect::new(0, 0, 8, 8)).unwrap();
        cached.render(Rect::new(0, 0, 8, 8)).unwrap();
        let stats = cached.tile_cache_stats().unwrap();
        assert_eq!(stats.resident, 1);
        assert!(stats.evictions >= 3);
        assert_eq!(calls.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_failed_tile_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let header = ImageHeader::new(4, 4, 1, SampleFormat::U8).unwrap();
        let flaky = Image::from_source(header, move |rect: Rect| -> crate::Result<Region> {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ImageOpsError::source("transient"))
            } else {
                Ok(Region::new(rect, 1))
            }
        });
        let cached = tile_cache_with(&flaky, 1.0, &small_tiles()).unwrap();
        assert!(cached.render(Rect::of_size(4, 4)).is_err());
        assert!(cached.render(Rect::of_size(4, 4)).is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stats_absent_on_plain_nodes() {
        let (img, _) = counting_source(2, 2);
        assert!(img.tile_cache_stats().is_none());
    }
}
