// src/engine/pool.rs
//
// Global thread pool used for strip-parallel materialization.
//
// A single pool is shared by every render call instead of one per request:
// no per-call creation cost, and thread count stays bounded no matter how
// many images are materialized at once.
//
// **Thread Count**:
// - EngineConfig::threads (LAZY_IMAGE_OPS_THREADS) when set
// - otherwise std::thread::available_parallelism(), which respects cgroup quotas
// - MIN_RAYON_THREADS when detection fails
//
// The pool is created on first use; configuration changes afterwards have no effect.

use crate::engine::config::config;
use rayon::ThreadPool;
use std::sync::OnceLock;

/// Minimum number of rayon threads to ensure at least some parallelism
const MIN_RAYON_THREADS: usize = 1;

static GLOBAL_THREAD_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

fn desired_threads() -> usize {
    config().threads.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(MIN_RAYON_THREADS)
    })
}

/// The shared pool, or `None` if no pool could be built (callers then render
/// on the current thread).
pub fn get_pool() -> Option<&'static ThreadPool> {
    GLOBAL_THREAD_POOL
        .get_or_init(|| {
            let num_threads = desired_threads().max(MIN_RAYON_THREADS);
            match rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .thread_name(|i| format!("lazy-image-ops-{i}"))
                .build()
            {
                Ok(pool) => Some(pool),
                Err(err) => {
                    tracing::warn!(target: "lazy_image_ops::pool", %err, num_threads, "falling back to sequential rendering");
                    None
                }
            }
        })
        .as_ref()
}
