//! The process-wide worker pool.
//!
//! Created on first use and shared by every multi-threaded build. The
//! size can be pinned by configuration before the first build; later
//! calls keep the existing pool.

use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::OnceLock;

static POOL: OnceLock<ThreadPool> = OnceLock::new();

fn build(threads: usize) -> ThreadPool {
    let mut builder = ThreadPoolBuilder::new();
    if threads > 0 {
        builder = builder.num_threads(threads);
    }
    builder
        .thread_name(|index| format!("rsaxs-worker-{index}"))
        .build()
        .expect("failed to spawn the worker pool")
}

/// Pin the pool size. Only effective before the first build; returns
/// whether this call created the pool.
pub fn initialize(threads: usize) -> bool {
    let mut created = false;
    POOL.get_or_init(|| {
        created = true;
        build(threads)
    });
    created
}

/// The shared pool, created with the hardware thread count if no explicit
/// size was pinned first.
pub fn pool() -> &'static ThreadPool {
    POOL.get_or_init(|| build(0))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pool_is_created_once() {
        let first = pool() as *const ThreadPool;
        let second = pool() as *const ThreadPool;
        assert_eq!(first, second);
        assert!(pool().current_num_threads() >= 1);
        // too late to resize now
        assert!(!initialize(1));
    }
}
