//! Allocator configuration
//!
//! With `mimalloc` the process allocates through mimalloc. With
//! `memory_tracking` every allocation is also counted so the binary can
//! report peak heap usage (adds overhead, use only for profiling).

#[cfg(feature = "memory_tracking")]
mod tracking {
    use std::alloc::{GlobalAlloc, Layout};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub static ALLOCATED: AtomicUsize = AtomicUsize::new(0);
    pub static PEAK_ALLOCATED: AtomicUsize = AtomicUsize::new(0);

    pub struct TrackingAllocator;

    #[cfg(feature = "mimalloc")]
    static UNDERLYING: mimalloc::MiMalloc = mimalloc::MiMalloc;

    #[cfg(not(feature = "mimalloc"))]
    static UNDERLYING: std::alloc::System = std::alloc::System;

    unsafe impl GlobalAlloc for TrackingAllocator {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            let ptr = UNDERLYING.alloc(layout);
            if !ptr.is_null() {
                let size = layout.size();
                let current = ALLOCATED.fetch_add(size, Ordering::Relaxed) + size;
                PEAK_ALLOCATED.fetch_max(current, Ordering::Relaxed);
            }
            ptr
        }

        unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
            ALLOCATED.fetch_sub(layout.size(), Ordering::Relaxed);
            UNDERLYING.dealloc(ptr, layout)
        }
    }
}

#[cfg(feature = "memory_tracking")]
#[global_allocator]
static GLOBAL: tracking::TrackingAllocator = tracking::TrackingAllocator;

#[cfg(all(feature = "mimalloc", not(feature = "memory_tracking")))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Bytes currently allocated, when tracking is compiled in
#[cfg(feature = "memory_tracking")]
pub fn current_bytes() -> Option<usize> {
    use std::sync::atomic::Ordering;
    Some(tracking::ALLOCATED.load(Ordering::SeqCst))
}

/// Highest allocation total seen so far, when tracking is compiled in
#[cfg(feature = "memory_tracking")]
pub fn peak_bytes() -> Option<usize> {
    use std::sync::atomic::Ordering;
    Some(tracking::PEAK_ALLOCATED.load(Ordering::SeqCst))
}

#[cfg(not(feature = "memory_tracking"))]
pub fn current_bytes() -> Option<usize> {
    None
}

#[cfg(not(feature = "memory_tracking"))]
pub fn peak_bytes() -> Option<usize> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_not_below_current() {
        let _buf = vec![0u8; 1 << 16];
        match (current_bytes(), peak_bytes()) {
            (Some(current), Some(peak)) => assert!(peak >= current && current > 0),
            (None, None) => {}
            other => panic!("inconsistent tracking state: {other:?}"),
        }
    }
}
