//! Parallel/sequential mapping behind the `parallel` feature.
//!
//! The `cfg` switch lives here only; call sites pass `sequential` from
//! `[execution]` to force single-threaded runs at runtime.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Map `f` over `slice`, preserving input order.
#[inline]
pub fn map_slice<T, F, R>(slice: &[T], f: F, sequential: bool) -> Vec<R>
where
    T: Sync,
    F: Fn(&T) -> R + Sync + Send,
    R: Send,
{
    #[cfg(feature = "parallel")]
    {
        if sequential {
            slice.iter().map(f).collect()
        } else {
            slice.par_iter().map(f).collect()
        }
    }

    #[cfg(not(feature = "parallel"))]
    {
        let _ = sequential;
        slice.iter().map(f).collect()
    }
}
