//! The calling convention every leaf conversion routine must respect.
//!
//! Preserved verbatim from the kind of hand-vectorized kernels this library
//! is meant to host (pitched pointers, signed byte pitches, a returned
//! processed-count) so that an existing SIMD routine compiled to a C ABI
//! can be registered without a shim.

/// A leaf conversion routine.
///
/// # Safety
///
/// The engine guarantees `src` and `dst` each reference at least `count`
/// elements at their respective pitches, that the pitches may be negative
/// (to support reversed iteration) but never straddle an allocation
/// boundary, and that `count > 0`. The kernel must write exactly
/// `count_processed <= count` destination pixels and return that count; a
/// smaller return is treated by the engine as a short write, not an error.
pub type Kernel =
    unsafe fn(src: *const u8, dst: *mut u8, src_pitch: isize, dst_pitch: isize, count: usize) -> usize;
