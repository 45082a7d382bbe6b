//! The fishing algorithm: compose registered conversions into an executable
//! [`Plan`] by routing through the canonical reference format. Also hosts
//! the execution engine that walks a built [`Plan`] over a pixel run.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::descriptor::conversion::Edge;
use crate::descriptor::{ComponentRef, ConversionRef, FormatRef};
use crate::error::Error;
use crate::kernel::Kernel as KernelFn;
use crate::Context;

/// Pixels per execution batch: big enough to amortize per-call overhead,
/// small enough that the ping-pong buffers stay cache-resident.
const BATCH_PIXELS: usize = 2048;

/// One step of an executable [`Plan`].
#[derive(Clone)]
pub(crate) enum Step {
    /// Run a registered kernel. `elements_per_pixel` is `1` for Model- and
    /// Format-kind conversions (the kernel consumes whole color tuples) and
    /// the destination component count for Type-kind conversions (the
    /// kernel treats the buffer as a flat scalar array). `src_pitch`/
    /// `dst_pitch` are the byte stride between consecutive *elements* the
    /// kernel is called over (one color tuple, or one scalar).
    ///
    /// The kernel function pointer is copied out of the registry at plan
    /// build time so that executing a plan never needs to touch the
    /// [`Context`] again — the execution engine is independent of the
    /// registry once a plan exists.
    Kernel {
        #[allow(dead_code)]
        conversion: ConversionRef,
        kernel: KernelFn,
        elements_per_pixel: u32,
        src_pitch: isize,
        dst_pitch: isize,
    },
    /// Permute components within each pixel; no kernel involved since this
    /// is pure data movement, not a registered conversion.
    Reorder {
        permutation: Vec<u32>,
        component_bytes: u32,
    },
}

impl Step {
    /// Bytes per pixel flowing into this step.
    fn src_bpp(&self) -> u32 {
        match self {
            Step::Kernel {
                src_pitch,
                elements_per_pixel,
                ..
            } => *src_pitch as u32 * elements_per_pixel,
            Step::Reorder {
                permutation,
                component_bytes,
            } => permutation.len() as u32 * component_bytes,
        }
    }

    /// Bytes per pixel flowing out of this step.
    fn dst_bpp(&self) -> u32 {
        match self {
            Step::Kernel {
                dst_pitch,
                elements_per_pixel,
                ..
            } => *dst_pitch as u32 * elements_per_pixel,
            Step::Reorder {
                permutation,
                component_bytes,
            } => permutation.len() as u32 * component_bytes,
        }
    }
}

/// An ordered sequence of leaf conversions (plus structural reorders) that
/// converts a buffer in `src_format` layout into `dst_format` layout.
pub struct Plan {
    pub(crate) steps: Vec<Step>,
    pub(crate) src_format: FormatRef,
    pub(crate) dst_format: FormatRef,
    pub(crate) src_bpp: u32,
    pub(crate) dst_bpp: u32,
    /// The registry generation this plan was built under; a cache entry is
    /// treated as stale once `Context`'s generation moves past it.
    pub(crate) generation: u64,
    /// Process-unique id, used only to key the thread-local ping-pong
    /// buffers so that concurrent `process` calls on distinct plans never
    /// share a buffer.
    id: u64,
}

static NEXT_PLAN_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static BUFFERS: RefCell<HashMap<u64, [Vec<u8>; 2]>> = RefCell::new(HashMap::new());
}

impl Plan {
    /// Source format this plan was built for.
    pub fn src_format(&self) -> FormatRef {
        self.src_format
    }

    /// Destination format this plan was built for.
    pub fn dst_format(&self) -> FormatRef {
        self.dst_format
    }

    /// Number of leaf steps (kernel calls plus structural reorders) in this
    /// plan. `0` for the identity (`src_format == dst_format`) plan, `1` for
    /// a direct `FormatToFormat` shortcut.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// The widest intermediate buffer (in bytes per pixel) this plan ever
    /// touches, used to size the execution engine's ping-pong buffers.
    fn max_bytes_per_pixel(&self) -> u32 {
        let mut max = self.src_bpp.max(self.dst_bpp);
        for step in &self.steps {
            max = max.max(step.src_bpp()).max(step.dst_bpp());
        }
        max.max(1)
    }

    /// Run this plan over up to `n_pixels` pixels of `src`, writing into
    /// `dst`. Returns the number of pixels actually produced, which is
    /// `n_pixels` unless some leaf kernel reported a short write.
    pub fn process(&self, src: &[u8], dst: &mut [u8], n_pixels: usize) -> usize {
        if n_pixels == 0 {
            return 0;
        }

        if self.steps.is_empty() {
            // Identity plan: src == dst format, a straight byte copy.
            let bpp = self.src_bpp.max(1) as usize;
            let n = n_pixels
                .min(src.len() / bpp)
                .min(dst.len() / self.dst_bpp.max(1) as usize);
            let bytes = n * bpp;
            dst[..bytes].copy_from_slice(&src[..bytes]);
            return n;
        }

        let batch_len = BATCH_PIXELS.min(n_pixels);
        let widest = self.max_bytes_per_pixel() as usize;

        BUFFERS.with(|cell| {
            let mut map = cell.borrow_mut();
            let bufs = map.entry(self.id).or_insert_with(|| {
                [
                    vec![0u8; batch_len * widest],
                    vec![0u8; batch_len * widest],
                ]
            });
            if bufs[0].len() < batch_len * widest {
                bufs[0].resize(batch_len * widest, 0);
                bufs[1].resize(batch_len * widest, 0);
            }

            let mut total_processed = 0usize;
            let mut offset = 0usize;
            'batches: while offset < n_pixels {
                let this_batch = (n_pixels - offset).min(BATCH_PIXELS);
                let src_off = offset * self.src_bpp as usize;
                let dst_off = offset * self.dst_bpp as usize;

                let mut count = this_batch;
                let mut cur_src_ptr = src[src_off..].as_ptr();
                let mut ping = 0usize;
                let last = self.steps.len() - 1;

                for (i, step) in self.steps.iter().enumerate() {
                    let out_ptr: *mut u8 = if i == last {
                        dst[dst_off..].as_mut_ptr()
                    } else {
                        bufs[ping].as_mut_ptr()
                    };

                    count = match step {
                        Step::Kernel {
                            kernel,
                            elements_per_pixel,
                            src_pitch,
                            dst_pitch,
                            ..
                        } => {
                            let epp = (*elements_per_pixel).max(1) as usize;
                            let n_elems = count * epp;
                            // SAFETY: `cur_src_ptr`/`out_ptr` reference at
                            // least `n_elems` elements at the advertised
                            // pitches, matching the engine's half of the
                            // leaf kernel contract.
                            let processed =
                                unsafe { kernel(cur_src_ptr, out_ptr, *src_pitch, *dst_pitch, n_elems) };
                            processed / epp
                        }
                        Step::Reorder {
                            permutation,
                            component_bytes,
                        } => {
                            reorder(cur_src_ptr, out_ptr, permutation, *component_bytes as usize, count);
                            count
                        }
                    };

                    if count == 0 {
                        break;
                    }
                    cur_src_ptr = out_ptr as *const u8;
                    ping = 1 - ping;
                }

                total_processed += count;
                if count < this_batch {
                    break 'batches;
                }
                offset += this_batch;
            }

            total_processed.min(n_pixels)
        })
    }
}

/// Permute components within each of `count` pixels, copying `src` to
/// `dst`. Pure data movement: no leaf kernel is involved.
fn reorder(src: *const u8, dst: *mut u8, permutation: &[u32], component_bytes: usize, count: usize) {
    let pixel_bytes = permutation.len() * component_bytes;
    for p in 0..count {
        for (dst_idx, &src_idx) in permutation.iter().enumerate() {
            // SAFETY: both pointers reference `count` pixels of
            // `pixel_bytes` each, guaranteed by the caller (the execution
            // loop above, which sizes buffers from the same `permutation`).
            unsafe {
                let s = src.add(p * pixel_bytes + src_idx as usize * component_bytes);
                let d = dst.add(p * pixel_bytes + dst_idx * component_bytes);
                core::ptr::copy_nonoverlapping(s, d, component_bytes);
            }
        }
    }
}

/// Build a permutation moving `from` order into `to` order, provided both
/// are the same multiset of components. Returns `None` if they are not.
fn permutation_of(from: &[ComponentRef], to: &[ComponentRef]) -> Option<Vec<u32>> {
    if from.len() != to.len() {
        return None;
    }
    let mut used = vec![false; from.len()];
    let mut perm = Vec::with_capacity(to.len());
    for &want in to {
        let idx = from
            .iter()
            .enumerate()
            .find(|(i, &have)| !used[*i] && have == want)
            .map(|(i, _)| i)?;
        used[idx] = true;
        perm.push(idx as u32);
    }
    Some(perm)
}

pub(crate) fn fish(ctx: &Context, src: FormatRef, dst: FormatRef) -> Result<Plan, Error> {
    let id = NEXT_PLAN_ID.fetch_add(1, Ordering::Relaxed);

    if src == dst {
        let bpp = ctx.formats.by_id(src)?.bytes_per_pixel;
        return Ok(Plan {
            steps: Vec::new(),
            src_format: src,
            dst_format: dst,
            src_bpp: bpp,
            dst_bpp: bpp,
            generation: ctx.generation(),
            id,
        });
    }

    let src_fmt = ctx.formats.by_id(src)?.clone();
    let dst_fmt = ctx.formats.by_id(dst)?.clone();

    if let Some(conversion) = ctx.conversions.format_shortcut(src, dst) {
        let conv = ctx.conversions.conversion(conversion);
        return Ok(Plan {
            steps: vec![Step::Kernel {
                conversion,
                kernel: conv.kernel,
                elements_per_pixel: 1,
                src_pitch: src_fmt.bytes_per_pixel as isize,
                dst_pitch: dst_fmt.bytes_per_pixel as isize,
            }],
            src_format: src,
            dst_format: dst,
            src_bpp: src_fmt.bytes_per_pixel,
            dst_bpp: dst_fmt.bytes_per_pixel,
            generation: ctx.generation(),
            id,
        });
    }

    let ref_ty = ctx.reference_type.ok_or_else(|| no_path(ctx, src, dst))?;
    let src_model = ctx.models.by_id(src_fmt.model)?.clone();
    let dst_model = ctx.models.by_id(dst_fmt.model)?.clone();
    let ref_ty_bytes = ctx.types.by_id(ref_ty)?.bytes();

    let mut steps = Vec::new();

    // Leg A: S -> Rfmt_S (S's model, canonical component order, reference type).
    // Format registration guarantees a format's components are a permutation
    // of its model's, so this always matches; the `None` arm is defensive.
    if let Some(perm) = permutation_of(&src_fmt.components, &src_model.components) {
        if perm.iter().enumerate().any(|(i, &p)| i as u32 != p) {
            steps.push(Step::Reorder {
                permutation: perm,
                component_bytes: src_fmt.bytes_per_pixel / src_fmt.components.len() as u32,
            });
        }
    } else {
        return Err(no_path(ctx, src, dst));
    }
    if src_fmt.ty != ref_ty {
        let path = ctx
            .conversions
            .type_path(src_fmt.ty, ref_ty)
            .ok_or_else(|| no_path(ctx, src, dst))?;
        let n = src_model.components.len() as u32;
        for conversion in path {
            let conv = ctx.conversions.conversion(conversion);
            let (s_ty, d_ty) = match conv.edge {
                Edge::Type(s, d) => (s, d),
                _ => unreachable!("type_path only returns TypeToType edges"),
            };
            let s_bytes = ctx.types.by_id(s_ty)?.bytes();
            let d_bytes = ctx.types.by_id(d_ty)?.bytes();
            steps.push(Step::Kernel {
                conversion,
                kernel: conv.kernel,
                elements_per_pixel: n,
                src_pitch: s_bytes as isize,
                dst_pitch: d_bytes as isize,
            });
        }
    }

    // Leg B: model-to-model path, entirely in reference-type space.
    if src_model.name != dst_model.name {
        let path = ctx
            .conversions
            .model_path(src_fmt.model, dst_fmt.model)
            .ok_or_else(|| no_path(ctx, src, dst))?;
        for conversion in path {
            let conv = ctx.conversions.conversion(conversion);
            let (s_model, d_model) = match conv.edge {
                Edge::Model(s, d) => (s, d),
                _ => unreachable!("model_path only returns ModelToModel edges"),
            };
            let s_n = ctx.models.by_id(s_model)?.components.len() as u32;
            let d_n = ctx.models.by_id(d_model)?.components.len() as u32;
            steps.push(Step::Kernel {
                conversion,
                kernel: conv.kernel,
                elements_per_pixel: 1,
                src_pitch: (s_n * ref_ty_bytes) as isize,
                dst_pitch: (d_n * ref_ty_bytes) as isize,
            });
        }
    }

    // Leg C: Rfmt_D -> D.
    if dst_fmt.ty != ref_ty {
        let path = ctx
            .conversions
            .type_path(ref_ty, dst_fmt.ty)
            .ok_or_else(|| no_path(ctx, src, dst))?;
        let n = dst_model.components.len() as u32;
        for conversion in path {
            let conv = ctx.conversions.conversion(conversion);
            let (s_ty, d_ty) = match conv.edge {
                Edge::Type(s, d) => (s, d),
                _ => unreachable!("type_path only returns TypeToType edges"),
            };
            let s_bytes = ctx.types.by_id(s_ty)?.bytes();
            let d_bytes = ctx.types.by_id(d_ty)?.bytes();
            steps.push(Step::Kernel {
                conversion,
                kernel: conv.kernel,
                elements_per_pixel: n,
                src_pitch: s_bytes as isize,
                dst_pitch: d_bytes as isize,
            });
        }
    }
    // Leg C's reorder, same guarantee as Leg A's above.
    if let Some(perm) = permutation_of(&dst_model.components, &dst_fmt.components) {
        if perm.iter().enumerate().any(|(i, &p)| i as u32 != p) {
            steps.push(Step::Reorder {
                permutation: perm,
                component_bytes: dst_fmt.bytes_per_pixel / dst_fmt.components.len() as u32,
            });
        }
    } else {
        return Err(no_path(ctx, src, dst));
    }

    Ok(Plan {
        steps,
        src_format: src,
        dst_format: dst,
        src_bpp: src_fmt.bytes_per_pixel,
        dst_bpp: dst_fmt.bytes_per_pixel,
        generation: ctx.generation(),
        id,
    })
}

fn no_path(ctx: &Context, src: FormatRef, dst: FormatRef) -> Error {
    let src_name = ctx
        .formats
        .by_id(src)
        .map(|f| f.name.clone())
        .unwrap_or_else(|_| format!("#{}", src.id()));
    let dst_name = ctx
        .formats
        .by_id(dst)
        .map(|f| f.name.clone())
        .unwrap_or_else(|_| format!("#{}", dst.id()));
    Error::NoPath {
        src: src_name,
        dst: dst_name,
    }
}
