//! The baseline types, components, models, formats and conversions shipped
//! by the library itself, registered through the exact same
//! `Context::register_*` surface a third-party extension uses — proof that
//! the extension contract isn't privileged.
//!
//! The scaled integer↔float conversions implement the usual clamp-then-
//! affine-map scaling; the premultiply/un-premultiply kernels are a scalar
//! fallback of the vectorized associated-alpha routines a hand-written SIMD
//! extension would otherwise supply.

use bytemuck::Pod;

use crate::descriptor::component::Component;
use crate::descriptor::conversion::Edge;
use crate::descriptor::model::Model;
use crate::descriptor::ty::Type;
use crate::descriptor::{ComponentRef, ModelRef, TypeRef};
use crate::error::Error;
use crate::Context;

/// Register every built-in type, component, model, format and conversion.
pub(crate) fn register(ctx: &mut Context) -> Result<(), Error> {
    let (u8_ty, u16_ty, float_ty, double_ty) = register_types(ctx)?;
    let (r, g, b, a, rp, gp, bp, y) = register_components(ctx)?;

    let rgb = ctx.register_model("RGB", vec![r, g, b])?;
    let rgba = ctx.register_reference_model("RGBA", vec![r, g, b, a])?;
    let rgba_premul = ctx.register_model("RGBA-premultiplied", vec![r, g, b, a])?;
    let rgba_gamma = ctx.register_model("RGBA-gamma", vec![rp, gp, bp, a])?;
    let gray = ctx.register_model("Gray", vec![y])?;

    register_model_conversions(ctx, rgb, rgba, rgba_premul, rgba_gamma, gray)?;
    register_formats(ctx, u8_ty, u16_ty, float_ty, double_ty, rgb, rgba, rgba_premul, rgba_gamma, gray)?;

    Ok(())
}

fn register_types(ctx: &mut Context) -> Result<(TypeRef, TypeRef, TypeRef, TypeRef), Error> {
    let u8_ty = ctx.register_type(Type {
        name: "u8".into(),
        bits: 8,
        is_floating: false,
        min: 0.0,
        max: 255.0,
        min_val: 0.0,
        max_val: 1.0,
    })?;
    let u16_ty = ctx.register_type(Type {
        name: "u16".into(),
        bits: 16,
        is_floating: false,
        min: 0.0,
        max: 65535.0,
        min_val: 0.0,
        max_val: 1.0,
    })?;
    let float_ty = ctx.register_type(Type {
        name: "float".into(),
        bits: 32,
        is_floating: true,
        min: f32::MIN as f64,
        max: f32::MAX as f64,
        min_val: f32::MIN as f64,
        max_val: f32::MAX as f64,
    })?;
    let double_ty = ctx.register_type(Type {
        name: "double".into(),
        bits: 64,
        is_floating: true,
        min: f64::MIN,
        max: f64::MAX,
        min_val: f64::MIN,
        max_val: f64::MAX,
    })?;

    ctx.register_conversion(Edge::Type(u8_ty, double_ty), convert_u8_double, None)?;
    ctx.register_conversion(Edge::Type(double_ty, u8_ty), convert_double_u8, None)?;
    ctx.register_conversion(Edge::Type(u16_ty, double_ty), convert_u16_double, None)?;
    ctx.register_conversion(Edge::Type(double_ty, u16_ty), convert_double_u16, None)?;
    ctx.register_conversion(Edge::Type(float_ty, double_ty), convert_float_double, None)?;
    ctx.register_conversion(Edge::Type(double_ty, float_ty), convert_double_float, None)?;

    Ok((u8_ty, u16_ty, float_ty, double_ty))
}

#[allow(clippy::type_complexity)]
fn register_components(
    ctx: &mut Context,
) -> Result<
    (
        ComponentRef,
        ComponentRef,
        ComponentRef,
        ComponentRef,
        ComponentRef,
        ComponentRef,
        ComponentRef,
        ComponentRef,
    ),
    Error,
> {
    let r = ctx.register_component(Component::new("R"))?;
    let g = ctx.register_component(Component::new("G"))?;
    let b = ctx.register_component(Component::new("B"))?;
    let a = ctx.register_component(Component::new("A").alpha())?;
    let rp = ctx.register_component(Component::new("R'").gamma())?;
    let gp = ctx.register_component(Component::new("G'").gamma())?;
    let bp = ctx.register_component(Component::new("B'").gamma())?;
    let y = ctx.register_component(Component::new("Y"))?;
    Ok((r, g, b, a, rp, gp, bp, y))
}

#[allow(clippy::too_many_arguments)]
fn register_model_conversions(
    ctx: &mut Context,
    rgb: ModelRef,
    rgba: ModelRef,
    rgba_premul: ModelRef,
    rgba_gamma: ModelRef,
    gray: ModelRef,
) -> Result<(), Error> {
    ctx.register_conversion(Edge::Model(rgb, rgba), rgb_to_rgba, None)?;
    ctx.register_conversion(Edge::Model(rgba, rgb), rgba_to_rgb, None)?;
    ctx.register_conversion(Edge::Model(rgba, rgba_premul), rgba_premultiply, None)?;
    ctx.register_conversion(Edge::Model(rgba_premul, rgba), rgba_unpremultiply, None)?;
    ctx.register_conversion(Edge::Model(rgba, rgba_gamma), rgba_linear_to_gamma, None)?;
    ctx.register_conversion(Edge::Model(rgba_gamma, rgba), rgba_gamma_to_linear, None)?;
    ctx.register_conversion(Edge::Model(rgba, gray), rgba_to_gray, None)?;
    ctx.register_conversion(Edge::Model(gray, rgba), gray_to_rgba, None)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn register_formats(
    ctx: &mut Context,
    u8_ty: TypeRef,
    u16_ty: TypeRef,
    float_ty: TypeRef,
    double_ty: TypeRef,
    rgb: ModelRef,
    rgba: ModelRef,
    rgba_premul: ModelRef,
    rgba_gamma: ModelRef,
    gray: ModelRef,
) -> Result<(), Error> {
    let rgba_components: Vec<ComponentRef> = ctx.model_by_ref(rgba)?.components.clone();
    let rgba_gamma_components: Vec<ComponentRef> = ctx.model_by_ref(rgba_gamma)?.components.clone();
    let rgb_components: Vec<ComponentRef> = ctx.model_by_ref(rgb)?.components.clone();
    let gray_components: Vec<ComponentRef> = ctx.model_by_ref(gray)?.components.clone();

    ctx.register_reference_format(
        "RGBA-double",
        rgba,
        double_ty,
        rgba_components.clone(),
    )?;

    ctx.register_format_interleaved("rgbaF_linear", rgba, float_ty, rgba_components.clone())?;
    ctx.register_format_interleaved(
        "rgbAF_linear",
        rgba_premul,
        float_ty,
        rgba_components.clone(),
    )?;
    ctx.register_format_interleaved(
        "rgbaF_gamma",
        rgba_gamma,
        float_ty,
        rgba_gamma_components,
    )?;

    ctx.register_format_interleaved("RGBA-u8", rgba, u8_ty, rgba_components.clone())?;
    ctx.register_format_interleaved(
        "BGRA-u8",
        rgba,
        u8_ty,
        vec![
            rgba_components[2],
            rgba_components[1],
            rgba_components[0],
            rgba_components[3],
        ],
    )?;
    ctx.register_format_interleaved("RGB-u8", rgb, u8_ty, rgb_components)?;
    ctx.register_format_interleaved("Y-u16", gray, u16_ty, gray_components.clone())?;
    ctx.register_format_interleaved("Y-double", gray, double_ty, gray_components)?;

    Ok(())
}

// --- Type <-> Type kernels -------------------------------------------------
//
// All pitches are in bytes, per the leaf kernel calling convention; reads/
// writes go through `bytemuck` so that a pitch which does not happen to be
// a multiple of the scalar's alignment is still sound.

unsafe fn read_at<T: Pod>(base: *const u8, pitch: isize, i: usize) -> T {
    let ptr = unsafe { base.offset(pitch * i as isize) };
    let bytes = unsafe { core::slice::from_raw_parts(ptr, core::mem::size_of::<T>()) };
    bytemuck::pod_read_unaligned(bytes)
}

unsafe fn write_at<T: Pod>(base: *mut u8, pitch: isize, i: usize, value: T) {
    let ptr = unsafe { base.offset(pitch * i as isize) };
    let bytes = unsafe { core::slice::from_raw_parts_mut(ptr, core::mem::size_of::<T>()) };
    bytes.copy_from_slice(bytemuck::bytes_of(&value));
}

/// Clamp to `[min, max]`, then affine-map into `[min_val, max_val]`.
fn int_to_double(raw: f64, min: f64, max: f64, min_val: f64, max_val: f64) -> f64 {
    if raw <= min {
        min_val
    } else if raw >= max {
        max_val
    } else {
        (raw - min) / (max - min) * (max_val - min_val) + min_val
    }
}

/// Inverse of [`int_to_double`].
fn double_to_int(val: f64, min: f64, max: f64, min_val: f64, max_val: f64) -> f64 {
    if val <= min_val {
        min
    } else if val >= max_val {
        max
    } else {
        (val - min_val) / (max_val - min_val) * (max - min) + min
    }
}

unsafe fn convert_u8_double(src: *const u8, dst: *mut u8, sp: isize, dp: isize, n: usize) -> usize {
    for i in 0..n {
        let raw: u8 = unsafe { read_at(src, sp, i) };
        let val = int_to_double(raw as f64, 0.0, 255.0, 0.0, 1.0);
        unsafe { write_at::<f64>(dst, dp, i, val) };
    }
    n
}

unsafe fn convert_double_u8(src: *const u8, dst: *mut u8, sp: isize, dp: isize, n: usize) -> usize {
    for i in 0..n {
        let raw: f64 = unsafe { read_at(src, sp, i) };
        let val = double_to_int(raw, 0.0, 255.0, 0.0, 1.0).round().clamp(0.0, 255.0) as u8;
        unsafe { write_at(dst, dp, i, val) };
    }
    n
}

unsafe fn convert_u16_double(src: *const u8, dst: *mut u8, sp: isize, dp: isize, n: usize) -> usize {
    for i in 0..n {
        let raw: u16 = unsafe { read_at(src, sp, i) };
        let val = int_to_double(raw as f64, 0.0, 65535.0, 0.0, 1.0);
        unsafe { write_at::<f64>(dst, dp, i, val) };
    }
    n
}

unsafe fn convert_double_u16(src: *const u8, dst: *mut u8, sp: isize, dp: isize, n: usize) -> usize {
    for i in 0..n {
        let raw: f64 = unsafe { read_at(src, sp, i) };
        let val = double_to_int(raw, 0.0, 65535.0, 0.0, 1.0).round().clamp(0.0, 65535.0) as u16;
        unsafe { write_at(dst, dp, i, val) };
    }
    n
}

unsafe fn convert_float_double(src: *const u8, dst: *mut u8, sp: isize, dp: isize, n: usize) -> usize {
    for i in 0..n {
        let raw: f32 = unsafe { read_at(src, sp, i) };
        unsafe { write_at::<f64>(dst, dp, i, raw as f64) };
    }
    n
}

unsafe fn convert_double_float(src: *const u8, dst: *mut u8, sp: isize, dp: isize, n: usize) -> usize {
    for i in 0..n {
        let raw: f64 = unsafe { read_at(src, sp, i) };
        unsafe { write_at::<f32>(dst, dp, i, raw as f32) };
    }
    n
}

// --- Model <-> Model kernels ------------------------------------------------
//
// All of these operate on whole pixels in reference-type (`f64`) space, one
// call per pixel tuple (`elements_per_pixel == 1`), so pitches below are
// always a full RGB(A) tuple's byte width.

unsafe fn rgb_to_rgba(src: *const u8, dst: *mut u8, sp: isize, dp: isize, n: usize) -> usize {
    for i in 0..n {
        let base_s = unsafe { src.offset(sp * i as isize) };
        let base_d = unsafe { dst.offset(dp * i as isize) };
        for k in 0..3 {
            let v: f64 = unsafe { read_at(base_s, 8, k) };
            unsafe { write_at(base_d, 8, k, v) };
        }
        unsafe { write_at(base_d, 8, 3, 1.0f64) };
    }
    n
}

unsafe fn rgba_to_rgb(src: *const u8, dst: *mut u8, sp: isize, dp: isize, n: usize) -> usize {
    for i in 0..n {
        let base_s = unsafe { src.offset(sp * i as isize) };
        let base_d = unsafe { dst.offset(dp * i as isize) };
        for k in 0..3 {
            let v: f64 = unsafe { read_at(base_s, 8, k) };
            unsafe { write_at(base_d, 8, k, v) };
        }
    }
    n
}

unsafe fn rgba_premultiply(src: *const u8, dst: *mut u8, sp: isize, dp: isize, n: usize) -> usize {
    for i in 0..n {
        let base_s = unsafe { src.offset(sp * i as isize) };
        let base_d = unsafe { dst.offset(dp * i as isize) };
        let rgba: [f64; 4] = core::array::from_fn(|k| unsafe { read_at(base_s, 8, k) });
        let a = rgba[3];
        for k in 0..3 {
            unsafe { write_at(base_d, 8, k, rgba[k] * a) };
        }
        unsafe { write_at(base_d, 8, 3, a) };
    }
    n
}

unsafe fn rgba_unpremultiply(src: *const u8, dst: *mut u8, sp: isize, dp: isize, n: usize) -> usize {
    for i in 0..n {
        let base_s = unsafe { src.offset(sp * i as isize) };
        let base_d = unsafe { dst.offset(dp * i as isize) };
        let rgba: [f64; 4] = core::array::from_fn(|k| unsafe { read_at(base_s, 8, k) });
        let a = rgba[3];
        if a == 0.0 {
            for k in 0..4 {
                unsafe { write_at(base_d, 8, k, 0.0f64) };
            }
        } else {
            for k in 0..3 {
                unsafe { write_at(base_d, 8, k, rgba[k] / a) };
            }
            unsafe { write_at(base_d, 8, 3, a) };
        }
    }
    n
}

/// IEC 61966-2-1 sRGB transfer function.
fn linear_to_srgb(x: f64) -> f64 {
    if x <= 0.0031308 {
        x * 12.92
    } else {
        1.055 * x.powf(1.0 / 2.4) - 0.055
    }
}

fn srgb_to_linear(x: f64) -> f64 {
    if x <= 0.04045 {
        x / 12.92
    } else {
        ((x + 0.055) / 1.055).powf(2.4)
    }
}

unsafe fn rgba_linear_to_gamma(src: *const u8, dst: *mut u8, sp: isize, dp: isize, n: usize) -> usize {
    for i in 0..n {
        let base_s = unsafe { src.offset(sp * i as isize) };
        let base_d = unsafe { dst.offset(dp * i as isize) };
        for k in 0..3 {
            let v: f64 = unsafe { read_at(base_s, 8, k) };
            unsafe { write_at(base_d, 8, k, linear_to_srgb(v)) };
        }
        let a: f64 = unsafe { read_at(base_s, 8, 3) };
        unsafe { write_at(base_d, 8, 3, a) };
    }
    n
}

unsafe fn rgba_gamma_to_linear(src: *const u8, dst: *mut u8, sp: isize, dp: isize, n: usize) -> usize {
    for i in 0..n {
        let base_s = unsafe { src.offset(sp * i as isize) };
        let base_d = unsafe { dst.offset(dp * i as isize) };
        for k in 0..3 {
            let v: f64 = unsafe { read_at(base_s, 8, k) };
            unsafe { write_at(base_d, 8, k, srgb_to_linear(v)) };
        }
        let a: f64 = unsafe { read_at(base_s, 8, 3) };
        unsafe { write_at(base_d, 8, 3, a) };
    }
    n
}

/// ITU-R BT.709 relative luminance.
unsafe fn rgba_to_gray(src: *const u8, dst: *mut u8, sp: isize, dp: isize, n: usize) -> usize {
    for i in 0..n {
        let base_s = unsafe { src.offset(sp * i as isize) };
        let base_d = unsafe { dst.offset(dp * i as isize) };
        let r: f64 = unsafe { read_at(base_s, 8, 0) };
        let g: f64 = unsafe { read_at(base_s, 8, 1) };
        let b: f64 = unsafe { read_at(base_s, 8, 2) };
        let y = 0.2126 * r + 0.7152 * g + 0.0722 * b;
        unsafe { write_at(base_d, 8, 0, y) };
    }
    n
}

unsafe fn gray_to_rgba(src: *const u8, dst: *mut u8, sp: isize, dp: isize, n: usize) -> usize {
    for i in 0..n {
        let base_s = unsafe { src.offset(sp * i as isize) };
        let base_d = unsafe { dst.offset(dp * i as isize) };
        let y: f64 = unsafe { read_at(base_s, 8, 0) };
        for k in 0..3 {
            unsafe { write_at(base_d, 8, k, y) };
        }
        unsafe { write_at(base_d, 8, 3, 1.0f64) };
    }
    n
}
