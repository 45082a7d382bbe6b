//! The five planner-level invariants from the testable-properties list:
//! uniquing, round-trip, compositionality, stability and isolation.

use std::sync::Arc;
use std::thread;

use pixelfish::{Component, Context, Edge, Error, Kernel, Type};

fn init() -> Context {
    Context::init().expect("built-in registration never fails")
}

#[test]
fn invariant_1_uniquing() {
    let mut ctx = Context::new();
    let a = ctx
        .register_component(Component::new("Q"))
        .unwrap();
    let b = ctx
        .register_component(Component::new("Q"))
        .unwrap();
    assert_eq!(a, b);

    ctx.set_fatal_hook(|_| {});
    let err = ctx
        .register_component(Component::new("Q").alpha())
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateMismatch { .. }));
}

#[test]
fn invariant_2_round_trip_is_bitwise_identity() {
    let ctx = init();
    for (name, bpp) in [
        ("rgbaF_linear", 16usize),
        ("RGBA-u8", 4),
        ("Y-u16", 2),
        ("RGBA-double", 32),
    ] {
        let fmt = ctx.format_by_name(name).unwrap();
        let plan = ctx.find_conversion(fmt, fmt).unwrap();
        assert_eq!(plan.step_count(), 0, "format {name}");

        let src: Vec<u8> = (0..(bpp * 4) as u32).map(|b| b as u8).collect();
        let mut dst = vec![0u8; src.len()];
        let n = plan.process(&src, &mut dst, 4);
        assert_eq!(n, 4, "format {name}");
        assert_eq!(src, dst, "format {name}");
    }
}

#[test]
fn invariant_3_compositionality_across_an_intermediate_format() {
    // For formats (A,B,C) with plans A->B, B->C and A->C, the direct plan
    // must agree with the two-stage application, modulo the u8 channel's
    // quantization (RGBA-u8 rounds to the nearest 1/255th).
    let ctx = init();
    let a = ctx.format_by_name("RGBA-u8").unwrap();
    let b = ctx.format_by_name("rgbaF_linear").unwrap();
    let c = ctx.format_by_name("RGBA-double").unwrap();

    let a_to_b = ctx.find_conversion(a, b).unwrap();
    let b_to_c = ctx.find_conversion(b, c).unwrap();
    let a_to_c = ctx.find_conversion(a, c).unwrap();

    let src: [u8; 4] = [0, 64, 200, 255];

    let mut via_b = [0f32; 4];
    assert_eq!(a_to_b.process(&src, bytemuck::bytes_of_mut(&mut via_b), 1), 1);
    let mut two_stage = [0f64; 4];
    assert_eq!(
        b_to_c.process(bytemuck::bytes_of(&via_b), bytemuck::bytes_of_mut(&mut two_stage), 1),
        1
    );

    let mut direct = [0f64; 4];
    assert_eq!(a_to_c.process(&src, bytemuck::bytes_of_mut(&mut direct), 1), 1);

    for (two, one) in two_stage.iter().zip(direct.iter()) {
        assert!((two - one).abs() < 1e-6, "two-stage {two_stage:?} vs direct {direct:?}");
    }
}

#[test]
fn invariant_4_stability_across_repeated_calls() {
    let ctx = init();
    let src = ctx.format_by_name("RGBA-u8").unwrap();
    let dst = ctx.format_by_name("rgbaF_linear").unwrap();
    let a = ctx.find_conversion(src, dst).unwrap();
    let b = ctx.find_conversion(src, dst).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn invariant_5_isolation_across_threads() {
    let ctx = Arc::new(init());
    let src = ctx.format_by_name("RGBA-u8").unwrap();
    let dst = ctx.format_by_name("rgbaF_linear").unwrap();

    let sequential: Vec<f32> = {
        let plan = ctx.find_conversion(src, dst).unwrap();
        let input: Vec<u8> = (0..16u8).cycle().take(4 * 100).collect();
        let mut out = vec![0u8; 16 * 100];
        plan.process(&input, &mut out, 100);
        bytemuck::cast_slice(&out).to_vec()
    };

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let ctx = ctx.clone();
            thread::spawn(move || {
                let plan = ctx.find_conversion(src, dst).unwrap();
                let input: Vec<u8> = (0..16u8).cycle().take(4 * 100).collect();
                let mut out = vec![0u8; 16 * 100];
                plan.process(&input, &mut out, 100);
                let out: Vec<f32> = bytemuck::cast_slice(&out).to_vec();
                out
            })
        })
        .collect();

    for h in handles {
        let result = h.join().unwrap();
        assert_eq!(result, sequential);
    }
}

#[test]
fn no_path_when_graph_is_disconnected() {
    let mut ctx = Context::new();
    ctx.set_fatal_hook(|_| {});
    let double_ty = ctx
        .register_type(Type {
            name: "double".into(),
            bits: 64,
            is_floating: true,
            min: f64::MIN,
            max: f64::MAX,
            min_val: f64::MIN,
            max_val: f64::MAX,
        })
        .unwrap();
    let isolated_ty = ctx
        .register_type(Type {
            name: "isolated".into(),
            bits: 32,
            is_floating: true,
            min: f32::MIN as f64,
            max: f32::MAX as f64,
            min_val: 0.0,
            max_val: 1.0,
        })
        .unwrap();
    let q = ctx.register_component(Component::new("Q")).unwrap();
    let model = ctx.register_reference_model("Q-model", vec![q]).unwrap();
    ctx.register_reference_format("Q-double", model, double_ty, vec![q])
        .unwrap();
    let isolated_fmt = ctx
        .register_format_interleaved("Q-isolated", model, isolated_ty, vec![q])
        .unwrap();
    let ref_fmt = ctx.format_by_name("Q-double").unwrap();

    let err = ctx.find_conversion(ref_fmt, isolated_fmt).unwrap_err();
    assert!(matches!(err, Error::NoPath { .. }));
}

#[test]
fn two_edge_model_routing_with_no_direct_conversion() {
    let mut ctx = Context::new();
    ctx.set_fatal_hook(|_| {});
    let double_ty = ctx
        .register_type(Type {
            name: "double".into(),
            bits: 64,
            is_floating: true,
            min: f64::MIN,
            max: f64::MAX,
            min_val: f64::MIN,
            max_val: f64::MAX,
        })
        .unwrap();

    let q1 = ctx.register_component(Component::new("Q1")).unwrap();
    let qr = ctx.register_component(Component::new("QR")).unwrap();
    let q2 = ctx.register_component(Component::new("Q2")).unwrap();

    let model_a = ctx.register_model("A", vec![q1]).unwrap();
    let model_ref = ctx.register_reference_model("Ref", vec![qr]).unwrap();
    let model_c = ctx.register_model("C", vec![q2]).unwrap();

    ctx.register_reference_format("Ref-double", model_ref, double_ty, vec![qr])
        .unwrap();
    let fmt_a = ctx
        .register_format_interleaved("A-double", model_a, double_ty, vec![q1])
        .unwrap();
    let fmt_c = ctx
        .register_format_interleaved("C-double", model_c, double_ty, vec![q2])
        .unwrap();

    let a_to_ref: Kernel = |src, dst, sp, dp, n| {
        for i in 0..n {
            unsafe {
                let v = (src.offset(sp * i as isize) as *const f64).read_unaligned();
                (dst.offset(dp * i as isize) as *mut f64).write_unaligned(v);
            }
        }
        n
    };
    let ref_to_c: Kernel = a_to_ref;

    ctx.register_conversion(Edge::Model(model_a, model_ref), a_to_ref, None)
        .unwrap();
    ctx.register_conversion(Edge::Model(model_ref, model_c), ref_to_c, None)
        .unwrap();

    let plan = ctx.find_conversion(fmt_a, fmt_c).unwrap();
    assert_eq!(plan.step_count(), 2);

    let mut src = [0u8; 8];
    src.copy_from_slice(&42.0f64.to_le_bytes());
    let mut dst = [0u8; 8];
    assert_eq!(plan.process(&src, &mut dst, 1), 1);
    assert_eq!(f64::from_le_bytes(dst), 42.0);
}
