//! The six worked scenarios this library's conversion math is expected to
//! reproduce exactly.

use pixelfish::Context;

fn init() -> Context {
    Context::init().expect("built-in registration never fails")
}

fn read_f64(buf: &[u8], i: usize) -> f64 {
    f64::from_le_bytes(buf[i * 8..i * 8 + 8].try_into().unwrap())
}

fn write_f64(buf: &mut [u8], i: usize, v: f64) {
    buf[i * 8..i * 8 + 8].copy_from_slice(&v.to_le_bytes());
}

#[test]
fn scenario_1_u16_to_double_ratio() {
    let ctx = init();
    let u16_fmt = ctx.format_by_name("Y-u16").unwrap();
    let double_fmt = ctx.format_by_name("Y-double").unwrap();
    let plan = ctx.find_conversion(u16_fmt, double_fmt).unwrap();

    let mut src = [0u8; 2 * 3];
    src[0..2].copy_from_slice(&0u16.to_le_bytes());
    src[2..4].copy_from_slice(&0x8000u16.to_le_bytes());
    src[4..6].copy_from_slice(&0xffffu16.to_le_bytes());

    let mut dst = [0u8; 8 * 3];
    assert_eq!(plan.process(&src, &mut dst, 3), 3);

    let got: Vec<f64> = (0..3).map(|i| read_f64(&dst, i)).collect();
    assert_eq!(got[0], 0.0);
    assert!((got[1] - 0x8000 as f64 / 0xffff as f64).abs() < 1e-9);
    assert_eq!(got[2], 1.0);
}

#[test]
fn scenario_2_double_u16_double_round_trip() {
    let ctx = init();
    let double_fmt = ctx.format_by_name("Y-double").unwrap();
    let u16_fmt = ctx.format_by_name("Y-u16").unwrap();
    let to_u16 = ctx.find_conversion(double_fmt, u16_fmt).unwrap();
    let to_double = ctx.find_conversion(u16_fmt, double_fmt).unwrap();

    for &x in &[0.0, 0.25, 0.5, 0.75, 1.0] {
        let mut src = [0u8; 8];
        write_f64(&mut src, 0, x);
        let mut mid = [0u8; 2];
        assert_eq!(to_u16.process(&src, &mut mid, 1), 1);
        let mut back = [0u8; 8];
        assert_eq!(to_double.process(&mid, &mut back, 1), 1);
        let got = read_f64(&back, 0);
        assert!((got - x).abs() <= 1.0 / 0xffff as f64 + 1e-12, "{x} -> {got}");
    }
}

#[test]
fn scenario_3_premultiply() {
    let ctx = init();
    let linear = ctx.format_by_name("rgbaF_linear").unwrap();
    let premul = ctx.format_by_name("rgbAF_linear").unwrap();
    let plan = ctx.find_conversion(linear, premul).unwrap();

    let src: [f32; 4] = [0.8, 0.4, 0.2, 0.5];
    let mut dst = [0f32; 4];
    assert_eq!(
        plan.process(bytemuck::bytes_of(&src), bytemuck::bytes_of_mut(&mut dst), 1),
        1
    );
    for (got, want) in dst.iter().zip([0.4f32, 0.2, 0.1, 0.5].iter()) {
        assert!((got - want).abs() < 1e-6, "{dst:?}");
    }

    let zero_alpha: [f32; 4] = [0.8, 0.4, 0.2, 0.0];
    let mut dst2 = [0f32; 4];
    plan.process(bytemuck::bytes_of(&zero_alpha), bytemuck::bytes_of_mut(&mut dst2), 1);
    assert_eq!(dst2, [0.0, 0.0, 0.0, 0.0]);
}

#[test]
fn scenario_4_unpremultiply() {
    let ctx = init();
    let linear = ctx.format_by_name("rgbaF_linear").unwrap();
    let premul = ctx.format_by_name("rgbAF_linear").unwrap();
    let plan = ctx.find_conversion(premul, linear).unwrap();

    let src: [f32; 4] = [0.4, 0.2, 0.1, 0.5];
    let mut dst = [0f32; 4];
    plan.process(bytemuck::bytes_of(&src), bytemuck::bytes_of_mut(&mut dst), 1);
    for (got, want) in dst.iter().zip([0.8f32, 0.4, 0.2, 0.5].iter()) {
        assert!((got - want).abs() < 1e-6, "{dst:?}");
    }

    let zero_alpha: [f32; 4] = [0.4, 0.2, 0.1, 0.0];
    let mut dst2 = [0f32; 4];
    plan.process(bytemuck::bytes_of(&zero_alpha), bytemuck::bytes_of_mut(&mut dst2), 1);
    assert_eq!(dst2, [0.0, 0.0, 0.0, 0.0]);
}

#[test]
fn scenario_5_linear_to_gamma() {
    let ctx = init();
    let linear = ctx.format_by_name("rgbaF_linear").unwrap();
    let gamma = ctx.format_by_name("rgbaF_gamma").unwrap();
    let plan = ctx.find_conversion(linear, gamma).unwrap();

    let src: [f32; 4] = [0.5, 0.5, 0.5, 1.0];
    let mut dst = [0f32; 4];
    plan.process(bytemuck::bytes_of(&src), bytemuck::bytes_of_mut(&mut dst), 1);

    let expect = 0.7353569830524495f32;
    for c in &dst[..3] {
        assert!((c - expect).abs() < 1e-5, "{dst:?}");
    }
    assert_eq!(dst[3], 1.0);
}

#[test]
fn scenario_6_routes_through_reference_when_no_direct_edge() {
    // Built-in `Gray` has edges only to and from the reference model `RGBA`,
    // never directly to `RGBA-premultiplied` — so this conversion must
    // route through two model edges.
    let ctx = init();
    let gray = ctx.format_by_name("Y-double").unwrap();
    let premul = ctx.format_by_name("rgbAF_linear").unwrap();
    let plan = ctx.find_conversion(gray, premul).unwrap();

    let mut src = [0u8; 8];
    write_f64(&mut src, 0, 0.5);
    let mut dst = [0f32; 4];
    let n = plan.process(&src, bytemuck::bytes_of_mut(&mut dst), 1);
    assert_eq!(n, 1);
    // Gray -> RGBA broadcasts into R=G=B=0.5, A=1; RGBA -> premultiplied
    // multiplies by alpha=1, leaving the broadcast value unchanged.
    assert!((dst[0] - 0.5).abs() < 1e-6);
    assert!((dst[1] - 0.5).abs() < 1e-6);
    assert!((dst[2] - 0.5).abs() < 1e-6);
    assert_eq!(dst[3], 1.0);
}
