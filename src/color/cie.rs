//! CIE-based color conversions: per-component gamma, XYZ intermediates,
//! and the sRGB transfer function. No chromatic adaptation is applied;
//! white points scale the XYZ intermediates directly.

/// XYZ (nominally D65-relative) to non-linear sRGB.
pub(super) fn xyz_to_srgb(x: f32, y: f32, z: f32) -> [f32; 3] {
    let r = 3.2406 * x - 1.5372 * y - 0.4986 * z;
    let g = -0.9689 * x + 1.8758 * y + 0.0415 * z;
    let b = 0.0557 * x - 0.2040 * y + 1.0570 * z;

    [srgb_oetf(r), srgb_oetf(g), srgb_oetf(b)]
}

/// The sRGB opto-electronic transfer function (linear to gamma-encoded).
fn srgb_oetf(c: f32) -> f32 {
    let c = c.clamp(0.0, 1.0);

    if c <= 0.0031308 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

pub(super) fn cal_gray_to_srgb(a: f32, white_point: &[f32; 3], gamma: f32) -> [f32; 3] {
    let ag = a.clamp(0.0, 1.0).powf(gamma.max(f32::MIN_POSITIVE));

    xyz_to_srgb(
        white_point[0] * ag,
        white_point[1] * ag,
        white_point[2] * ag,
    )
}

pub(super) fn cal_rgb_to_srgb(
    abc: [f32; 3],
    white_point: &[f32; 3],
    gamma: &[f32; 3],
    matrix: &[f32; 9],
) -> [f32; 3] {
    let lin = [
        abc[0].clamp(0.0, 1.0).powf(gamma[0].max(f32::MIN_POSITIVE)),
        abc[1].clamp(0.0, 1.0).powf(gamma[1].max(f32::MIN_POSITIVE)),
        abc[2].clamp(0.0, 1.0).powf(gamma[2].max(f32::MIN_POSITIVE)),
    ];

    // Matrix is column-major: [XA YA ZA XB YB ZB XC YC ZC]
    let x = matrix[0] * lin[0] + matrix[3] * lin[1] + matrix[6] * lin[2];
    let y = matrix[1] * lin[0] + matrix[4] * lin[1] + matrix[7] * lin[2];
    let z = matrix[2] * lin[0] + matrix[5] * lin[1] + matrix[8] * lin[2];

    // scale so the nominal white point maps toward XYZ white
    xyz_to_srgb(
        x * scale(white_point[0]),
        y * scale(white_point[1]),
        z * scale(white_point[2]),
    )
}

fn scale(w: f32) -> f32 {
    if w > 0.0 {
        w
    } else {
        1.0
    }
}

pub(super) fn lab_to_srgb(lab: [f32; 3], white_point: &[f32; 3]) -> [f32; 3] {
    let [l, a, b] = lab;

    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;

    let x = white_point[0] * inverse_f(fx);
    let y = white_point[1] * inverse_f(fy);
    let z = white_point[2] * inverse_f(fz);

    xyz_to_srgb(x, y, z)
}

fn inverse_f(t: f32) -> f32 {
    const DELTA: f32 = 6.0 / 29.0;

    if t > DELTA {
        t * t * t
    } else {
        3.0 * DELTA * DELTA * (t - 4.0 / 29.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const D65: [f32; 3] = [0.9505, 1.0, 1.089];

    #[test]
    fn lab_white_is_white() {
        let [r, g, b] = lab_to_srgb([100.0, 0.0, 0.0], &D65);

        assert!(r > 0.98 && g > 0.98 && b > 0.98, "{:?}", (r, g, b));
    }

    #[test]
    fn lab_black_is_black() {
        let [r, g, b] = lab_to_srgb([0.0, 0.0, 0.0], &D65);

        assert!(r < 0.02 && g < 0.02 && b < 0.02);
    }

    #[test]
    fn positive_a_leans_red() {
        let [r, _, _] = lab_to_srgb([50.0, 60.0, 0.0], &D65);
        let [r2, _, _] = lab_to_srgb([50.0, -60.0, 0.0], &D65);

        assert!(r > r2);
    }

    #[test]
    fn cal_gray_is_monotonic() {
        let lo = cal_gray_to_srgb(0.2, &D65, 2.2)[0];
        let hi = cal_gray_to_srgb(0.8, &D65, 2.2)[0];

        assert!(hi > lo);
    }

    #[test]
    fn oetf_endpoints() {
        assert_eq!(srgb_oetf(0.0), 0.0);
        assert!((srgb_oetf(1.0) - 1.0).abs() < 1e-5);
    }
}
