//! Symmetric scalar quantization: f32 ↔ i8 with a single per-index scale.
//!
//! Each component maps as `i8 = round(clip(x / s, -1, 1) * 127)` and back
//! as `x = (i8 / 127) * s`. The scale `s` is fitted once, from the max
//! absolute component of the first vector written to the index, and is
//! recorded in the on-disk header so a saved index reloads losslessly
//! relative to its quantized representation. Components outside `[-s, s]`
//! clip.

/// Fit the per-index scale from the first stored vector.
///
/// Returns the max absolute component, or 1.0 when the vector is all
/// zeros (so later non-zero inserts still quantize instead of dividing
/// by zero).
pub fn fit_scale(vector: &[f32]) -> f32 {
    let max_abs = vector.iter().fold(0.0f32, |m, &x| m.max(x.abs()));
    if max_abs > 0.0 {
        max_abs
    } else {
        1.0
    }
}

/// Quantize `src` into `dst` using scale `s`.
///
/// `dst` must be exactly as long as `src`.
pub fn quantize_into(src: &[f32], s: f32, dst: &mut [i8]) {
    debug_assert_eq!(src.len(), dst.len());
    let inv = 1.0 / s;
    for (d, &x) in dst.iter_mut().zip(src.iter()) {
        *d = ((x * inv).clamp(-1.0, 1.0) * 127.0).round() as i8;
    }
}

/// Dequantize `src` into `dst` using scale `s`.
pub fn dequantize_into(src: &[i8], s: f32, dst: &mut [f32]) {
    debug_assert_eq!(src.len(), dst.len());
    let step = s / 127.0;
    for (d, &q) in dst.iter_mut().zip(src.iter()) {
        *d = q as f32 * step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_scale_max_abs() {
        assert_eq!(fit_scale(&[0.5, -2.0, 1.0]), 2.0);
        assert_eq!(fit_scale(&[0.0, 0.0]), 1.0);
    }

    #[test]
    fn test_round_trip_within_step() {
        let v = vec![0.9, -0.5, 0.0, 0.25, -1.0, 1.0];
        let s = fit_scale(&v);
        let mut q = vec![0i8; v.len()];
        quantize_into(&v, s, &mut q);
        let mut d = vec![0.0f32; v.len()];
        dequantize_into(&q, s, &mut d);
        // Max round-trip error is half a quantization step.
        let step = s / 127.0;
        for (orig, deq) in v.iter().zip(d.iter()) {
            assert!(
                (orig - deq).abs() <= step / 2.0 + 1e-6,
                "orig={orig}, deq={deq}"
            );
        }
    }

    #[test]
    fn test_clipping_outside_scale() {
        let mut q = [0i8; 2];
        quantize_into(&[5.0, -5.0], 1.0, &mut q);
        assert_eq!(q, [127, -127]);
    }

    #[test]
    fn test_extremes_map_to_full_range() {
        let mut q = [0i8; 2];
        quantize_into(&[2.0, -2.0], 2.0, &mut q);
        assert_eq!(q, [127, -127]);
        let mut d = [0.0f32; 2];
        dequantize_into(&q, 2.0, &mut d);
        assert!((d[0] - 2.0).abs() < 1e-6);
        assert!((d[1] + 2.0).abs() < 1e-6);
    }
}
