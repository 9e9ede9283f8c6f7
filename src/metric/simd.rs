//! SIMD kernels for the dot-product family of metrics.
//!
//! Provides NEON (aarch64) and AVX2+FMA (x86_64) implementations of
//! f32-vs-f32 and f32-vs-i8 accumulations, with scalar fallbacks. The
//! caller picks the instruction set once at construction ([`Isa`]); the
//! kernels dispatch on that value rather than re-detecting per call.
//!
//! i8 kernels dequantize on the fly: stored components expand as
//! `q * (scale / 127)` before entering the accumulators, so distances on
//! a quantized index match distances over the dequantized vectors
//! exactly.

use super::Isa;

// ============================================================================
// Public dispatch functions: f32 vs f32
// ============================================================================

/// Cosine similarity between two f32 slices. Returns 0.0 when either norm
/// vanishes.
#[inline]
pub fn cosine_f32(isa: Isa, a: &[f32], b: &[f32]) -> f32 {
    match isa {
        #[cfg(target_arch = "aarch64")]
        Isa::Neon | Isa::Sve => unsafe { neon_cosine_f32(a, b) },
        #[cfg(target_arch = "x86_64")]
        Isa::Avx2 => unsafe { avx2_cosine_f32(a, b) },
        _ => scalar_cosine_f32(a, b),
    }
}

/// Squared Euclidean distance between two f32 slices.
#[inline]
pub fn l2sq_f32(isa: Isa, a: &[f32], b: &[f32]) -> f32 {
    match isa {
        #[cfg(target_arch = "aarch64")]
        Isa::Neon | Isa::Sve => unsafe { neon_l2sq_f32(a, b) },
        #[cfg(target_arch = "x86_64")]
        Isa::Avx2 => unsafe { avx2_l2sq_f32(a, b) },
        _ => scalar_l2sq_f32(a, b),
    }
}

/// Dot product between two f32 slices.
#[inline]
pub fn dot_f32(isa: Isa, a: &[f32], b: &[f32]) -> f32 {
    match isa {
        #[cfg(target_arch = "aarch64")]
        Isa::Neon | Isa::Sve => unsafe { neon_dot_f32(a, b) },
        #[cfg(target_arch = "x86_64")]
        Isa::Avx2 => unsafe { avx2_dot_f32(a, b) },
        _ => scalar_dot_f32(a, b),
    }
}

// ============================================================================
// Public dispatch functions: f32 query vs i8 stored
// ============================================================================

/// Cosine similarity: f32 query vs i8 stored with step `scale / 127`.
#[inline]
pub fn cosine_i8(isa: Isa, query: &[f32], stored: &[i8], scale: f32) -> f32 {
    let step = scale / 127.0;
    match isa {
        #[cfg(target_arch = "aarch64")]
        Isa::Neon | Isa::Sve => unsafe { neon_cosine_i8(query, stored, step) },
        #[cfg(target_arch = "x86_64")]
        Isa::Avx2 => unsafe { avx2_cosine_i8(query, stored, step) },
        _ => scalar_cosine_i8(query, stored, step),
    }
}

/// Squared Euclidean distance: f32 query vs i8 stored.
#[inline]
pub fn l2sq_i8(isa: Isa, query: &[f32], stored: &[i8], scale: f32) -> f32 {
    let step = scale / 127.0;
    match isa {
        #[cfg(target_arch = "aarch64")]
        Isa::Neon | Isa::Sve => unsafe { neon_l2sq_i8(query, stored, step) },
        #[cfg(target_arch = "x86_64")]
        Isa::Avx2 => unsafe { avx2_l2sq_i8(query, stored, step) },
        _ => scalar_l2sq_i8(query, stored, step),
    }
}

/// Dot product: f32 query vs i8 stored.
#[inline]
pub fn dot_i8(isa: Isa, query: &[f32], stored: &[i8], scale: f32) -> f32 {
    let step = scale / 127.0;
    match isa {
        #[cfg(target_arch = "aarch64")]
        Isa::Neon | Isa::Sve => unsafe { neon_dot_i8(query, stored, step) },
        #[cfg(target_arch = "x86_64")]
        Isa::Avx2 => unsafe { avx2_dot_i8(query, stored, step) },
        _ => scalar_dot_i8(query, stored, step),
    }
}

// ============================================================================
// Scalar fallbacks
// ============================================================================

fn scalar_cosine_f32(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    dot / denom
}

fn scalar_l2sq_f32(a: &[f32], b: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    for i in 0..a.len() {
        let d = a[i] - b[i];
        sum += d * d;
    }
    sum
}

fn scalar_dot_f32(a: &[f32], b: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    for i in 0..a.len() {
        sum += a[i] * b[i];
    }
    sum
}

fn scalar_cosine_i8(query: &[f32], stored: &[i8], step: f32) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_q = 0.0f32;
    let mut norm_s = 0.0f32;
    for i in 0..query.len() {
        let q = query[i];
        let s = stored[i] as f32 * step;
        dot += q * s;
        norm_q += q * q;
        norm_s += s * s;
    }
    let denom = norm_q.sqrt() * norm_s.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    dot / denom
}

fn scalar_l2sq_i8(query: &[f32], stored: &[i8], step: f32) -> f32 {
    let mut sum = 0.0f32;
    for i in 0..query.len() {
        let d = query[i] - stored[i] as f32 * step;
        sum += d * d;
    }
    sum
}

fn scalar_dot_i8(query: &[f32], stored: &[i8], step: f32) -> f32 {
    let mut sum = 0.0f32;
    for i in 0..query.len() {
        sum += query[i] * stored[i] as f32 * step;
    }
    sum
}

// ============================================================================
// NEON implementations (aarch64)
// ============================================================================

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;

#[cfg(target_arch = "aarch64")]
unsafe fn neon_cosine_f32(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len();
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    let mut dot0 = vdupq_n_f32(0.0);
    let mut dot1 = vdupq_n_f32(0.0);
    let mut na0 = vdupq_n_f32(0.0);
    let mut na1 = vdupq_n_f32(0.0);
    let mut nb0 = vdupq_n_f32(0.0);
    let mut nb1 = vdupq_n_f32(0.0);

    let chunks = len / 8;
    for i in 0..chunks {
        let base = i * 8;
        let a0 = vld1q_f32(a_ptr.add(base));
        let a1 = vld1q_f32(a_ptr.add(base + 4));
        let b0 = vld1q_f32(b_ptr.add(base));
        let b1 = vld1q_f32(b_ptr.add(base + 4));
        dot0 = vfmaq_f32(dot0, a0, b0);
        dot1 = vfmaq_f32(dot1, a1, b1);
        na0 = vfmaq_f32(na0, a0, a0);
        na1 = vfmaq_f32(na1, a1, a1);
        nb0 = vfmaq_f32(nb0, b0, b0);
        nb1 = vfmaq_f32(nb1, b1, b1);
    }

    let mut dot = vaddvq_f32(vaddq_f32(dot0, dot1));
    let mut norm_a = vaddvq_f32(vaddq_f32(na0, na1));
    let mut norm_b = vaddvq_f32(vaddq_f32(nb0, nb1));

    for i in (chunks * 8)..len {
        let ai = *a_ptr.add(i);
        let bi = *b_ptr.add(i);
        dot += ai * bi;
        norm_a += ai * ai;
        norm_b += bi * bi;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    dot / denom
}

#[cfg(target_arch = "aarch64")]
unsafe fn neon_l2sq_f32(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len();
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    let mut s0 = vdupq_n_f32(0.0);
    let mut s1 = vdupq_n_f32(0.0);

    let chunks = len / 8;
    for i in 0..chunks {
        let base = i * 8;
        let d0 = vsubq_f32(vld1q_f32(a_ptr.add(base)), vld1q_f32(b_ptr.add(base)));
        let d1 = vsubq_f32(
            vld1q_f32(a_ptr.add(base + 4)),
            vld1q_f32(b_ptr.add(base + 4)),
        );
        s0 = vfmaq_f32(s0, d0, d0);
        s1 = vfmaq_f32(s1, d1, d1);
    }

    let mut sum = vaddvq_f32(vaddq_f32(s0, s1));

    for i in (chunks * 8)..len {
        let d = *a_ptr.add(i) - *b_ptr.add(i);
        sum += d * d;
    }
    sum
}

#[cfg(target_arch = "aarch64")]
unsafe fn neon_dot_f32(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len();
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    let mut s0 = vdupq_n_f32(0.0);
    let mut s1 = vdupq_n_f32(0.0);

    let chunks = len / 8;
    for i in 0..chunks {
        let base = i * 8;
        s0 = vfmaq_f32(s0, vld1q_f32(a_ptr.add(base)), vld1q_f32(b_ptr.add(base)));
        s1 = vfmaq_f32(
            s1,
            vld1q_f32(a_ptr.add(base + 4)),
            vld1q_f32(b_ptr.add(base + 4)),
        );
    }

    let mut sum = vaddvq_f32(vaddq_f32(s0, s1));

    for i in (chunks * 8)..len {
        sum += *a_ptr.add(i) * *b_ptr.add(i);
    }
    sum
}

/// Widen 8 i8 components to two f32x4 registers and apply the
/// dequantization step.
#[cfg(target_arch = "aarch64")]
#[inline(always)]
unsafe fn neon_i8x8_to_f32(ptr: *const i8, step_vec: float32x4_t) -> (float32x4_t, float32x4_t) {
    let i8x8 = vld1_s8(ptr);
    let i16x8 = vmovl_s8(i8x8);
    let lo = vcvtq_f32_s32(vmovl_s16(vget_low_s16(i16x8)));
    let hi = vcvtq_f32_s32(vmovl_s16(vget_high_s16(i16x8)));
    (vmulq_f32(lo, step_vec), vmulq_f32(hi, step_vec))
}

#[cfg(target_arch = "aarch64")]
unsafe fn neon_cosine_i8(query: &[f32], stored: &[i8], step: f32) -> f32 {
    let len = query.len();
    let q_ptr = query.as_ptr();
    let s_ptr = stored.as_ptr();
    let step_vec = vdupq_n_f32(step);

    let mut dot0 = vdupq_n_f32(0.0);
    let mut dot1 = vdupq_n_f32(0.0);
    let mut nq0 = vdupq_n_f32(0.0);
    let mut nq1 = vdupq_n_f32(0.0);
    let mut ns0 = vdupq_n_f32(0.0);
    let mut ns1 = vdupq_n_f32(0.0);

    let chunks = len / 8;
    for i in 0..chunks {
        let base = i * 8;
        let (s_lo, s_hi) = neon_i8x8_to_f32(s_ptr.add(base), step_vec);
        let q_lo = vld1q_f32(q_ptr.add(base));
        let q_hi = vld1q_f32(q_ptr.add(base + 4));
        dot0 = vfmaq_f32(dot0, q_lo, s_lo);
        dot1 = vfmaq_f32(dot1, q_hi, s_hi);
        nq0 = vfmaq_f32(nq0, q_lo, q_lo);
        nq1 = vfmaq_f32(nq1, q_hi, q_hi);
        ns0 = vfmaq_f32(ns0, s_lo, s_lo);
        ns1 = vfmaq_f32(ns1, s_hi, s_hi);
    }

    let mut dot = vaddvq_f32(vaddq_f32(dot0, dot1));
    let mut norm_q = vaddvq_f32(vaddq_f32(nq0, nq1));
    let mut norm_s = vaddvq_f32(vaddq_f32(ns0, ns1));

    for i in (chunks * 8)..len {
        let q = *q_ptr.add(i);
        let s = *s_ptr.add(i) as f32 * step;
        dot += q * s;
        norm_q += q * q;
        norm_s += s * s;
    }

    let denom = norm_q.sqrt() * norm_s.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    dot / denom
}

#[cfg(target_arch = "aarch64")]
unsafe fn neon_l2sq_i8(query: &[f32], stored: &[i8], step: f32) -> f32 {
    let len = query.len();
    let q_ptr = query.as_ptr();
    let s_ptr = stored.as_ptr();
    let step_vec = vdupq_n_f32(step);

    let mut s0 = vdupq_n_f32(0.0);
    let mut s1 = vdupq_n_f32(0.0);

    let chunks = len / 8;
    for i in 0..chunks {
        let base = i * 8;
        let (s_lo, s_hi) = neon_i8x8_to_f32(s_ptr.add(base), step_vec);
        let d0 = vsubq_f32(vld1q_f32(q_ptr.add(base)), s_lo);
        let d1 = vsubq_f32(vld1q_f32(q_ptr.add(base + 4)), s_hi);
        s0 = vfmaq_f32(s0, d0, d0);
        s1 = vfmaq_f32(s1, d1, d1);
    }

    let mut sum = vaddvq_f32(vaddq_f32(s0, s1));

    for i in (chunks * 8)..len {
        let d = *q_ptr.add(i) - *s_ptr.add(i) as f32 * step;
        sum += d * d;
    }
    sum
}

#[cfg(target_arch = "aarch64")]
unsafe fn neon_dot_i8(query: &[f32], stored: &[i8], step: f32) -> f32 {
    let len = query.len();
    let q_ptr = query.as_ptr();
    let s_ptr = stored.as_ptr();
    let step_vec = vdupq_n_f32(step);

    let mut s0 = vdupq_n_f32(0.0);
    let mut s1 = vdupq_n_f32(0.0);

    let chunks = len / 8;
    for i in 0..chunks {
        let base = i * 8;
        let (s_lo, s_hi) = neon_i8x8_to_f32(s_ptr.add(base), step_vec);
        s0 = vfmaq_f32(s0, vld1q_f32(q_ptr.add(base)), s_lo);
        s1 = vfmaq_f32(s1, vld1q_f32(q_ptr.add(base + 4)), s_hi);
    }

    let mut sum = vaddvq_f32(vaddq_f32(s0, s1));

    for i in (chunks * 8)..len {
        sum += *q_ptr.add(i) * *s_ptr.add(i) as f32 * step;
    }
    sum
}

// ============================================================================
// AVX2+FMA implementations (x86_64)
// ============================================================================

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

/// Horizontal sum of 8 f32 values in a __m256 register.
#[cfg(target_arch = "x86_64")]
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn hsum_f32x8(v: __m256) -> f32 {
    let hi128 = _mm256_extractf128_ps(v, 1);
    let lo128 = _mm256_castps256_ps128(v);
    let sum128 = _mm_add_ps(lo128, hi128);
    let hi64 = _mm_movehl_ps(sum128, sum128);
    let sum64 = _mm_add_ps(sum128, hi64);
    let hi32 = _mm_shuffle_ps(sum64, sum64, 0x55);
    _mm_cvtss_f32(_mm_add_ss(sum64, hi32))
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
unsafe fn avx2_cosine_f32(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len();
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    let mut dot0 = _mm256_setzero_ps();
    let mut na0 = _mm256_setzero_ps();
    let mut nb0 = _mm256_setzero_ps();

    let chunks = len / 8;
    for i in 0..chunks {
        let base = i * 8;
        let av = _mm256_loadu_ps(a_ptr.add(base));
        let bv = _mm256_loadu_ps(b_ptr.add(base));
        dot0 = _mm256_fmadd_ps(av, bv, dot0);
        na0 = _mm256_fmadd_ps(av, av, na0);
        nb0 = _mm256_fmadd_ps(bv, bv, nb0);
    }

    let mut dot = hsum_f32x8(dot0);
    let mut norm_a = hsum_f32x8(na0);
    let mut norm_b = hsum_f32x8(nb0);

    for i in (chunks * 8)..len {
        let ai = *a_ptr.add(i);
        let bi = *b_ptr.add(i);
        dot += ai * bi;
        norm_a += ai * ai;
        norm_b += bi * bi;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    dot / denom
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
unsafe fn avx2_l2sq_f32(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len();
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    let mut s0 = _mm256_setzero_ps();
    let mut s1 = _mm256_setzero_ps();

    let chunks = len / 16;
    for i in 0..chunks {
        let base = i * 16;
        let d0 = _mm256_sub_ps(
            _mm256_loadu_ps(a_ptr.add(base)),
            _mm256_loadu_ps(b_ptr.add(base)),
        );
        let d1 = _mm256_sub_ps(
            _mm256_loadu_ps(a_ptr.add(base + 8)),
            _mm256_loadu_ps(b_ptr.add(base + 8)),
        );
        s0 = _mm256_fmadd_ps(d0, d0, s0);
        s1 = _mm256_fmadd_ps(d1, d1, s1);
    }

    let mut sum = hsum_f32x8(_mm256_add_ps(s0, s1));

    for i in (chunks * 16)..len {
        let d = *a_ptr.add(i) - *b_ptr.add(i);
        sum += d * d;
    }
    sum
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
unsafe fn avx2_dot_f32(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len();
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    let mut s0 = _mm256_setzero_ps();
    let mut s1 = _mm256_setzero_ps();

    let chunks = len / 16;
    for i in 0..chunks {
        let base = i * 16;
        s0 = _mm256_fmadd_ps(
            _mm256_loadu_ps(a_ptr.add(base)),
            _mm256_loadu_ps(b_ptr.add(base)),
            s0,
        );
        s1 = _mm256_fmadd_ps(
            _mm256_loadu_ps(a_ptr.add(base + 8)),
            _mm256_loadu_ps(b_ptr.add(base + 8)),
            s1,
        );
    }

    let mut sum = hsum_f32x8(_mm256_add_ps(s0, s1));

    for i in (chunks * 16)..len {
        sum += *a_ptr.add(i) * *b_ptr.add(i);
    }
    sum
}

/// Widen 8 i8 components to a __m256 and apply the dequantization step.
#[cfg(target_arch = "x86_64")]
#[inline]
#[target_feature(enable = "avx2,fma")]
unsafe fn avx2_i8x8_to_f32(ptr: *const i8, step_vec: __m256) -> __m256 {
    let i8x8 = _mm_loadl_epi64(ptr as *const __m128i);
    let i32x8 = _mm256_cvtepi8_epi32(i8x8);
    let f32x8 = _mm256_cvtepi32_ps(i32x8);
    _mm256_mul_ps(f32x8, step_vec)
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
unsafe fn avx2_cosine_i8(query: &[f32], stored: &[i8], step: f32) -> f32 {
    let len = query.len();
    let q_ptr = query.as_ptr();
    let s_ptr = stored.as_ptr();
    let step_vec = _mm256_set1_ps(step);

    let mut dot0 = _mm256_setzero_ps();
    let mut nq0 = _mm256_setzero_ps();
    let mut ns0 = _mm256_setzero_ps();

    let chunks = len / 8;
    for i in 0..chunks {
        let base = i * 8;
        let sv = avx2_i8x8_to_f32(s_ptr.add(base), step_vec);
        let qv = _mm256_loadu_ps(q_ptr.add(base));
        dot0 = _mm256_fmadd_ps(qv, sv, dot0);
        nq0 = _mm256_fmadd_ps(qv, qv, nq0);
        ns0 = _mm256_fmadd_ps(sv, sv, ns0);
    }

    let mut dot = hsum_f32x8(dot0);
    let mut norm_q = hsum_f32x8(nq0);
    let mut norm_s = hsum_f32x8(ns0);

    for i in (chunks * 8)..len {
        let q = *q_ptr.add(i);
        let s = *s_ptr.add(i) as f32 * step;
        dot += q * s;
        norm_q += q * q;
        norm_s += s * s;
    }

    let denom = norm_q.sqrt() * norm_s.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    dot / denom
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
unsafe fn avx2_l2sq_i8(query: &[f32], stored: &[i8], step: f32) -> f32 {
    let len = query.len();
    let q_ptr = query.as_ptr();
    let s_ptr = stored.as_ptr();
    let step_vec = _mm256_set1_ps(step);

    let mut s0 = _mm256_setzero_ps();

    let chunks = len / 8;
    for i in 0..chunks {
        let base = i * 8;
        let sv = avx2_i8x8_to_f32(s_ptr.add(base), step_vec);
        let d = _mm256_sub_ps(_mm256_loadu_ps(q_ptr.add(base)), sv);
        s0 = _mm256_fmadd_ps(d, d, s0);
    }

    let mut sum = hsum_f32x8(s0);

    for i in (chunks * 8)..len {
        let d = *q_ptr.add(i) - *s_ptr.add(i) as f32 * step;
        sum += d * d;
    }
    sum
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
unsafe fn avx2_dot_i8(query: &[f32], stored: &[i8], step: f32) -> f32 {
    let len = query.len();
    let q_ptr = query.as_ptr();
    let s_ptr = stored.as_ptr();
    let step_vec = _mm256_set1_ps(step);

    let mut s0 = _mm256_setzero_ps();

    let chunks = len / 8;
    for i in 0..chunks {
        let base = i * 8;
        let sv = avx2_i8x8_to_f32(s_ptr.add(base), step_vec);
        s0 = _mm256_fmadd_ps(_mm256_loadu_ps(q_ptr.add(base)), sv, s0);
    }

    let mut sum = hsum_f32x8(s0);

    for i in (chunks * 8)..len {
        sum += *q_ptr.add(i) * *s_ptr.add(i) as f32 * step;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vecs(n: usize) -> (Vec<f32>, Vec<f32>) {
        let a: Vec<f32> = (0..n).map(|i| ((i * 7 % 13) as f32 - 6.0) * 0.1).collect();
        let b: Vec<f32> = (0..n).map(|i| ((i * 5 % 11) as f32 - 5.0) * 0.1).collect();
        (a, b)
    }

    #[test]
    fn test_detected_matches_serial_f32() {
        let isa = Isa::detect();
        // Odd length exercises the remainder loops.
        for n in [3usize, 8, 19, 64, 131] {
            let (a, b) = vecs(n);
            assert!(
                (cosine_f32(isa, &a, &b) - cosine_f32(Isa::Serial, &a, &b)).abs() < 1e-4,
                "cosine mismatch at n={n}"
            );
            assert!(
                (l2sq_f32(isa, &a, &b) - l2sq_f32(Isa::Serial, &a, &b)).abs() < 1e-3,
                "l2sq mismatch at n={n}"
            );
            assert!(
                (dot_f32(isa, &a, &b) - dot_f32(Isa::Serial, &a, &b)).abs() < 1e-3,
                "dot mismatch at n={n}"
            );
        }
    }

    #[test]
    fn test_detected_matches_serial_i8() {
        let isa = Isa::detect();
        for n in [5usize, 16, 33] {
            let (a, _) = vecs(n);
            let stored: Vec<i8> = (0..n).map(|i| ((i * 37) % 255) as i8).collect();
            let scale = 0.8;
            assert!(
                (cosine_i8(isa, &a, &stored, scale) - cosine_i8(Isa::Serial, &a, &stored, scale))
                    .abs()
                    < 1e-4
            );
            assert!(
                (l2sq_i8(isa, &a, &stored, scale) - l2sq_i8(Isa::Serial, &a, &stored, scale))
                    .abs()
                    < 1e-3
            );
            assert!(
                (dot_i8(isa, &a, &stored, scale) - dot_i8(Isa::Serial, &a, &stored, scale)).abs()
                    < 1e-3
            );
        }
    }

    #[test]
    fn test_zero_norm_cosine_is_zero() {
        let z = vec![0.0f32; 16];
        let (a, _) = vecs(16);
        assert_eq!(cosine_f32(Isa::detect(), &z, &a), 0.0);
    }

    #[test]
    fn test_dot_known_value() {
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let b = vec![1.0, 2.0, 3.0, 4.0];
        assert!((dot_f32(Isa::detect(), &a, &b) - 30.0).abs() < 1e-6);
    }
}
