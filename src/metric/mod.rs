//! Distance metrics with runtime SIMD dispatch.
//!
//! Five metrics are supported: cosine, squared L2, inner product, Hamming,
//! and Jaccard over thresholded floats. All return a distance where
//! **lower is closer**, so a single ranking path serves every metric.
//!
//! The instruction set is detected once at index construction and carried
//! as an [`Isa`] value; the dot-product family dispatches to NEON or
//! AVX2+FMA kernels in [`simd`], while the set-based metrics (Hamming,
//! Jaccard) use branchy thresholding loops that do not vectorize usefully.

pub mod simd;

use crate::storage::StoredRef;

/// Instruction set selected for the distance kernels.
///
/// Detected once at construction; reported by the facade's `isa` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isa {
    /// ARM NEON (always present on aarch64).
    Neon,
    /// ARM SVE. Detection only; SVE hardware executes the NEON kernels.
    Sve,
    /// x86-64 AVX2 with FMA.
    Avx2,
    /// Portable scalar fallback.
    Serial,
}

impl Isa {
    /// Detect the best available instruction set for this process.
    #[allow(unreachable_code)]
    pub fn detect() -> Self {
        #[cfg(target_arch = "aarch64")]
        {
            if std::arch::is_aarch64_feature_detected!("sve") {
                return Isa::Sve;
            }
            return Isa::Neon;
        }
        #[cfg(target_arch = "x86_64")]
        {
            if std::arch::is_x86_feature_detected!("avx2")
                && std::arch::is_x86_feature_detected!("fma")
            {
                return Isa::Avx2;
            }
        }
        Isa::Serial
    }

    /// Lowercase name, as exposed through the `isa` property.
    pub fn name(&self) -> &'static str {
        match self {
            Isa::Neon => "neon",
            Isa::Sve => "sve",
            Isa::Avx2 => "avx2",
            Isa::Serial => "serial",
        }
    }
}

impl std::fmt::Display for Isa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Distance metric used for vector similarity computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Cosine distance: `1 - cosine_similarity`. Range \[0, 2\]; zero-norm
    /// inputs produce 1.0.
    Cos,
    /// Squared Euclidean distance. No square root: ranking-equivalent
    /// and cheaper.
    L2sq,
    /// Negated inner product, so that lower still means closer.
    Ip,
    /// Count of mismatching bits after thresholding components at 0.5.
    Hamming,
    /// `1 - |A ∩ B| / |A ∪ B|` over the sets `{i : x_i > 0.5}`. Two empty
    /// sets yield 0.0.
    Jaccard,
}

/// Threshold above which a float component counts as a set member for the
/// Hamming and Jaccard metrics.
const SET_THRESHOLD: f32 = 0.5;

impl MetricKind {
    /// Parse a metric name as accepted by the factory.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cos" => Some(MetricKind::Cos),
            "l2sq" => Some(MetricKind::L2sq),
            "ip" => Some(MetricKind::Ip),
            "hamming" => Some(MetricKind::Hamming),
            "jaccard" => Some(MetricKind::Jaccard),
            _ => None,
        }
    }

    /// Lowercase metric name.
    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::Cos => "cos",
            MetricKind::L2sq => "l2sq",
            MetricKind::Ip => "ip",
            MetricKind::Hamming => "hamming",
            MetricKind::Jaccard => "jaccard",
        }
    }

    /// Numeric code used in the on-disk header.
    pub fn code(&self) -> u16 {
        match self {
            MetricKind::Cos => 0,
            MetricKind::L2sq => 1,
            MetricKind::Ip => 2,
            MetricKind::Hamming => 3,
            MetricKind::Jaccard => 4,
        }
    }

    /// Inverse of [`code`](Self::code).
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(MetricKind::Cos),
            1 => Some(MetricKind::L2sq),
            2 => Some(MetricKind::Ip),
            3 => Some(MetricKind::Hamming),
            4 => Some(MetricKind::Jaccard),
            _ => None,
        }
    }

    /// Distance from an f32 query to a stored vector (f32 or i8).
    ///
    /// For i8 storage the dot-product family dequantizes inside the
    /// kernel; the set-based metrics threshold the dequantized values, so
    /// results agree with the dequantized copy `get_item_vector` returns.
    pub fn distance(&self, isa: Isa, query: &[f32], stored: StoredRef<'_>) -> f32 {
        match stored {
            StoredRef::F32(s) => self.distance_f32(isa, query, s),
            StoredRef::I8 { data, scale } => self.distance_i8(isa, query, data, scale),
        }
    }

    /// Distance between two f32 slices.
    pub fn distance_f32(&self, isa: Isa, a: &[f32], b: &[f32]) -> f32 {
        match self {
            MetricKind::Cos => 1.0 - simd::cosine_f32(isa, a, b),
            MetricKind::L2sq => simd::l2sq_f32(isa, a, b),
            MetricKind::Ip => -simd::dot_f32(isa, a, b),
            MetricKind::Hamming => hamming_f32(a, b),
            MetricKind::Jaccard => jaccard_f32(a, b),
        }
    }

    fn distance_i8(&self, isa: Isa, query: &[f32], stored: &[i8], scale: f32) -> f32 {
        match self {
            MetricKind::Cos => 1.0 - simd::cosine_i8(isa, query, stored, scale),
            MetricKind::L2sq => simd::l2sq_i8(isa, query, stored, scale),
            MetricKind::Ip => -simd::dot_i8(isa, query, stored, scale),
            MetricKind::Hamming => hamming_i8(query, stored, scale),
            MetricKind::Jaccard => jaccard_i8(query, stored, scale),
        }
    }
}

fn hamming_f32(a: &[f32], b: &[f32]) -> f32 {
    let mut mismatches = 0u32;
    for i in 0..a.len() {
        if (a[i] > SET_THRESHOLD) != (b[i] > SET_THRESHOLD) {
            mismatches += 1;
        }
    }
    mismatches as f32
}

fn jaccard_f32(a: &[f32], b: &[f32]) -> f32 {
    let mut intersection = 0u32;
    let mut union_count = 0u32;
    for i in 0..a.len() {
        let in_a = a[i] > SET_THRESHOLD;
        let in_b = b[i] > SET_THRESHOLD;
        if in_a && in_b {
            intersection += 1;
        }
        if in_a || in_b {
            union_count += 1;
        }
    }
    if union_count == 0 {
        return 0.0;
    }
    1.0 - intersection as f32 / union_count as f32
}

fn hamming_i8(query: &[f32], stored: &[i8], scale: f32) -> f32 {
    let step = scale / 127.0;
    let mut mismatches = 0u32;
    for i in 0..query.len() {
        if (query[i] > SET_THRESHOLD) != (stored[i] as f32 * step > SET_THRESHOLD) {
            mismatches += 1;
        }
    }
    mismatches as f32
}

fn jaccard_i8(query: &[f32], stored: &[i8], scale: f32) -> f32 {
    let step = scale / 127.0;
    let mut intersection = 0u32;
    let mut union_count = 0u32;
    for i in 0..query.len() {
        let in_q = query[i] > SET_THRESHOLD;
        let in_s = stored[i] as f32 * step > SET_THRESHOLD;
        if in_q && in_s {
            intersection += 1;
        }
        if in_q || in_s {
            union_count += 1;
        }
    }
    if union_count == 0 {
        return 0.0;
    }
    1.0 - intersection as f32 / union_count as f32
}
