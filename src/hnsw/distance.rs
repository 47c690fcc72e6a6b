//! Distance functions for HNSW search.
//!
//! [`DistanceKind`] is a closed set of metrics resolved once, at graph construction,
//! into a plain [`DistanceFn`] pointer. All metrics return a dissimilarity where
//! **lower is closer**.
//!
//! Built-in kernels dispatch to AVX2+FMA on x86_64 when available, NEON on aarch64,
//! and a chunked scalar loop otherwise.

use std::fmt;

/// Signature of a distance function between two equal-length vectors.
pub type DistanceFn = fn(&[f32], &[f32]) -> f32;

/// Distance metric used by an index.
#[derive(Clone, Copy)]
pub enum DistanceKind {
    /// Squared Euclidean distance (L2²). Range: \[0, ∞).
    Euclidean,
    /// `1 - dot(a, b)`. Callers normalize vectors to unit length for cosine semantics.
    InnerProduct,
    /// Kendall rank distance `1 - tau` over component orderings. Range: \[0, 2\].
    /// Quadratic in the dimension.
    Kendall,
    /// Caller-supplied metric. Persisted by tag only; the function must be supplied
    /// again when a snapshot is loaded.
    Custom(DistanceFn),
}

impl DistanceKind {
    /// Snapshot tag for this metric.
    pub fn tag(&self) -> u8 {
        match self {
            DistanceKind::Euclidean => 1,
            DistanceKind::InnerProduct => 3,
            DistanceKind::Kendall => 4,
            DistanceKind::Custom(_) => 255,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DistanceKind::Euclidean => "euclidean",
            DistanceKind::InnerProduct => "inner_product",
            DistanceKind::Kendall => "kendall",
            DistanceKind::Custom(_) => "custom",
        }
    }

    /// Resolve the metric into the function pointer used on the hot path.
    pub fn resolve(&self) -> DistanceFn {
        match self {
            DistanceKind::Euclidean => euclidean_sq,
            DistanceKind::InnerProduct => inner_product_distance,
            DistanceKind::Kendall => kendall_distance,
            DistanceKind::Custom(f) => *f,
        }
    }

    /// Convenience wrapper around [`resolve`](Self::resolve). Not for hot loops.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        (self.resolve())(a, b)
    }
}

impl fmt::Debug for DistanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Squared Euclidean distance between two f32 slices.
#[inline]
#[allow(unreachable_code)]
pub fn euclidean_sq(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vector dimensions differ");
    #[cfg(target_arch = "aarch64")]
    {
        return unsafe { neon_euclidean_sq(a, b) };
    }
    #[cfg(target_arch = "x86_64")]
    {
        if std::arch::is_x86_feature_detected!("avx2") && std::arch::is_x86_feature_detected!("fma")
        {
            return unsafe { avx2_euclidean_sq(a, b) };
        }
    }
    scalar_euclidean_sq(a, b)
}

/// Dot product between two f32 slices.
#[inline]
#[allow(unreachable_code)]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vector dimensions differ");
    #[cfg(target_arch = "aarch64")]
    {
        return unsafe { neon_dot_product(a, b) };
    }
    #[cfg(target_arch = "x86_64")]
    {
        if std::arch::is_x86_feature_detected!("avx2") && std::arch::is_x86_feature_detected!("fma")
        {
            return unsafe { avx2_dot_product(a, b) };
        }
    }
    scalar_dot_product(a, b)
}

/// Inner-product distance: `1 - dot(a, b)`.
#[inline]
pub fn inner_product_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - dot_product(a, b)
}

/// Kendall rank distance: `1 - tau`, where tau counts concordant minus discordant
/// component pairs over all `n * (n - 1) / 2` pairs. Ties count as neither.
pub fn kendall_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vector dimensions differ");
    let n = a.len();
    if n < 2 {
        return 0.0;
    }
    let mut score: i64 = 0;
    for i in 0..n {
        for j in (i + 1)..n {
            let da = (a[i] - a[j]).partial_cmp(&0.0).map_or(0, |o| o as i64);
            let db = (b[i] - b[j]).partial_cmp(&0.0).map_or(0, |o| o as i64);
            score += da * db;
        }
    }
    let pairs = (n * (n - 1) / 2) as f64;
    (1.0 - score as f64 / pairs) as f32
}

fn scalar_euclidean_sq(a: &[f32], b: &[f32]) -> f32 {
    let mut acc = [0.0f32; 4];
    let ca = a.chunks_exact(4);
    let cb = b.chunks_exact(4);
    let (ra, rb) = (ca.remainder(), cb.remainder());
    for (x, y) in ca.zip(cb) {
        for i in 0..4 {
            let d = x[i] - y[i];
            acc[i] += d * d;
        }
    }
    let mut sum = (acc[0] + acc[1]) + (acc[2] + acc[3]);
    for (x, y) in ra.iter().zip(rb) {
        let d = x - y;
        sum += d * d;
    }
    sum
}

fn scalar_dot_product(a: &[f32], b: &[f32]) -> f32 {
    let mut acc = [0.0f32; 4];
    let ca = a.chunks_exact(4);
    let cb = b.chunks_exact(4);
    let (ra, rb) = (ca.remainder(), cb.remainder());
    for (x, y) in ca.zip(cb) {
        for i in 0..4 {
            acc[i] += x[i] * y[i];
        }
    }
    let mut sum = (acc[0] + acc[1]) + (acc[2] + acc[3]);
    for (x, y) in ra.iter().zip(rb) {
        sum += x * y;
    }
    sum
}

// ============================================================================
// AVX2 + FMA (x86_64)
// ============================================================================

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
unsafe fn hsum_f32x8(v: __m256) -> f32 {
    let lo = _mm256_castps256_ps128(v);
    let hi = _mm256_extractf128_ps(v, 1);
    let s = _mm_add_ps(lo, hi);
    let shuf = _mm_movehdup_ps(s);
    let sums = _mm_add_ps(s, shuf);
    let shuf = _mm_movehl_ps(shuf, sums);
    _mm_cvtss_f32(_mm_add_ss(sums, shuf))
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
unsafe fn avx2_euclidean_sq(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
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
unsafe fn avx2_dot_product(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
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

// ============================================================================
// NEON (aarch64)
// ============================================================================

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;

#[cfg(target_arch = "aarch64")]
unsafe fn neon_euclidean_sq(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
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
unsafe fn neon_dot_product(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
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
