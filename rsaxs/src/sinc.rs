//! Precomputed sinc lookup tables for the Debye transform.

use ndarray::{Array2, ArrayView1};
use std::hash::{Hash, Hasher};

/// sinc(x) = sin(x)/x with sinc(0) = 1.
#[must_use]
pub fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        x.sin() / x
    }
}

/// A dense table S[i, j] = sinc(qᵢ·dⱼ), built once per (q, d) sampling and
/// read-only afterwards. Every Debye transform runs off one of these.
#[derive(Clone, Debug)]
pub struct SincTable {
    table: Array2<f64>,
}

impl SincTable {
    /// Build the table for the q values `q` and representative distances
    /// `d`.
    #[must_use]
    pub fn new(q: &[f64], d: &[f64]) -> Self {
        let mut table = Array2::zeros((q.len(), d.len()));
        for (i, &q) in q.iter().enumerate() {
            for (j, &d) in d.iter().enumerate() {
                table[[i, j]] = sinc(q * d);
            }
        }
        Self { table }
    }

    /// Number of q samples.
    #[must_use]
    pub fn q_bins(&self) -> usize {
        self.table.nrows()
    }

    /// Number of distance samples.
    #[must_use]
    pub fn d_bins(&self) -> usize {
        self.table.ncols()
    }

    /// The row of sinc values for q-bin `qbin`, indexed by distance bin.
    ///
    /// # Panics
    ///
    /// Panics if `qbin` is out of bounds.
    #[must_use]
    pub fn row(&self, qbin: usize) -> ArrayView1<'_, f64> {
        self.table.row(qbin)
    }

    /// Single table entry.
    #[must_use]
    pub fn value(&self, qbin: usize, dbin: usize) -> f64 {
        self.table[[qbin, dbin]]
    }
}

fn hash_means(means: &[f64]) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    for value in means {
        value.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}

/// A sinc table keyed by the hash of its distance samples. With weighted
/// bins the samples are the current bin means, which move whenever a
/// partial is rebuilt; the key makes those rebuilds cheap to detect.
#[derive(Clone, Debug)]
pub struct CachedSincTable {
    means_hash: u64,
    table: SincTable,
}

impl CachedSincTable {
    /// Build the initial table from the distance samples `d`.
    #[must_use]
    pub fn new(q: &[f64], d: &[f64]) -> Self {
        Self {
            means_hash: hash_means(d),
            table: SincTable::new(q, d),
        }
    }

    /// Rebuild the table if the distance samples changed since the last
    /// build. Returns whether a rebuild happened.
    pub fn update(&mut self, q: &[f64], d: &[f64]) -> bool {
        let hash = hash_means(d);
        if hash == self.means_hash {
            return false;
        }
        self.means_hash = hash;
        self.table = SincTable::new(q, d);
        true
    }

    /// The underlying lookup table.
    #[must_use]
    pub const fn table(&self) -> &SincTable {
        &self.table
    }
}
