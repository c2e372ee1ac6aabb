//! PCA denoising across channels.
//!
//! Channels are standardised, the `[C, C]` covariance is eigen-decomposed,
//! and the data is projected onto the `k` leading components and back:
//! ```text
//! Z  = standardise(X)            [C, T]
//! Σ  = Z Zᵀ / T
//! Vk = top-k eigenvectors of Σ   [C, k]
//! X' = destandardise(Vk Vkᵀ Z)
//! ```
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::normalize::{destandardize_rows_inplace, standardize_rows_inplace};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PcaDiagnostics {
    pub n_components: usize,
    /// Variance fraction of every component, descending.
    pub explained_variance_ratio: Vec<f64>,
    pub cumulative_variance: Vec<f64>,
    /// `[component][channel]` for the kept components.
    pub loadings: Vec<Vec<f64>>,
    pub channel_names: Vec<String>,
}

/// Eigenvalues (descending) and matching eigenvectors as columns.
fn sorted_eigen(cov: &Array2<f64>) -> (Vec<f64>, DMatrix<f64>) {
    let n = cov.nrows();
    let m = DMatrix::from_fn(n, n, |i, j| cov[[i, j]]);
    let eig = SymmetricEigen::new(m);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));
    let values = order.iter().map(|&i| eig.eigenvalues[i].max(0.0)).collect();
    let vectors = DMatrix::from_fn(n, n, |r, c| eig.eigenvectors[(r, order[c])]);
    (values, vectors)
}

/// Keep `k` principal components of `data` ([C, T]).
///
/// `k` larger than the channel count is clamped with a warning.
pub fn denoise(data: &Array2<f64>, k: usize, names: &[String]) -> Result<(Array2<f64>, PcaDiagnostics)> {
    let (n_ch, n_t) = data.dim();
    if n_t < 2 {
        return Err(Error::param("PCA needs at least two samples"));
    }
    if k == 0 {
        return Err(Error::param("pcaComponents must be at least 1"));
    }
    let k = if k > n_ch {
        log::warn!("pcaComponents {k} exceeds {n_ch} channels; using {n_ch}");
        n_ch
    } else {
        k
    };

    let mut z = data.clone();
    let stats = standardize_rows_inplace(&mut z);
    let cov = z.dot(&z.t()) / n_t as f64;
    let (values, vectors) = sorted_eigen(&cov);

    let total: f64 = values.iter().sum();
    let explained: Vec<f64> = values
        .iter()
        .map(|v| if total > 0.0 { v / total } else { 0.0 })
        .collect();
    let cumulative = explained
        .iter()
        .scan(0.0, |acc, v| {
            *acc += v;
            Some(*acc)
        })
        .collect();

    let vk = Array2::from_shape_fn((n_ch, k), |(r, c)| vectors[(r, c)]);
    let mut recon = vk.dot(&vk.t()).dot(&z);
    destandardize_rows_inplace(&mut recon, &stats);

    log::debug!("PCA: kept {k}/{n_ch} components, {:.1}% variance", 100.0 * explained[..k].iter().sum::<f64>());

    Ok((
        recon,
        PcaDiagnostics {
            n_components: k,
            explained_variance_ratio: explained,
            cumulative_variance: cumulative,
            loadings: (0..k).map(|c| vk.column(c).to_vec()).collect(),
            channel_names: names.to_vec(),
        },
    ))
}
