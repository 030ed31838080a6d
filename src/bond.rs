//! Schmidt decomposition of two-site blocks and the bond truncation policy.
//!
//! Every bond in the chain is re-derived from a singular value decomposition
//! of a locally contracted block. Truncation happens here, in one place:
//! singular values below the configured threshold are dropped, the retained
//! set is capped at the configured maximum bond dimension, and what remains
//! is rescaled to unit square-norm so that the chain stays normalized.

use ndarray as nd;
use ndarray_linalg::SVDInto;
use num_complex::Complex64 as C64;
use crate::config::MPSConfig;

/// A truncated Schmidt decomposition `M = U · diag(s) · V†`.
#[derive(Clone, Debug)]
pub(crate) struct Schmidt {
    /// Left Schmidt vectors, one column per retained value.
    pub u: nd::Array2<C64>,
    /// Retained Schmidt values, descending, rescaled to unit square-norm.
    pub s: Vec<f64>,
    /// Right Schmidt vectors, one row per retained value.
    pub vh: nd::Array2<C64>,
    /// Retained rank; equal to `s.len()`.
    pub rank: usize,
}

/// Decompose a two-site block and truncate the spectrum per `cfg`.
///
/// The input need not be normalized: the spectrum is rescaled to unit
/// square-norm both before thresholding and after truncation, so applying a
/// sub-normalized operator (a measurement projector, a Kraus operator)
/// comes out renormalized for free.
pub(crate) fn schmidt_decomp(q: nd::Array2<C64>, cfg: &MPSConfig) -> Schmidt {
    let (Some(u), mut s, Some(mut vh)) = q.svd_into(true, true).unwrap()
        else { unreachable!() };
    let mut norm: f64
        = s.iter()
        .filter(|sj| sj.is_normal())
        .map(|sj| sj.powi(2))
        .sum::<f64>()
        .sqrt();
    s.iter_mut().for_each(|sj| { *sj /= norm; });
    let rank
        = s.iter()
        .take_while(|sj| sj.is_normal() && **sj > cfg.truncation_threshold)
        .count()
        .min(cfg.max_bond_dimension.unwrap_or(usize::MAX))
        .max(1);
    let mut s: Vec<f64> = s.into_iter().take(rank).collect();
    norm = s.iter().map(|sj| sj.powi(2)).sum::<f64>().sqrt();
    s.iter_mut().for_each(|sj| { *sj /= norm; });
    vh.slice_axis_inplace(
        nd::Axis(0), nd::Slice::new(0, Some(rank as isize), 1));
    let u = u.slice(nd::s![.., ..rank]).to_owned();
    Schmidt { u, s, vh, rank }
}
