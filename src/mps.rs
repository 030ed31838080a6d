//! Matrix product states factored in a Schmidt decomposition-based canonical
//! form.
//!
//! An *N*-qubit pure state is decomposed qubit-by-qubit into a chain of
//! rank-3 "Γ" tensors joined by "Λ" vectors of Schmidt values, so that every
//! singular value of every left/right bipartition is available at all times.
//! Keeping the factorization canonical buys two things: bonds can be
//! truncated on the fly by discarding small Schmidt values, and local
//! quantities (measurement probabilities, expectation values, reduced
//! density matrices) can be computed by contractions whose cost scales with
//! the bond dimension rather than with 2^N.
//!
//! ```text
//!       .-bond 0-.        .-bond 1-.       .-bond n-2-.
//!       V        V        V        V       V          V
//! Γ[0] --- Λ[0] --- Γ[1] --- Λ[1] --- ... --- Λ[n-2] --- Γ[n-1]
//!  |                 |                                     |
//!  | <- physical     | <- physical                         | <- physical
//!       index 0           index 1                               index n-1
//! ```
//!
//! Qubit `k` lives on site `k`; bit `k` of every external basis index is the
//! physical value of site `k` (qubit 0 is the least-significant bit). State
//! vectors are bit-reversed on ingest and egress to reconcile this with the
//! chain's left-to-right contraction order.
//!
//! # Example
//!
//! ```
//! use rand::thread_rng;
//! use qmps::config::MPSConfig;
//! use qmps::gate::Gate;
//! use qmps::mps::MPS;
//!
//! let mut mps = MPS::new(2, MPSConfig::default()).unwrap();
//! mps.apply_gate(&Gate::H(0)).unwrap();
//! mps.apply_gate(&Gate::CX(0, 1)).unwrap();
//!
//! let probs = mps.probabilities(&[0, 1]).unwrap();
//! assert!((probs[0] - 0.5).abs() < 1e-12);
//! assert!((probs[3] - 0.5).abs() < 1e-12);
//!
//! // projective measurement collapses to a correlated bitstring
//! let outcome = mps.measure(&[0, 1], &mut thread_rng()).unwrap();
//! assert_eq!(outcome[0], outcome[1]);
//! ```

use std::fmt;
use itertools::Itertools;
use log::warn;
use ndarray as nd;
use num_complex::Complex64 as C64;
use num_traits::{ One, Zero };
use once_cell::sync::Lazy;
use rand::Rng;
use thiserror::Error;
use crate::{
    bond::{ schmidt_decomp, Schmidt },
    config::MPSConfig,
    gate::{ self, Gate },
};

/// Tolerated drift in a probability sum before renormalization kicks in.
pub(crate) const NORM_TOLERANCE: f64 = 1e-10;

/// Largest drift that silent renormalization is allowed to absorb; anything
/// beyond this is reported as an error.
pub(crate) const NORM_GUARD: f64 = 1e-6;

/// Allowed deviation from exact unitarity in dense operators.
const UNITARY_TOLERANCE: f64 = 1e-8;

#[derive(Debug, Error)]
pub enum MPSError {
    /// Returned when attempting to create a state over zero qubits.
    #[error("cannot create an MPS for an empty system")]
    EmptySystem,

    /// Returned when an initial state vector (or copied state) has a length
    /// that doesn't match the qubit count.
    #[error("initial state length {found} does not match the register size {expected}")]
    StateIncompatibleShape { expected: usize, found: usize },

    /// Returned when an operator's shape does not agree with its targets.
    #[error("operator shape does not match the targeted physical indices")]
    OperatorIncompatibleShape,

    /// Returned when a target index lies outside the register.
    #[error("qubit index {qubit} is out of bounds for a register of {num_qubits}")]
    QubitOutOfBounds { qubit: usize, num_qubits: usize },

    /// Returned when the same qubit appears twice in a target list.
    #[error("qubit index {0} appears more than once in the target list")]
    DuplicateQubit(usize),

    /// Returned when no target qubits are given.
    #[error("no target qubits given")]
    EmptyTargets,

    /// Returned when a dense operator targets more than two qubits.
    #[error("dense operators are limited to two qubits; got {0} targets")]
    UnsupportedOperator(usize),

    /// Returned when a gate matrix fails the unitarity check.
    #[error("operator is not unitary within tolerance")]
    NonUnitaryOperator,

    /// Returned when initialization targets a proper subset of the register.
    #[error("partial initialization is not supported: targets must be all \
             qubits in ascending order")]
    PartialInitialization,

    /// Returned for a gate name outside the recognized set.
    #[error("unknown gate '{0}'")]
    UnknownGate(String),

    /// Returned when a recognized gate is given the wrong operand counts.
    #[error("gate '{name}' expects {qubits} qubit(s) and {params} parameter(s)")]
    InvalidGateOperands { name: &'static str, qubits: usize, params: usize },

    /// Returned for a character outside {I, X, Y, Z} in a Pauli string.
    #[error("'{0}' is not a Pauli label; expected one of I, X, Y, Z")]
    MalformedPauli(char),

    /// Returned when a Pauli string's length doesn't match its target list.
    #[error("Pauli string length does not match the number of target qubits")]
    PauliIncompatibleShape,

    /// Returned when a distribution or norm drifts beyond the guard.
    #[error("normalization drift: weights sum to {0}")]
    NormalizationDrift(f64),

    /// Returned when a Kraus set's selection weights don't sum to one.
    #[error("Kraus operators are not trace preserving: weights sum to {0}")]
    ChannelNotTracePreserving(f64),
}
use MPSError::*;
pub type MPSResult<T> = Result<T, MPSError>;

/// A matrix product (pure) state over a register of qubits.
///
/// The state is maintained in canonical (Vidal) form: the tensors
/// `Λ[k-1]·Γ[k]` and `Γ[k]·Λ[k]` are left- and right-isometric at every
/// site, and every `Λ[k]` carries the Schmidt values of the corresponding
/// bipartition, normalized so that their squares sum to 1. Every mutating
/// operation restores these invariants before returning (up to the
/// configured truncation).
///
/// Two-qubit operations on non-adjacent qubits are routed through
/// nearest-neighbor swaps and undone afterwards, so callers can target any
/// qubit pair.
#[derive(Clone, Debug, PartialEq)]
pub struct MPS {
    // Number of qubits.
    n: usize, // ≥ 1
    // Site tensors. Array `k` has axis signature [ u{k-1}, s{k}, u{k} ],
    // where `u{j}` is a bond index and `s{j}` is a physical index. Endpoint
    // bond dimensions are held fixed at dim(u{-1}) == dim(u{n-1}) == 1.
    data: Vec<nd::Array3<C64>>, // length n
    // Schmidt values; svals[k] sits on the bond between sites k and k + 1.
    svals: Vec<Vec<f64>>, // length n - 1
    // Truncation and snapshot settings, fixed at construction.
    cfg: MPSConfig,
}

/// Reverse the lowest `nbits` bits of `i`.
pub(crate) fn reverse_bits(i: usize, nbits: usize) -> usize {
    (0..nbits).fold(0, |acc, b| (acc << 1) | ((i >> b) & 1))
}

impl MPS {
    /// Initialize to the all-|0⟩ product state over `n` qubits.
    ///
    /// Fails if `n` is zero.
    pub fn new(n: usize, cfg: MPSConfig) -> MPSResult<Self> {
        if n == 0 { return Err(EmptySystem); }
        let data: Vec<nd::Array3<C64>>
            = (0..n)
            .map(|_| {
                let mut g: nd::Array3<C64> = nd::Array3::zeros((1, 2, 1));
                g[[0, 0, 0]] = C64::one();
                g
            })
            .collect();
        let svals: Vec<Vec<f64>>
            = (0..n.saturating_sub(1)).map(|_| vec![1.0]).collect();
        Ok(Self { n, data, svals, cfg })
    }

    /// Initialize by factoring an existing pure state vector via `n - 1`
    /// successive Schmidt decompositions.
    ///
    /// `state` is indexed in the external convention (bit `k` of the index
    /// is the value of qubit `k`) and is normalized on ingest.
    ///
    /// Fails if `n` is zero or `state` does not have length 2^`n`.
    pub fn from_statevector(n: usize, state: &[C64], cfg: MPSConfig)
        -> MPSResult<Self>
    {
        if n == 0 { return Err(EmptySystem); }
        let len = 1_usize << n;
        if state.len() != len {
            return Err(StateIncompatibleShape {
                expected: len, found: state.len(),
            });
        }
        let mut internal: nd::Array1<C64> = nd::Array1::zeros(len);
        for (i, a) in state.iter().enumerate() {
            internal[reverse_bits(i, n)] = *a;
        }
        let norm: f64
            = internal.iter().map(|a| a.norm_sqr()).sum::<f64>().sqrt();
        if !norm.is_normal() { return Err(NormalizationDrift(norm * norm)); }
        internal.map_inplace(|a| { *a /= C64::from(norm); });
        if n == 1 {
            let mut g: nd::Array3<C64> = nd::Array3::zeros((1, 2, 1));
            g[[0, 0, 0]] = internal[0];
            g[[0, 1, 0]] = internal[1];
            return Ok(Self { n, data: vec![g], svals: Vec::new(), cfg });
        }
        Ok(Self::factorize(n, internal, cfg))
    }

    // peel sites off the front of a (bit-reversed, normalized) state vector
    // one SVD at a time; assumes n ≥ 2
    fn factorize(n: usize, state: nd::Array1<C64>, cfg: MPSConfig) -> Self {
        let mut data: Vec<nd::Array3<C64>> = Vec::with_capacity(n);
        let mut svals: Vec<Vec<f64>> = Vec::with_capacity(n - 1);
        let mut udim: usize = 1;
        let statelen = state.len();
        let mut q: nd::Array2<C64>
            = state.into_shape((1, statelen)).unwrap();
        for k in 0..n - 1 {
            // fuse the next physical index with the previous Schmidt index
            let reshape_m = udim * 2;
            let reshape_n = q.len() / reshape_m;
            q = q.into_shape((reshape_m, reshape_n)).unwrap();

            let Schmidt { u, s, vh, rank } = schmidt_decomp(q, &cfg);

            // Γ[k] = Λ[k-1]⁻¹ · U, with near-zero inverses clamped
            let mut g = u.into_shape((udim, 2, rank)).unwrap();
            if let Some(slast) = svals.last() {
                let tau = cfg.truncation_threshold;
                g.axis_iter_mut(nd::Axis(0)).zip(slast.iter())
                    .for_each(|(mut gv, lv)| {
                        if lv.is_normal() && *lv > tau {
                            gv.map_inplace(|gj| { *gj /= C64::from(*lv); });
                        } else {
                            gv.fill(C64::zero());
                        }
                    });
            }
            data.push(g);

            // if SVDs remain, recombine the right factor with the Schmidt
            // values; otherwise the final state of q is exactly Γ[n-1]
            q = vh;
            if k < n - 2 {
                q.axis_iter_mut(nd::Axis(0)).zip(&s)
                    .for_each(|(mut qv, sv)| {
                        qv.map_inplace(|qj| { *qj *= C64::from(*sv); });
                    });
            }
            svals.push(s);
            udim = rank;
        }
        data.push(q.into_shape((udim, 2, 1)).unwrap());
        Self { n, data, svals, cfg }
    }

    /// Return the number of qubits.
    pub fn n(&self) -> usize { self.n }

    /// Return the configuration this state was built with.
    pub fn config(&self) -> &MPSConfig { &self.cfg }

    /// Return the dimension of every bond, left to right.
    pub fn bond_dimensions(&self) -> Vec<usize> {
        self.svals.iter().map(|s| s.len()).collect()
    }

    /// Return the largest bond dimension in the chain.
    pub fn max_bond_dimension(&self) -> usize {
        self.svals.iter().map(|s| s.len()).max().unwrap_or(1)
    }

    /// Return the Schmidt values on the `b`-th bond, or `None` if `b` is
    /// out of bounds.
    pub fn schmidt_values(&self, b: usize) -> Option<&[f64]> {
        self.svals.get(b).map(|s| s.as_slice())
    }

    /// Compute the Von Neumann entropy for the bipartition on the `b`-th
    /// bond, or `None` if `b` is out of bounds.
    pub fn entropy_vn(&self, b: usize) -> Option<f64> {
        self.svals.get(b)
            .map(|s| {
                s.iter().copied()
                    .filter(|sk| *sk > 0.0)
                    .map(|sk| {
                        let sk2 = sk * sk;
                        -sk2 * sk2.ln()
                    })
                    .sum()
            })
    }

    /// Return the norm of the represented state.
    ///
    /// This is 1 up to truncation error whenever the invariants hold.
    pub fn norm(&self) -> f64 { self.local_norm(0) }

    // bounds, duplicate, and emptiness checks shared by every public
    // operation that takes a target list
    fn check_qubits(&self, qubits: &[usize]) -> MPSResult<()> {
        if qubits.is_empty() { return Err(EmptyTargets); }
        for (i, &q) in qubits.iter().enumerate() {
            if q >= self.n {
                return Err(QubitOutOfBounds { qubit: q, num_qubits: self.n });
            }
            if qubits[..i].contains(&q) { return Err(DuplicateQubit(q)); }
        }
        Ok(())
    }

    // per-outcome weights of a single-site measurement in canonical form:
    // p(s) = Σ_{v,u} Λ[k-1][v]² |Γ[k][v,s,u]|² Λ[k][u]²
    fn site_probabilities(&self, k: usize) -> [f64; 2] {
        let g = &self.data[k];
        let (l, _, r) = g.dim();
        let mut probs = [0.0; 2];
        for (s, pr) in probs.iter_mut().enumerate() {
            let mut acc = 0.0;
            for v in 0..l {
                let wl = if k == 0 { 1.0 } else { self.svals[k - 1][v] };
                for u in 0..r {
                    let wr
                        = if k == self.n - 1 { 1.0 }
                        else { self.svals[k][u] };
                    acc += wl * wl * g[[v, s, u]].norm_sqr() * wr * wr;
                }
            }
            *pr = acc;
        }
        probs
    }

    // norm of the subspace belonging to site `k`; assumes `k` in bounds
    fn local_norm(&self, k: usize) -> f64 {
        let p = self.site_probabilities(k);
        (p[0] + p[1]).sqrt()
    }

    // rescale Γ[k] so the local norm is exactly 1
    fn renormalize(&mut self, k: usize) {
        let norm = self.local_norm(k);
        if norm.is_normal() {
            self.data[k].map_inplace(|g| { *g /= C64::from(norm); });
        }
    }

    /// Apply a single-qubit operator to qubit `k`.
    ///
    /// The arrangement of `op` corresponds to the usual
    /// left-matrix-multiplication view of operator application; `op` is not
    /// checked for unitarity (see [`apply_matrix`][Self::apply_matrix] for
    /// the checked entry point). Bond dimensions and canonical form are
    /// untouched.
    ///
    /// Fails if `k` is out of bounds or `op` is not 2×2.
    pub fn apply_unitary1(&mut self, k: usize, op: &nd::Array2<C64>)
        -> MPSResult<&mut Self>
    {
        if k >= self.n {
            return Err(QubitOutOfBounds { qubit: k, num_qubits: self.n });
        }
        if op.shape() != [2, 2] { return Err(OperatorIncompatibleShape); }
        self.data[k]
            .axis_iter_mut(nd::Axis(0))
            .for_each(|mut gv| {
                gv.axis_iter_mut(nd::Axis(1))
                    .for_each(|mut gvu| {
                        gvu.assign(&op.dot(&gvu));
                    });
            });
        Ok(self)
    }

    // multiply the physical slices of Γ[k] by a diagonal; no SVD, no bond
    // growth
    fn apply_phase1(&mut self, k: usize, d0: C64, d1: C64) {
        self.data[k].slice_mut(nd::s![.., 0, ..])
            .map_inplace(|g| { *g *= d0; });
        self.data[k].slice_mut(nd::s![.., 1, ..])
            .map_inplace(|g| { *g *= d1; });
    }

    // fixed-axis phase gate with operand validation
    fn apply_gate_phase(&mut self, k: usize, phase: C64)
        -> MPSResult<&mut Self>
    {
        if k >= self.n {
            return Err(QubitOutOfBounds { qubit: k, num_qubits: self.n });
        }
        self.apply_phase1(k, C64::one(), phase);
        Ok(self)
    }

    // contract Λ[k-1]·Γ[k]·Λ[k]·Γ[k+1]·Λ[k+1] (boundary Λs implicit) into a
    // (L·2, 2·R) block, optionally with a 4×4 operator applied across the
    // two physical indices; assumes k + 1 < n
    fn contract_window(&self, k: usize, op: Option<&nd::Array2<C64>>)
        -> nd::Array2<C64>
    {
        let gk = &self.data[k];
        let gk1 = &self.data[k + 1];
        let lk = gk.shape()[0];
        let rk1 = gk1.shape()[2];
        let lam = &self.svals[k];
        let laml = (k > 0).then(|| self.svals[k - 1].as_slice());
        let lamr
            = (k + 1 < self.n - 1).then(|| self.svals[k + 1].as_slice());
        nd::Array2::from_shape_fn(
            (lk * 2, 2 * rk1),
            |(v_sk, sk1_w)| {
                let v = v_sk / 2;
                let sk = v_sk % 2;
                let sk1 = sk1_w / rk1;
                let w = sk1_w % rk1;
                let wl = laml.map_or(1.0, |l| l[v]);
                let wr = lamr.map_or(1.0, |l| l[w]);
                let amp = match op {
                    Some(op) => {
                        (0..2).cartesian_product(0..2)
                            .map(|(ssk, ssk1)| {
                                lam.iter().enumerate()
                                    .map(|(u, lu)| {
                                        gk[[v, ssk, u]]
                                            * C64::from(*lu)
                                            * gk1[[u, ssk1, w]]
                                    })
                                    .fold(C64::zero(), |acc, x| acc + x)
                                    * op[[sk * 2 + sk1, ssk * 2 + ssk1]]
                            })
                            .fold(C64::zero(), |acc, x| acc + x)
                    },
                    None => {
                        lam.iter().enumerate()
                            .map(|(u, lu)| {
                                gk[[v, sk, u]]
                                    * C64::from(*lu)
                                    * gk1[[u, sk1, w]]
                            })
                            .fold(C64::zero(), |acc, x| acc + x)
                    },
                };
                amp * C64::from(wl * wr)
            },
        )
    }

    // re-factor a contracted two-site block: truncate the new Schmidt
    // spectrum, divide the boundary Λs back out (clamping near-zero
    // inverses to zero), and restore local norms; assumes k + 1 < n
    fn split_window(&mut self, k: usize, theta: nd::Array2<C64>) {
        let lk = self.data[k].shape()[0];
        let rk1 = self.data[k + 1].shape()[2];
        let Schmidt { u, s, vh, rank } = schmidt_decomp(theta, &self.cfg);
        let tau = self.cfg.truncation_threshold;
        let mut gk = u.into_shape((lk, 2, rank)).unwrap();
        if k > 0 {
            gk.axis_iter_mut(nd::Axis(0)).zip(&self.svals[k - 1])
                .for_each(|(mut gv, lv)| {
                    if lv.is_normal() && *lv > tau {
                        gv.map_inplace(|g| { *g /= C64::from(*lv); });
                    } else {
                        gv.fill(C64::zero());
                    }
                });
        }
        let mut gk1 = vh.into_shape((rank, 2, rk1)).unwrap();
        if k + 1 < self.n - 1 {
            gk1.axis_iter_mut(nd::Axis(2)).zip(&self.svals[k + 1])
                .for_each(|(mut gw, lw)| {
                    if lw.is_normal() && *lw > tau {
                        gw.map_inplace(|g| { *g /= C64::from(*lw); });
                    } else {
                        gw.fill(C64::zero());
                    }
                });
        }
        self.data[k] = gk;
        self.svals[k] = s;
        self.data[k + 1] = gk1;
        self.renormalize(k);
        self.renormalize(k + 1);
    }

    // two-site operator on neighboring sites (k, k + 1)
    fn apply_adjacent(&mut self, k: usize, op: &nd::Array2<C64>) {
        let theta = self.contract_window(k, Some(op));
        self.split_window(k, theta);
    }

    // exchange the physical indices of sites k and k + 1
    fn swap_adjacent(&mut self, k: usize) {
        self.apply_adjacent(k, Lazy::force(&gate::SWAPMAT));
    }

    // re-derive the Schmidt data on bond k from the current tensors
    fn restore_bond(&mut self, k: usize) {
        let theta = self.contract_window(k, None);
        self.split_window(k, theta);
    }

    // re-canonicalize the whole chain after site `k` was hit by a
    // projector or Kraus operator. A non-unitary site operation shifts the
    // Schmidt spectrum of every bipartition, not just the neighboring
    // ones, so identity two-site updates are propagated rightward to the
    // end of the chain and then leftward to the start.
    fn restore_canonical(&mut self, k: usize) {
        if self.n == 1 {
            self.renormalize(0);
            return;
        }
        for j in k..self.n - 1 { self.restore_bond(j); }
        for j in (0..k).rev() { self.restore_bond(j); }
    }

    /// Apply a two-qubit operator to qubits `q0` and `q1`.
    ///
    /// The first operand indexes the more significant bit of the 4×4
    /// matrix. Non-adjacent targets are routed together through
    /// nearest-neighbor swaps, which are undone afterwards. `op` is not
    /// checked for unitarity (see [`apply_matrix`][Self::apply_matrix]).
    ///
    /// Fails if the targets are out of bounds or equal, or if `op` is not
    /// 4×4.
    pub fn apply_unitary2(
        &mut self,
        q0: usize,
        q1: usize,
        op: &nd::Array2<C64>,
    ) -> MPSResult<&mut Self>
    {
        self.check_qubits(&[q0, q1])?;
        if op.shape() != [4, 4] { return Err(OperatorIncompatibleShape); }
        let (i, j, op) = if q0 < q1 {
            (q0, q1, std::borrow::Cow::Borrowed(op))
        } else {
            (q1, q0, std::borrow::Cow::Owned(gate::reverse_qargs(op)))
        };
        if j - i == 1 {
            self.apply_adjacent(i, &op);
        } else {
            // walk site i rightward until it neighbors j, apply, walk back
            for t in i..j - 1 { self.swap_adjacent(t); }
            self.apply_adjacent(j - 1, &op);
            for t in (i..j - 1).rev() { self.swap_adjacent(t); }
        }
        Ok(self)
    }

    /// Apply a dense 1- or 2-qubit operator, checking unitarity.
    ///
    /// Fails if there are more than two targets, the shape doesn't match,
    /// or `op` deviates from unitarity beyond tolerance.
    pub fn apply_matrix(&mut self, qubits: &[usize], op: &nd::Array2<C64>)
        -> MPSResult<&mut Self>
    {
        self.check_qubits(qubits)?;
        match qubits.len() {
            1 | 2 => { },
            m => { return Err(UnsupportedOperator(m)); },
        }
        let dim = 1_usize << qubits.len();
        if op.shape() != [dim, dim] { return Err(OperatorIncompatibleShape); }
        check_unitary(op)?;
        if qubits.len() == 1 {
            self.apply_unitary1(qubits[0], op)
        } else {
            self.apply_unitary2(qubits[0], qubits[1], op)
        }
    }

    /// Apply a diagonal operator given by its 2^m diagonal entries.
    ///
    /// Single-qubit diagonals multiply the physical slices directly with no
    /// decomposition; an entangling two-qubit diagonal changes the Schmidt
    /// spectrum, so it goes through the ordinary two-site update.
    ///
    /// Fails if there are more than two targets, the length doesn't match,
    /// or any entry deviates from unit modulus beyond tolerance.
    pub fn apply_diagonal(&mut self, qubits: &[usize], diag: &[C64])
        -> MPSResult<&mut Self>
    {
        self.check_qubits(qubits)?;
        match qubits.len() {
            1 | 2 => { },
            m => { return Err(UnsupportedOperator(m)); },
        }
        if diag.len() != 1 << qubits.len() {
            return Err(OperatorIncompatibleShape);
        }
        if diag.iter().any(|d| (d.norm() - 1.0).abs() > UNITARY_TOLERANCE) {
            return Err(NonUnitaryOperator);
        }
        if qubits.len() == 1 {
            self.apply_phase1(qubits[0], diag[0], diag[1]);
            Ok(self)
        } else {
            let op = nd::Array2::from_diag(
                &diag.iter().copied().collect::<nd::Array1<C64>>());
            self.apply_unitary2(qubits[0], qubits[1], &op)
        }
    }

    /// Perform the action of a gate.
    pub fn apply_gate(&mut self, gate: &Gate) -> MPSResult<&mut Self> {
        match *gate {
            Gate::Id(k) => {
                self.check_qubits(&[k])?;
                Ok(self)
            },
            Gate::X(k) => {
                self.apply_unitary1(k, Lazy::force(&gate::XMAT))
            },
            Gate::Y(k) => {
                self.apply_unitary1(k, Lazy::force(&gate::YMAT))
            },
            Gate::Z(k) => {
                self.apply_gate_phase(k, -C64::one())
            },
            Gate::H(k) => {
                self.apply_unitary1(k, Lazy::force(&gate::HMAT))
            },
            Gate::S(k) => {
                self.apply_gate_phase(k, C64::cis(gate::PHASE_S))
            },
            Gate::Sdg(k) => {
                self.apply_gate_phase(k, C64::cis(gate::PHASE_SDG))
            },
            Gate::T(k) => {
                self.apply_gate_phase(k, C64::cis(gate::PHASE_T))
            },
            Gate::Tdg(k) => {
                self.apply_gate_phase(k, C64::cis(gate::PHASE_TDG))
            },
            Gate::Sx(k) => {
                self.apply_unitary1(k, Lazy::force(&gate::SXMAT))
            },
            Gate::Phase(k, lambda) => {
                self.apply_gate_phase(k, C64::cis(lambda))
            },
            Gate::U2(k, phi, lambda) => {
                self.apply_unitary1(k, &gate::make_u2(phi, lambda))
            },
            Gate::U3(k, theta, phi, lambda) => {
                self.apply_unitary1(k, &gate::make_u3(theta, phi, lambda))
            },
            Gate::CX(c, t) => {
                self.apply_unitary2(c, t, Lazy::force(&gate::CXMAT))
            },
            Gate::CZ(a, b) => {
                self.apply_unitary2(a, b, Lazy::force(&gate::CZMAT))
            },
            Gate::CPhase(a, b, lambda) => {
                self.apply_unitary2(a, b, &gate::make_cphase(lambda))
            },
            Gate::Swap(a, b) => {
                self.apply_unitary2(a, b, Lazy::force(&gate::SWAPMAT))
            },
            Gate::CCX(a, b, c) => {
                self.apply_ccx(a, b, c)
            },
        }
    }

    /// Resolve a gate from its instruction name and apply it.
    pub fn apply_named_gate(
        &mut self,
        name: &str,
        qubits: &[usize],
        params: &[f64],
    ) -> MPSResult<&mut Self>
    {
        let gate = Gate::from_name(name, qubits, params)?;
        self.apply_gate(&gate)
    }

    /// Perform a series of gates.
    pub fn apply_circuit<'a, I>(&mut self, gates: I) -> MPSResult<&mut Self>
    where I: IntoIterator<Item = &'a Gate>
    {
        for gate in gates.into_iter() { self.apply_gate(gate)?; }
        Ok(self)
    }

    /// Apply a Toffoli gate with controls `a`, `b` and target `c`, by
    /// decomposition into one- and two-qubit gates.
    pub fn apply_ccx(&mut self, a: usize, b: usize, c: usize)
        -> MPSResult<&mut Self>
    {
        self.check_qubits(&[a, b, c])?;
        let t = C64::cis(gate::PHASE_T);
        let tdg = C64::cis(gate::PHASE_TDG);
        let h = Lazy::force(&gate::HMAT);
        let cx = Lazy::force(&gate::CXMAT);
        self.apply_unitary1(c, h)?;
        self.apply_unitary2(b, c, cx)?;
        self.apply_gate_phase(c, tdg)?;
        self.apply_unitary2(a, c, cx)?;
        self.apply_gate_phase(c, t)?;
        self.apply_unitary2(b, c, cx)?;
        self.apply_gate_phase(c, tdg)?;
        self.apply_unitary2(a, c, cx)?;
        self.apply_gate_phase(b, t)?;
        self.apply_gate_phase(c, t)?;
        self.apply_unitary1(c, h)?;
        self.apply_unitary2(a, b, cx)?;
        self.apply_gate_phase(a, t)?;
        self.apply_gate_phase(b, tdg)?;
        self.apply_unitary2(a, b, cx)?;
        Ok(self)
    }

    // sample and project a single site, then restore canonical form on the
    // adjacent bonds
    fn measure_one<R>(&mut self, k: usize, rng: &mut R) -> MPSResult<u8>
    where R: Rng + ?Sized
    {
        let probs = self.site_probabilities(k);
        let total = probs[0] + probs[1];
        if (total - 1.0).abs() > NORM_GUARD {
            return Err(NormalizationDrift(total));
        }
        let r: f64 = rng.gen::<f64>() * total;
        let outcome = usize::from(r >= probs[0]);
        let p = probs[outcome] / total;
        if !p.is_normal() { return Err(NormalizationDrift(p)); }

        // project onto the observed slice and rescale by 1/√p
        let renorm = C64::from(p.sqrt());
        self.data[k].slice_mut(nd::s![.., 1 - outcome, ..])
            .fill(C64::zero());
        self.data[k].slice_mut(nd::s![.., outcome, ..])
            .map_inplace(|g| { *g /= renorm; });

        self.restore_canonical(k);
        Ok(outcome as u8)
    }

    /// Perform a randomized projective measurement on `qubits`, collapsing
    /// the state.
    ///
    /// Sites are measured in ascending order; the returned bits are aligned
    /// with the order of `qubits`.
    pub fn measure<R>(&mut self, qubits: &[usize], rng: &mut R)
        -> MPSResult<Vec<u8>>
    where R: Rng + ?Sized
    {
        self.check_qubits(qubits)?;
        let mut sorted: Vec<usize> = qubits.to_vec();
        sorted.sort_unstable();
        let mut out: Vec<u8> = vec![0; qubits.len()];
        for k in sorted {
            let b = self.measure_one(k, rng)?;
            let i = qubits.iter().position(|&q| q == k).unwrap();
            out[i] = b;
        }
        Ok(out)
    }

    /// Reset `qubits` to |0⟩ by measuring them and flipping any that came
    /// out |1⟩; the outcome is discarded.
    pub fn reset<R>(&mut self, qubits: &[usize], rng: &mut R)
        -> MPSResult<()>
    where R: Rng + ?Sized
    {
        let outcome = self.measure(qubits, rng)?;
        for (&q, &b) in qubits.iter().zip(&outcome) {
            if b == 1 {
                self.apply_unitary1(q, Lazy::force(&gate::XMAT))?;
            }
        }
        Ok(())
    }

    /// Sample a Kraus operator from `kmats` with probability equal to its
    /// squared norm on the current state, apply it, and renormalize.
    ///
    /// Fails if the selection weights do not sum to 1 within the guard,
    /// i.e. if the operators do not satisfy Σ Kᵢ†Kᵢ = I on the targets.
    pub fn apply_kraus<R>(
        &mut self,
        qubits: &[usize],
        kmats: &[nd::Array2<C64>],
        rng: &mut R,
    ) -> MPSResult<()>
    where R: Rng + ?Sized
    {
        self.check_qubits(qubits)?;
        match qubits.len() {
            1 | 2 => { },
            m => { return Err(UnsupportedOperator(m)); },
        }
        let dim = 1_usize << qubits.len();
        if kmats.is_empty()
            || kmats.iter().any(|km| km.shape() != [dim, dim])
        {
            return Err(OperatorIncompatibleShape);
        }

        // pᵢ = Tr(ρ_S · Kᵢ†Kᵢ), all from one reduced density matrix
        let rho = self.density_matrix(qubits)?;
        let weights: Vec<f64>
            = kmats.iter()
            .map(|km| {
                let kdk = km.mapv(|x| x.conj()).reversed_axes().dot(km);
                rho.dot(&kdk).diag().iter().map(|x| x.re).sum::<f64>()
            })
            .collect();
        let total: f64 = weights.iter().sum();
        if (total - 1.0).abs() > NORM_GUARD {
            return Err(ChannelNotTracePreserving(total));
        }

        let r: f64 = rng.gen::<f64>() * total;
        let mut acc = 0.0;
        let mut chosen = kmats.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            acc += w;
            if r < acc { chosen = i; break; }
        }

        let km = &kmats[chosen];
        if qubits.len() == 1 {
            let k = qubits[0];
            self.apply_unitary1(k, km)?;
            self.restore_canonical(k);
        } else {
            self.apply_unitary2(qubits[0], qubits[1], km)?;
            self.restore_canonical(qubits[0].min(qubits[1]));
        }
        Ok(())
    }

    /// Compute the marginal probability distribution over `qubits`.
    ///
    /// Bit `i` of the distribution index is the value of `qubits[i]`. If
    /// the sum drifts from 1 within the guard, the distribution is
    /// renormalized and a diagnostic is logged; drift beyond the guard is
    /// an error.
    pub fn probabilities(&self, qubits: &[usize]) -> MPSResult<Vec<f64>> {
        self.check_qubits(qubits)?;
        let sorted_full = qubits.len() == self.n
            && qubits.windows(2).all(|w| w[0] < w[1]);
        let mut probs: Vec<f64> = if sorted_full {
            self.probabilities_full()
        } else {
            self.density_matrix(qubits)?
                .diag().iter()
                .map(|x| x.re.max(0.0))
                .collect()
        };
        let total: f64 = probs.iter().sum();
        if (total - 1.0).abs() > NORM_GUARD {
            return Err(NormalizationDrift(total));
        }
        if (total - 1.0).abs() > NORM_TOLERANCE {
            warn!("renormalizing marginal distribution: sum = {total}");
            probs.iter_mut().for_each(|p| { *p /= total; });
        }
        Ok(probs)
    }

    // all-qubit distribution by recursive descent over basis prefixes,
    // carrying a bond-space row vector per prefix; never materializes the
    // 2^N amplitude vector
    fn probabilities_full(&self) -> Vec<f64> {
        let mut out = vec![0.0; 1 << self.n];
        let amp = nd::Array1::from_elem(1, C64::one());
        self.descend(0, amp, 0, &mut out);
        out
    }

    fn descend(
        &self,
        k: usize,
        amp: nd::Array1<C64>,
        idx: usize,
        out: &mut [f64],
    ) {
        for s in 0..2 {
            let g = self.data[k].slice(nd::s![.., s, ..]);
            let mut next = amp.dot(&g);
            if k == self.n - 1 {
                out[idx | (s << k)] = next[0].norm_sqr();
            } else {
                next.iter_mut().zip(&self.svals[k])
                    .for_each(|(a, l)| { *a *= C64::from(*l); });
                self.descend(k + 1, next, idx | (s << k), out);
            }
        }
    }

    // swap-route `qubits` into a contiguous block in operand order on a
    // (cloned) chain; returns the block's first site
    fn gather(&mut self, qubits: &[usize]) -> usize {
        let mut perm: Vec<usize> = (0..self.n).collect();
        let first = qubits.iter().copied().min().unwrap();
        for (i, &q) in qubits.iter().enumerate() {
            let target = first + i;
            let mut cur = perm.iter().position(|&x| x == q).unwrap();
            while cur > target {
                self.swap_adjacent(cur - 1);
                perm.swap(cur - 1, cur);
                cur -= 1;
            }
            while cur < target {
                self.swap_adjacent(cur);
                perm.swap(cur, cur + 1);
                cur += 1;
            }
        }
        first
    }

    // contract the m-site window starting at `first` into ρ, tracing the
    // environment through the Λ²-weighted boundary bonds; canonical form
    // collapses everything else to the identity
    fn contract_density(&self, first: usize, m: usize) -> nd::Array2<C64> {
        let mut t: nd::Array3<C64> = self.data[first].clone();
        for k in first + 1..first + m {
            let (l, dcur, u) = t.dim();
            t.axis_iter_mut(nd::Axis(2)).zip(&self.svals[k - 1])
                .for_each(|(mut tv, lv)| {
                    tv.map_inplace(|x| { *x *= C64::from(*lv); });
                });
            let g = &self.data[k];
            let (gu, _, gr) = g.dim();
            let a = t.into_shape((l * dcur, u)).unwrap();
            let b = g.clone().into_shape((gu, 2 * gr)).unwrap();
            t = a.dot(&b).into_shape((l, dcur * 2, gr)).unwrap();
        }
        let (l, d, r) = t.dim();
        if first > 0 {
            t.axis_iter_mut(nd::Axis(0)).zip(&self.svals[first - 1])
                .for_each(|(mut tv, lv)| {
                    tv.map_inplace(|x| { *x *= C64::from(*lv); });
                });
        }
        if first + m - 1 < self.n - 1 {
            t.axis_iter_mut(nd::Axis(2)).zip(&self.svals[first + m - 1])
                .for_each(|(mut tv, lv)| {
                    tv.map_inplace(|x| { *x *= C64::from(*lv); });
                });
        }
        let a = t.permuted_axes([1, 0, 2]);
        let a = a.as_standard_layout().to_owned()
            .into_shape((d, l * r)).unwrap();
        let ah = a.mapv(|x| x.conj()).reversed_axes();
        let rho = a.dot(&ah);
        // refile into the external bit order: site `first + i` carries bit i
        nd::Array2::from_shape_fn(
            (d, d),
            |(i, j)| rho[[reverse_bits(i, m), reverse_bits(j, m)]],
        )
    }

    /// Compute the reduced density matrix over `qubits`, tracing out the
    /// rest of the register.
    ///
    /// Bit `i` of the row/column index is the value of `qubits[i]`. The
    /// targets are routed together on a cloned chain, so the state is
    /// observably unchanged.
    pub fn density_matrix(&self, qubits: &[usize])
        -> MPSResult<nd::Array2<C64>>
    {
        self.check_qubits(qubits)?;
        let mut work = self.clone();
        let first = work.gather(qubits);
        Ok(work.contract_density(first, qubits.len()))
    }

    /// Evaluate the expectation value of a Pauli string over `qubits` by a
    /// transfer-matrix sweep across the spanned sites.
    ///
    /// The string is read little-endian, i.e. its last character acts on
    /// `qubits[0]`. The result is real within tolerance for a normalized
    /// state.
    pub fn expectation_value_pauli(&self, qubits: &[usize], pauli: &str)
        -> MPSResult<C64>
    {
        self.check_qubits(qubits)?;
        let labels: Vec<char> = pauli.chars().collect();
        if labels.len() != qubits.len() { return Err(PauliIncompatibleShape); }
        let a = *qubits.iter().min().unwrap();
        let b = *qubits.iter().max().unwrap();
        let mut ops: Vec<&'static nd::Array2<C64>>
            = vec![Lazy::force(&gate::IDMAT); b - a + 1];
        for (i, &q) in qubits.iter().enumerate() {
            let c = labels[labels.len() - 1 - i];
            ops[q - a] = gate::pauli_matrix(c).ok_or(MalformedPauli(c))?;
        }

        // left boundary: identity weighted by the Λ² of the entry bond
        let mut e: nd::Array2<C64> = if a == 0 {
            nd::Array2::from_elem((1, 1), C64::one())
        } else {
            nd::Array2::from_diag(
                &self.svals[a - 1].iter()
                    .map(|l| C64::from(l * l))
                    .collect::<nd::Array1<C64>>())
        };
        for k in a..=b {
            let g = &self.data[k];
            let r = g.shape()[2];
            let op = ops[k - a];
            let mut enew: nd::Array2<C64> = nd::Array2::zeros((r, r));
            for s in 0..2 {
                for ss in 0..2 {
                    let o = op[[ss, s]];
                    if o == C64::zero() { continue; }
                    let gs = g.slice(nd::s![.., s, ..]);
                    let gss = g.slice(nd::s![.., ss, ..])
                        .mapv(|x| x.conj());
                    enew = enew + &(gs.t().dot(&e).dot(&gss) * o);
                }
            }
            if k < b {
                let lam = &self.svals[k];
                enew.axis_iter_mut(nd::Axis(0)).zip(lam)
                    .for_each(|(mut row, l)| {
                        row.map_inplace(|x| { *x *= C64::from(*l); });
                    });
                enew.axis_iter_mut(nd::Axis(1)).zip(lam)
                    .for_each(|(mut col, l)| {
                        col.map_inplace(|x| { *x *= C64::from(*l); });
                    });
            }
            e = enew;
        }
        let ev: C64 = if b == self.n - 1 {
            e.diag().iter().copied()
                .fold(C64::zero(), |acc, x| acc + x)
        } else {
            e.diag().iter().zip(&self.svals[b])
                .map(|(x, l)| x * C64::from(l * l))
                .fold(C64::zero(), |acc, x| acc + x)
        };
        Ok(ev)
    }

    /// Evaluate the expectation value of a dense operator over `qubits` as
    /// Tr(ρ_S · M).
    pub fn expectation_value(&self, qubits: &[usize], op: &nd::Array2<C64>)
        -> MPSResult<C64>
    {
        self.check_qubits(qubits)?;
        let dim = 1_usize << qubits.len();
        if op.shape() != [dim, dim] { return Err(OperatorIncompatibleShape); }
        let rho = self.density_matrix(qubits)?;
        let ev = rho.dot(op)
            .diag().iter().copied()
            .fold(C64::zero(), |acc, x| acc + x);
        Ok(ev)
    }

    /// Contract the chain into a dense length-2^N state vector in the
    /// external bit order, with the configured chop applied.
    ///
    /// This is intended for debugging and snapshots of small registers; the
    /// output is exponential in N.
    pub fn full_state_vector(&self) -> Vec<C64> {
        let r0 = self.data[0].shape()[2];
        let mut acc: nd::Array2<C64>
            = self.data[0].clone().into_shape((2, r0)).unwrap();
        for k in 1..self.n {
            acc.axis_iter_mut(nd::Axis(1)).zip(&self.svals[k - 1])
                .for_each(|(mut col, lv)| {
                    col.map_inplace(|x| { *x *= C64::from(*lv); });
                });
            let g = &self.data[k];
            let (u, _, r) = g.dim();
            let rows = acc.shape()[0];
            acc = acc.dot(&g.clone().into_shape((u, 2 * r)).unwrap())
                .into_shape((rows * 2, r)).unwrap();
        }
        let chop = self.cfg.chop_threshold;
        let mut out = vec![C64::zero(); 1 << self.n];
        for (i, x) in acc.iter().enumerate() {
            let re = if x.re.abs() < chop { 0.0 } else { x.re };
            let im = if x.im.abs() < chop { 0.0 } else { x.im };
            out[reverse_bits(i, self.n)] = C64::new(re, im);
        }
        out
    }

    /// Re-initialize from a state vector over the given qubits.
    ///
    /// Only full-register initialization (all qubits, in ascending order)
    /// is supported; anything else fails with
    /// [`PartialInitialization`][MPSError::PartialInitialization].
    pub fn apply_initialize(&mut self, qubits: &[usize], state: &[C64])
        -> MPSResult<()>
    {
        self.check_qubits(qubits)?;
        let full = qubits.len() == self.n
            && qubits.windows(2).all(|w| w[0] < w[1]);
        if !full { return Err(PartialInitialization); }
        *self = Self::from_statevector(self.n, state, self.cfg.clone())?;
        Ok(())
    }

    /// Re-initialize by copying another chain of the same size.
    ///
    /// The receiving state keeps its own configuration. Fails if the qubit
    /// counts differ.
    pub fn initialize_from(&mut self, other: &MPS) -> MPSResult<()> {
        if other.n != self.n {
            return Err(StateIncompatibleShape {
                expected: 1 << self.n,
                found: 1 << other.n,
            });
        }
        self.data = other.data.clone();
        self.svals = other.svals.clone();
        Ok(())
    }
}

// unitarity within tolerance: ‖op†·op − I‖_max
fn check_unitary(op: &nd::Array2<C64>) -> MPSResult<()> {
    let adj = op.mapv(|x| x.conj()).reversed_axes();
    let prod = adj.dot(op);
    let dev = prod.indexed_iter()
        .map(|((i, j), x)| {
            let target
                = if i == j { C64::one() } else { C64::zero() };
            (*x - target).norm()
        })
        .fold(0.0, f64::max);
    if dev > UNITARY_TOLERANCE { Err(NonUnitaryOperator) } else { Ok(()) }
}

impl fmt::Display for MPS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for k in 0..self.n {
            let sh = self.data[k].shape();
            writeln!(f, "Γ[{}] :: {{ <{}>, q{}<{}>, <{}> }}",
                k, sh[0], k, sh[1], sh[2]
            )?;
            writeln!(f, "{}", self.data[k])?;
            if k < self.n - 1 {
                write!(f, "Λ[{}] = [", k)?;
                for (j, lj) in self.svals[k].iter().enumerate() {
                    write!(f, "{}", lj)?;
                    if j < self.svals[k].len() - 1 { write!(f, ", ")?; }
                }
                writeln!(f, "]")?;
            }
        }
        Ok(())
    }
}
