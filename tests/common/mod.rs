//! Shared helpers: a dense state-vector reference to cross-check the chain
//! against.
#![allow(dead_code)]

use ndarray as nd;
use num_complex::Complex64 as C64;

/// Apply a dense m-qubit operator to a full state vector.
///
/// Basis indices are LSB-first (bit `q` is the value of qubit `q`); the
/// first target qubit indexes the most significant bit of the operator,
/// matching the crate's two-qubit matrix convention.
pub fn apply_dense(
    state: &mut [C64],
    qubits: &[usize],
    op: &nd::Array2<C64>,
) {
    let m = qubits.len();
    let dim = 1_usize << m;
    let mut new = vec![C64::from(0.0); state.len()];
    for (b, nb) in new.iter_mut().enumerate() {
        let mut row = 0_usize;
        for (i, &q) in qubits.iter().enumerate() {
            row |= ((b >> q) & 1) << (m - 1 - i);
        }
        for col in 0..dim {
            let o = op[[row, col]];
            if o == C64::from(0.0) { continue; }
            let mut src = b;
            for (i, &q) in qubits.iter().enumerate() {
                let bit = (col >> (m - 1 - i)) & 1;
                src = (src & !(1 << q)) | (bit << q);
            }
            *nb += o * state[src];
        }
    }
    state.copy_from_slice(&new);
}

/// The computational basis state |index⟩ over `n` qubits.
pub fn basis_state(n: usize, index: usize) -> Vec<C64> {
    let mut v = vec![C64::from(0.0); 1 << n];
    v[index] = C64::from(1.0);
    v
}

/// Assert two state vectors agree component-wise.
pub fn assert_states_close(a: &[C64], b: &[C64], tol: f64) {
    assert_eq!(a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!(
            (x - y).norm() < tol,
            "state vectors differ at component {i}: {x} vs {y}",
        );
    }
}

/// Kronecker product of two square operators, first factor most
/// significant.
pub fn kron(a: &nd::Array2<C64>, b: &nd::Array2<C64>) -> nd::Array2<C64> {
    let (ar, ac) = (a.shape()[0], a.shape()[1]);
    let (br, bc) = (b.shape()[0], b.shape()[1]);
    nd::Array2::from_shape_fn(
        (ar * br, ac * bc),
        |(i, j)| a[[i / br, j / bc]] * b[[i % br, j % bc]],
    )
}
