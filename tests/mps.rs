//! Invariants, round-trips, measurement, and reduction scenarios.

mod common;

use approx::assert_abs_diff_eq;
use ndarray as nd;
use num_complex::Complex64 as C64;
use rand::{ Rng, SeedableRng, rngs::StdRng };
use qmps::{ Gate, MPS, MPSConfig, MPSError, gate };

fn exact() -> MPSConfig {
    MPSConfig::default().with_chop_threshold(0.0)
}

// h, cx, u3, ccx layers over `n` qubits with seeded parameters
fn random_circuit(mps: &mut MPS, n: usize, layers: usize, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..layers {
        for q in 0..n {
            let theta: f64 = rng.gen::<f64>() * std::f64::consts::TAU;
            let phi: f64 = rng.gen::<f64>() * std::f64::consts::TAU;
            let lambda: f64 = rng.gen::<f64>() * std::f64::consts::TAU;
            mps.apply_gate(&Gate::U3(q, theta, phi, lambda)).unwrap();
        }
        for q in 0..n - 1 {
            let t = rng.gen_range(0..n);
            if t != q { mps.apply_gate(&Gate::CX(q, t)).unwrap(); }
        }
    }
}

#[test]
fn bell_state_probabilities() {
    let mut mps = MPS::new(2, exact()).unwrap();
    mps.apply_gate(&Gate::H(0)).unwrap();
    mps.apply_gate(&Gate::CX(0, 1)).unwrap();
    let probs = mps.probabilities(&[0, 1]).unwrap();
    assert_abs_diff_eq!(probs[0], 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(probs[1], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(probs[2], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(probs[3], 0.5, epsilon = 1e-12);
}

#[test]
fn ghz_pauli_expectation_values() {
    let mut mps = MPS::new(3, exact()).unwrap();
    mps.apply_gate(&Gate::H(0)).unwrap();
    mps.apply_gate(&Gate::CX(0, 1)).unwrap();
    mps.apply_gate(&Gate::CX(1, 2)).unwrap();
    let zzz = mps.expectation_value_pauli(&[0, 1, 2], "ZZZ").unwrap();
    assert_abs_diff_eq!(zzz.re, 0.0, epsilon = 1e-10);
    assert_abs_diff_eq!(zzz.im, 0.0, epsilon = 1e-10);
    let xxx = mps.expectation_value_pauli(&[0, 1, 2], "XXX").unwrap();
    assert_abs_diff_eq!(xxx.re, 1.0, epsilon = 1e-10);
    assert_abs_diff_eq!(xxx.im, 0.0, epsilon = 1e-10);
    let zz = mps.expectation_value_pauli(&[0, 1], "ZZ").unwrap();
    assert_abs_diff_eq!(zz.re, 1.0, epsilon = 1e-10);
    // identity padding on an unordered, gapped subset
    let zz = mps.expectation_value_pauli(&[2, 0], "ZZ").unwrap();
    assert_abs_diff_eq!(zz.re, 1.0, epsilon = 1e-10);
}

#[test]
fn nonlocal_cx_marginals_and_bond_dimensions() {
    let mut mps = MPS::new(5, exact()).unwrap();
    mps.apply_gate(&Gate::H(2)).unwrap();
    mps.apply_gate(&Gate::CX(2, 4)).unwrap();
    let probs = mps.probabilities(&[4]).unwrap();
    assert_abs_diff_eq!(probs[0], 0.5, epsilon = 1e-10);
    assert_abs_diff_eq!(probs[1], 0.5, epsilon = 1e-10);
    assert_eq!(mps.bond_dimensions(), vec![1, 1, 2, 2]);
    // (|00000⟩ + |00101⟩)/√2 in qubit bits, i.e. indices 0 and 20
    let full = mps.probabilities(&[0, 1, 2, 3, 4]).unwrap();
    for (i, p) in full.iter().enumerate() {
        let want = if i == 0 || i == 0b10100 { 0.5 } else { 0.0 };
        assert_abs_diff_eq!(*p, want, epsilon = 1e-10);
    }
}

#[test]
fn statevector_round_trip() {
    let mut rng = StdRng::seed_from_u64(31);
    let n = 5;
    let raw: Vec<C64> = (0..1 << n)
        .map(|_| C64::new(
            rng.gen::<f64>() * 2.0 - 1.0,
            rng.gen::<f64>() * 2.0 - 1.0,
        ))
        .collect();
    let norm = raw.iter().map(|a| a.norm_sqr()).sum::<f64>().sqrt();
    let normalized: Vec<C64>
        = raw.iter().map(|a| a / C64::from(norm)).collect();
    let mps = MPS::from_statevector(n, &raw, exact()).unwrap();
    common::assert_states_close(
        &mps.full_state_vector(), &normalized, 1e-10);
    // factoring an exact product of SVDs keeps every bond within its
    // structural bound
    for (k, d) in mps.bond_dimensions().into_iter().enumerate() {
        let bound = 1 << (k + 1).min(n - k - 1);
        assert!(d <= bound);
    }
}

#[test]
fn canonical_invariants_hold_after_random_circuits() {
    let n = 6;
    let mut mps = MPS::new(n, exact()).unwrap();
    random_circuit(&mut mps, n, 3, 40);

    // Σλ² = 1 on every bond
    for b in 0..n - 1 {
        let s = mps.schmidt_values(b).unwrap();
        let sumsq: f64 = s.iter().map(|x| x * x).sum();
        assert_abs_diff_eq!(sumsq, 1.0, epsilon = 1e-9);
    }
    assert_abs_diff_eq!(mps.norm(), 1.0, epsilon = 1e-9);

    // marginals sum to 1 on assorted subsets
    for qubits in [vec![0], vec![3, 1], vec![0, 1, 2, 3, 4, 5]] {
        let probs = mps.probabilities(&qubits).unwrap();
        let total: f64 = probs.iter().sum();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-9);
    }

    // reduced density matrices are Hermitian with unit trace
    let rho = mps.density_matrix(&[1, 4]).unwrap();
    let tr: C64 = rho.diag().iter().sum();
    assert_abs_diff_eq!(tr.re, 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(tr.im, 0.0, epsilon = 1e-9);
    for i in 0..4 {
        assert!(rho[[i, i]].re > -1e-10);
        for j in 0..4 {
            assert!((rho[[i, j]] - rho[[j, i]].conj()).norm() < 1e-9);
        }
    }
}

#[test]
fn full_state_reconstruction_matches_dense_simulation() {
    let n = 4;
    let mut mps = MPS::new(n, exact()).unwrap();
    let mut want = common::basis_state(n, 0);
    let mut rng = StdRng::seed_from_u64(8);
    for layer in 0..3 {
        for q in 0..n {
            let th: f64 = rng.gen::<f64>() * std::f64::consts::TAU;
            mps.apply_gate(&Gate::U3(q, th, 0.3, 1.2)).unwrap();
            common::apply_dense(
                &mut want, &[q], &gate::make_u3(th, 0.3, 1.2));
        }
        let (a, b) = [(0, 2), (3, 1), (1, 2)][layer];
        mps.apply_gate(&Gate::CX(a, b)).unwrap();
        common::apply_dense(&mut want, &[a, b], &gate::make_cx());
    }
    common::assert_states_close(&mps.full_state_vector(), &want, 1e-9);
}

#[test]
fn bond_cap_is_enforced() {
    let n = 6;
    let cfg = exact().with_max_bond_dimension(2);
    let mut mps = MPS::new(n, cfg).unwrap();
    random_circuit(&mut mps, n, 4, 91);
    assert!(mps.bond_dimensions().into_iter().all(|d| d <= 2));
    // truncation keeps the state normalized
    let probs = mps.probabilities(&(0..n).collect::<Vec<_>>()).unwrap();
    let total: f64 = probs.iter().sum();
    assert_abs_diff_eq!(total, 1.0, epsilon = 1e-9);
}

#[test]
fn measurement_collapses_and_is_repeatable() {
    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..20 {
        let mut mps = MPS::new(2, exact()).unwrap();
        mps.apply_gate(&Gate::H(0)).unwrap();
        mps.apply_gate(&Gate::CX(0, 1)).unwrap();
        let outcome = mps.measure(&[0, 1], &mut rng).unwrap();
        assert_eq!(outcome[0], outcome[1]);
        // the post-measurement state is the observed basis state
        let idx = outcome[0] as usize | ((outcome[1] as usize) << 1);
        let probs = mps.probabilities(&[0, 1]).unwrap();
        for (i, p) in probs.iter().enumerate() {
            let want = if i == idx { 1.0 } else { 0.0 };
            assert_abs_diff_eq!(*p, want, epsilon = 1e-9);
        }
        // measuring again reproduces the outcome
        let again = mps.measure(&[0, 1], &mut rng).unwrap();
        assert_eq!(again, outcome);
    }
}

#[test]
fn measuring_one_ghz_qubit_collapses_the_far_end() {
    // after measuring qubit 0, the marginal on qubit 2 must already be
    // deterministic; this exercises re-canonicalization of every bond, not
    // just the measured qubit's neighbors
    let mut rng = StdRng::seed_from_u64(13);
    for _ in 0..10 {
        let mut mps = MPS::new(3, exact()).unwrap();
        mps.apply_gate(&Gate::H(0)).unwrap();
        mps.apply_gate(&Gate::CX(0, 1)).unwrap();
        mps.apply_gate(&Gate::CX(1, 2)).unwrap();
        let outcome = mps.measure(&[0], &mut rng).unwrap()[0] as usize;
        let far = mps.probabilities(&[2]).unwrap();
        assert_abs_diff_eq!(far[outcome], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(far[1 - outcome], 0.0, epsilon = 1e-9);
        // every bond spectrum has collapsed to rank 1
        for b in 0..2 {
            let s = mps.schmidt_values(b).unwrap();
            assert_eq!(s.len(), 1);
            assert_abs_diff_eq!(s[0], 1.0, epsilon = 1e-9);
        }
        let check = mps.measure(&[2], &mut rng).unwrap();
        assert_eq!(check[0] as usize, outcome);
    }
}

#[test]
fn measurement_outcomes_follow_operand_order() {
    let mut rng = StdRng::seed_from_u64(77);
    let mut mps = MPS::new(3, exact()).unwrap();
    mps.apply_gate(&Gate::X(2)).unwrap();
    let outcome = mps.measure(&[2, 0], &mut rng).unwrap();
    assert_eq!(outcome, vec![1, 0]);
}

#[test]
fn reset_returns_qubits_to_zero() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..10 {
        let mut mps = MPS::new(3, exact()).unwrap();
        mps.apply_gate(&Gate::H(0)).unwrap();
        mps.apply_gate(&Gate::CX(0, 2)).unwrap();
        mps.apply_gate(&Gate::X(1)).unwrap();
        mps.reset(&[0, 1], &mut rng).unwrap();
        let probs = mps.probabilities(&[0, 1]).unwrap();
        assert_abs_diff_eq!(probs[0], 1.0, epsilon = 1e-9);
    }
}

#[test]
fn marginals_respect_operand_order() {
    let mut mps = MPS::new(2, exact()).unwrap();
    mps.apply_gate(&Gate::X(0)).unwrap();
    // bit 0 of the result indexes qubits[0]
    let probs = mps.probabilities(&[1, 0]).unwrap();
    assert_abs_diff_eq!(probs[2], 1.0, epsilon = 1e-12);
}

#[test]
fn expectation_value_of_a_dense_operator() {
    let mut mps = MPS::new(2, exact()).unwrap();
    mps.apply_gate(&Gate::H(0)).unwrap();
    mps.apply_gate(&Gate::CX(0, 1)).unwrap();
    let zz = common::kron(&gate::make_z(), &gate::make_z());
    let ev = mps.expectation_value(&[0, 1], &zz).unwrap();
    assert_abs_diff_eq!(ev.re, 1.0, epsilon = 1e-10);
    let xx = common::kron(&gate::make_x(), &gate::make_x());
    let ev = mps.expectation_value(&[0, 1], &xx).unwrap();
    assert_abs_diff_eq!(ev.re, 1.0, epsilon = 1e-10);
}

#[test]
fn bell_bond_entropy_is_ln_two() {
    let mut mps = MPS::new(2, exact()).unwrap();
    mps.apply_gate(&Gate::H(0)).unwrap();
    mps.apply_gate(&Gate::CX(0, 1)).unwrap();
    let s = mps.entropy_vn(0).unwrap();
    assert_abs_diff_eq!(s, std::f64::consts::LN_2, epsilon = 1e-10);
    assert!(mps.entropy_vn(1).is_none());
}

#[test]
fn full_copy_initialization() {
    let mut source = MPS::new(3, exact()).unwrap();
    source.apply_gate(&Gate::H(0)).unwrap();
    source.apply_gate(&Gate::CX(0, 2)).unwrap();
    let mut dest = MPS::new(3, exact()).unwrap();
    dest.initialize_from(&source).unwrap();
    common::assert_states_close(
        &dest.full_state_vector(), &source.full_state_vector(), 1e-12);

    let small = MPS::new(2, exact()).unwrap();
    assert!(matches!(
        dest.initialize_from(&small),
        Err(MPSError::StateIncompatibleShape { .. }),
    ));
}

#[test]
fn precondition_violations_are_reported() {
    let mut mps = MPS::new(3, exact()).unwrap();

    assert!(matches!(
        mps.apply_named_gate("bogus", &[0], &[]),
        Err(MPSError::UnknownGate(name)) if name == "bogus",
    ));
    assert!(matches!(
        mps.apply_named_gate("cx", &[0], &[]),
        Err(MPSError::InvalidGateOperands { .. }),
    ));
    assert!(matches!(
        mps.apply_gate(&Gate::H(7)),
        Err(MPSError::QubitOutOfBounds { qubit: 7, num_qubits: 3 }),
    ));
    assert!(matches!(
        mps.apply_gate(&Gate::CX(1, 1)),
        Err(MPSError::DuplicateQubit(1)),
    ));
    assert!(matches!(
        MPS::from_statevector(2, &common::basis_state(3, 0), exact()),
        Err(MPSError::StateIncompatibleShape { expected: 4, found: 8 }),
    ));
    assert!(matches!(
        MPS::new(0, exact()),
        Err(MPSError::EmptySystem),
    ));

    // dense operators beyond two qubits are rejected
    let big = nd::Array2::<C64>::eye(8);
    assert!(matches!(
        mps.apply_matrix(&[0, 1, 2], &big),
        Err(MPSError::UnsupportedOperator(3)),
    ));

    // non-unitary dense operators are rejected
    let skew = nd::array![
        [C64::from(1.0), C64::from(1.0)],
        [C64::from(0.0), C64::from(1.0)],
    ];
    assert!(matches!(
        mps.apply_matrix(&[0], &skew),
        Err(MPSError::NonUnitaryOperator),
    ));

    // partial initialization is unsupported
    assert!(matches!(
        mps.apply_initialize(&[0, 1], &common::basis_state(2, 0)),
        Err(MPSError::PartialInitialization),
    ));
    // full-register initialization works
    mps.apply_initialize(&[0, 1, 2], &common::basis_state(3, 5)).unwrap();
    let probs = mps.probabilities(&[0, 1, 2]).unwrap();
    assert_abs_diff_eq!(probs[5], 1.0, epsilon = 1e-12);

    // malformed Pauli strings name the offending label
    assert!(matches!(
        mps.expectation_value_pauli(&[0, 1], "XQ"),
        Err(MPSError::MalformedPauli('Q')),
    ));
    assert!(matches!(
        mps.expectation_value_pauli(&[0, 1], "X"),
        Err(MPSError::PauliIncompatibleShape),
    ));
}
