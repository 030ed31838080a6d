//! The recognized gate set: tagged variants, fixed 2×2 and 4×4 unitary
//! constructors, and name parsing for the instruction boundary.
//!
//! Parameterized single-qubit gates follow the standard Qiskit convention,
//! i.e. `u3(θ, φ, λ)` is
//!
//! ```text
//! [ cos(θ/2)            -e^{iλ} sin(θ/2)      ]
//! [ e^{iφ} sin(θ/2)      e^{i(φ+λ)} cos(θ/2)  ]
//! ```
//!
//! Two-qubit matrices are laid out with the first operand qubit as the more
//! significant bit of the 4×4 index, which is also how the two-site update
//! in [`mps`][crate::mps] fuses physical indices.

use std::f64::consts::{ FRAC_1_SQRT_2, FRAC_PI_2, FRAC_PI_4 };
use ndarray as nd;
use num_complex::Complex64 as C64;
use num_traits::{ One, Zero };
use once_cell::sync::Lazy;
use crate::mps::{ MPSError, MPSResult };

/// A gate in a quantum circuit.
///
/// Qubit operands are free indices into the chain; non-adjacent two-qubit
/// gates are routed through nearest-neighbor swaps on application.
#[derive(Clone, Debug, PartialEq)]
pub enum Gate {
    /// Identity; a no-op beyond operand validation.
    Id(usize),
    /// Pauli X.
    X(usize),
    /// Pauli Y.
    Y(usize),
    /// Pauli Z.
    Z(usize),
    /// Hadamard.
    H(usize),
    /// π/2 rotation about Z.
    S(usize),
    /// –π/2 rotation about Z.
    Sdg(usize),
    /// π/4 rotation about Z.
    T(usize),
    /// –π/4 rotation about Z.
    Tdg(usize),
    /// Square root of X.
    Sx(usize),
    /// Phase gate `diag(1, e^{iλ})`; `p`/`u1` in the named set.
    Phase(usize, f64),
    /// Single-X90-pulse gate `u2(φ, λ)`.
    U2(usize, f64, f64),
    /// General single-qubit gate `u3(θ, φ, λ)`.
    U3(usize, f64, f64, f64),
    /// Controlled X; `CX(c, t)` flips `t` when `c` is set.
    CX(usize, usize),
    /// Controlled Z.
    CZ(usize, usize),
    /// Controlled phase `diag(1, 1, 1, e^{iλ})`; `cp`/`cu1` in the named
    /// set.
    CPhase(usize, usize, f64),
    /// Exchange of two qubits.
    Swap(usize, usize),
    /// Toffoli; `CCX(a, b, c)` flips `c` when both `a` and `b` are set.
    CCX(usize, usize, usize),
}

impl Gate {
    /// Resolve a gate from its instruction name, target qubits, and real
    /// parameters.
    ///
    /// The recognized names are `id`, `x`, `y`, `z`, `s`, `sdg`, `h`, `t`,
    /// `tdg`, `sx`, `p`/`u1`, `u2`, `u3`/`u`/`U`, `cx`/`CX`, `cz`,
    /// `cp`/`cu1`, `swap`, and `ccx`. Anything else fails with
    /// [`MPSError::UnknownGate`] naming the offender.
    pub fn from_name(name: &str, qubits: &[usize], params: &[f64])
        -> MPSResult<Self>
    {
        fn operands(
            name: &'static str,
            qubits: &[usize],
            params: &[f64],
            nq: usize,
            np: usize,
        ) -> MPSResult<()>
        {
            if qubits.len() == nq && params.len() == np {
                Ok(())
            } else {
                Err(MPSError::InvalidGateOperands {
                    name, qubits: nq, params: np,
                })
            }
        }

        match name {
            "id" => {
                operands("id", qubits, params, 1, 0)?;
                Ok(Self::Id(qubits[0]))
            },
            "x" => {
                operands("x", qubits, params, 1, 0)?;
                Ok(Self::X(qubits[0]))
            },
            "y" => {
                operands("y", qubits, params, 1, 0)?;
                Ok(Self::Y(qubits[0]))
            },
            "z" => {
                operands("z", qubits, params, 1, 0)?;
                Ok(Self::Z(qubits[0]))
            },
            "s" => {
                operands("s", qubits, params, 1, 0)?;
                Ok(Self::S(qubits[0]))
            },
            "sdg" => {
                operands("sdg", qubits, params, 1, 0)?;
                Ok(Self::Sdg(qubits[0]))
            },
            "h" => {
                operands("h", qubits, params, 1, 0)?;
                Ok(Self::H(qubits[0]))
            },
            "t" => {
                operands("t", qubits, params, 1, 0)?;
                Ok(Self::T(qubits[0]))
            },
            "tdg" => {
                operands("tdg", qubits, params, 1, 0)?;
                Ok(Self::Tdg(qubits[0]))
            },
            "sx" => {
                operands("sx", qubits, params, 1, 0)?;
                Ok(Self::Sx(qubits[0]))
            },
            "p" | "u1" => {
                operands("u1", qubits, params, 1, 1)?;
                Ok(Self::Phase(qubits[0], params[0]))
            },
            "u2" => {
                operands("u2", qubits, params, 1, 2)?;
                Ok(Self::U2(qubits[0], params[0], params[1]))
            },
            "u3" | "u" | "U" => {
                operands("u3", qubits, params, 1, 3)?;
                Ok(Self::U3(qubits[0], params[0], params[1], params[2]))
            },
            "cx" | "CX" => {
                operands("cx", qubits, params, 2, 0)?;
                Ok(Self::CX(qubits[0], qubits[1]))
            },
            "cz" => {
                operands("cz", qubits, params, 2, 0)?;
                Ok(Self::CZ(qubits[0], qubits[1]))
            },
            "cp" | "cu1" => {
                operands("cu1", qubits, params, 2, 1)?;
                Ok(Self::CPhase(qubits[0], qubits[1], params[0]))
            },
            "swap" => {
                operands("swap", qubits, params, 2, 0)?;
                Ok(Self::Swap(qubits[0], qubits[1]))
            },
            "ccx" => {
                operands("ccx", qubits, params, 3, 0)?;
                Ok(Self::CCX(qubits[0], qubits[1], qubits[2]))
            },
            _ => Err(MPSError::UnknownGate(name.to_string())),
        }
    }

    /// Return the target qubits in operand order.
    pub fn qubits(&self) -> Vec<usize> {
        match *self {
            Self::Id(k)
            | Self::X(k)
            | Self::Y(k)
            | Self::Z(k)
            | Self::H(k)
            | Self::S(k)
            | Self::Sdg(k)
            | Self::T(k)
            | Self::Tdg(k)
            | Self::Sx(k)
            | Self::Phase(k, _)
            | Self::U2(k, ..)
            | Self::U3(k, ..) => vec![k],
            Self::CX(a, b)
            | Self::CZ(a, b)
            | Self::CPhase(a, b, _)
            | Self::Swap(a, b) => vec![a, b],
            Self::CCX(a, b, c) => vec![a, b, c],
        }
    }
}

/// Make an X gate.
pub fn make_x() -> nd::Array2<C64> {
    nd::array![
        [C64::zero(), C64::one()],
        [C64::one(), C64::zero()],
    ]
}

/// Lazy-static version of [`make_x`].
pub static XMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_x);

/// Make a Y gate.
pub fn make_y() -> nd::Array2<C64> {
    nd::array![
        [C64::zero(), -C64::i()   ],
        [C64::i(),     C64::zero()],
    ]
}

/// Lazy-static version of [`make_y`].
pub static YMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_y);

/// Make a Z gate.
pub fn make_z() -> nd::Array2<C64> {
    nd::array![
        [C64::one(),  C64::zero()],
        [C64::zero(), -C64::one()],
    ]
}

/// Lazy-static version of [`make_z`].
pub static ZMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_z);

/// Make a Hadamard gate.
pub fn make_h() -> nd::Array2<C64> {
    let h = C64::from(FRAC_1_SQRT_2);
    nd::array![
        [h,  h],
        [h, -h],
    ]
}

/// Lazy-static version of [`make_h`].
pub static HMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_h);

/// Make a square-root-of-X gate.
pub fn make_sx() -> nd::Array2<C64> {
    let p = C64::new(0.5,  0.5);
    let m = C64::new(0.5, -0.5);
    nd::array![
        [p, m],
        [m, p],
    ]
}

/// Lazy-static version of [`make_sx`].
pub static SXMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_sx);

/// Make the 2×2 identity.
pub fn make_id() -> nd::Array2<C64> {
    nd::array![
        [C64::one(), C64::zero()],
        [C64::zero(), C64::one()],
    ]
}

/// Lazy-static version of [`make_id`].
pub static IDMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_id);

/// Make a phase gate `diag(1, e^{iλ})`.
///
/// `S`, `S†`, `T`, `T†`, and `Z` are all fixed-angle phase gates.
pub fn make_phase(lambda: f64) -> nd::Array2<C64> {
    nd::array![
        [C64::one(), C64::zero()  ],
        [C64::zero(), C64::cis(lambda)],
    ]
}

/// Make a `u2(φ, λ)` gate.
pub fn make_u2(phi: f64, lambda: f64) -> nd::Array2<C64> {
    let h = C64::from(FRAC_1_SQRT_2);
    nd::array![
        [h,                 -h * C64::cis(lambda)     ],
        [h * C64::cis(phi),  h * C64::cis(phi + lambda)],
    ]
}

/// Make a `u3(θ, φ, λ)` gate.
pub fn make_u3(theta: f64, phi: f64, lambda: f64) -> nd::Array2<C64> {
    let c = C64::from((theta / 2.0).cos());
    let s = C64::from((theta / 2.0).sin());
    nd::array![
        [c,                 -s * C64::cis(lambda)     ],
        [s * C64::cis(phi),  c * C64::cis(phi + lambda)],
    ]
}

/// Make a CX gate with the control on the first (more significant) index.
pub fn make_cx() -> nd::Array2<C64> {
    let o = C64::one();
    let z = C64::zero();
    nd::array![
        [o, z, z, z],
        [z, o, z, z],
        [z, z, z, o],
        [z, z, o, z],
    ]
}

/// Lazy-static version of [`make_cx`].
pub static CXMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_cx);

/// Make a CZ gate.
pub fn make_cz() -> nd::Array2<C64> {
    let o = C64::one();
    let z = C64::zero();
    nd::array![
        [o, z, z,  z],
        [z, o, z,  z],
        [z, z, o,  z],
        [z, z, z, -o],
    ]
}

/// Lazy-static version of [`make_cz`].
pub static CZMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_cz);

/// Make a controlled-phase gate `diag(1, 1, 1, e^{iλ})`.
pub fn make_cphase(lambda: f64) -> nd::Array2<C64> {
    let o = C64::one();
    let z = C64::zero();
    nd::array![
        [o, z, z, z               ],
        [z, o, z, z               ],
        [z, z, o, z               ],
        [z, z, z, C64::cis(lambda)],
    ]
}

/// Make a SWAP gate.
pub fn make_swap() -> nd::Array2<C64> {
    let o = C64::one();
    let z = C64::zero();
    nd::array![
        [o, z, z, z],
        [z, z, o, z],
        [z, o, z, z],
        [z, z, z, o],
    ]
}

/// Lazy-static version of [`make_swap`].
pub static SWAPMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_swap);

/// Fixed phase-gate angles for the Z-axis Cliffords and T gates.
pub(crate) const PHASE_S: f64 = FRAC_PI_2;
pub(crate) const PHASE_SDG: f64 = -FRAC_PI_2;
pub(crate) const PHASE_T: f64 = FRAC_PI_4;
pub(crate) const PHASE_TDG: f64 = -FRAC_PI_4;

/// Conjugate a two-qubit matrix by SWAP, exchanging the roles of its two
/// operand qubits.
pub fn reverse_qargs(op: &nd::Array2<C64>) -> nd::Array2<C64> {
    let flip = |x: usize| ((x & 1) << 1) | ((x >> 1) & 1);
    nd::Array2::from_shape_fn((4, 4), |(i, j)| op[[flip(i), flip(j)]])
}

/// Look up the 2×2 matrix for a Pauli label.
pub fn pauli_matrix(label: char) -> Option<&'static nd::Array2<C64>> {
    match label {
        'I' => Some(Lazy::force(&IDMAT)),
        'X' => Some(Lazy::force(&XMAT)),
        'Y' => Some(Lazy::force(&YMAT)),
        'Z' => Some(Lazy::force(&ZMAT)),
        _ => None,
    }
}
