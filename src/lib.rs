//! Simulation of quantum circuits on registers of qubits using matrix
//! product states.
//!
//! The state of the register is stored as a 1D tensor network in a Schmidt
//! decomposition-based canonical form (see [`mps`]), which keeps every
//! bipartition's singular values on hand at all times. Gates, measurements,
//! expectation values, and sampling all act through local contractions
//! whose cost is controlled by the bond dimensions of the chain, which are
//! in turn bounded by the truncation settings in [`config`].
//!
//! # Example
//!
//! ```
//! use rand::{ SeedableRng, rngs::StdRng };
//! use qmps::{ Gate, MPS, MPSConfig };
//!
//! // three-qubit GHZ state
//! let mut mps = MPS::new(3, MPSConfig::default()).unwrap();
//! mps.apply_named_gate("h", &[0], &[]).unwrap();
//! mps.apply_named_gate("cx", &[0, 1], &[]).unwrap();
//! mps.apply_named_gate("cx", &[1, 2], &[]).unwrap();
//!
//! // ⟨XXX⟩ = +1 on the GHZ state
//! let ev = mps.expectation_value_pauli(&[0, 1, 2], "XXX").unwrap();
//! assert!((ev.re - 1.0).abs() < 1e-10);
//!
//! // sampled outcomes are perfectly correlated
//! let mut rng = StdRng::seed_from_u64(17);
//! for shot in mps.sample_measure(&[0, 1, 2], 32, &mut rng).unwrap() {
//!     assert!(shot == vec![0, 0, 0] || shot == vec![1, 1, 1]);
//! }
//!
//! // the state itself is untouched by sampling
//! let gate = Gate::CX(0, 2);
//! mps.apply_gate(&gate).unwrap();
//! ```

mod bond;
pub mod config;
pub mod gate;
pub mod mps;
pub mod pool;
pub mod sampler;

pub use config::{ MPSConfig, SampleMeasureAlg };
pub use gate::Gate;
pub use mps::{ MPS, MPSError, MPSResult };
pub use sampler::SampleStrategy;
