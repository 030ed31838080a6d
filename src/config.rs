//! Per-state configuration for truncation, snapshots, parallelism, and
//! sampling.
//!
//! All knobs are fixed at state construction; cloning a state clones its
//! configuration. This replaces the process-global settings of older
//! simulators so that several differently-configured states can coexist in
//! one process.

/// Default absolute floor on retained Schmidt values.
pub const DEFAULT_TRUNCATION_THRESHOLD: f64 = 1e-16;

/// Default threshold below which real/imaginary parts are zeroed in
/// snapshot output.
pub const DEFAULT_CHOP_THRESHOLD: f64 = 1e-8;

/// Default qubit count at which parallel shot sampling engages.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 14;

/// Strategy used by [`sample_measure`][crate::mps::MPS::sample_measure] to
/// draw repeated measurement outcomes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SampleMeasureAlg {
    /// Compute the marginal distribution once and draw all shots from it.
    Prob,
    /// Clone the state and destructively measure it, once per shot.
    Apply,
    /// Choose between the two based on qubit count, maximum bond
    /// dimension, and shot count.
    Heuristic,
}

/// Immutable configuration attached to an [`MPS`][crate::mps::MPS].
#[derive(Clone, Debug, PartialEq)]
pub struct MPSConfig {
    /// Absolute floor on Schmidt values: anything smaller is discarded
    /// after every decomposition.
    pub truncation_threshold: f64,
    /// Hard cap on the number of Schmidt values retained per bond, or
    /// `None` for unbounded.
    pub max_bond_dimension: Option<usize>,
    /// Real/imaginary parts below this are zeroed in snapshot output.
    pub chop_threshold: f64,
    /// Qubit count at which internal parallelism engages.
    pub parallel_threshold: usize,
    /// Number of worker threads available for parallel shot sampling.
    pub worker_threads: usize,
    /// Shot-sampling strategy selection.
    pub sample_measure_algorithm: SampleMeasureAlg,
}

impl Default for MPSConfig {
    fn default() -> Self {
        Self {
            truncation_threshold: DEFAULT_TRUNCATION_THRESHOLD,
            max_bond_dimension: None,
            chop_threshold: DEFAULT_CHOP_THRESHOLD,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            worker_threads: 1,
            sample_measure_algorithm: SampleMeasureAlg::Heuristic,
        }
    }
}

impl MPSConfig {
    /// Alias for [`MPSConfig::default`].
    pub fn new() -> Self { Self::default() }

    /// Set the Schmidt-value truncation threshold.
    pub fn with_truncation_threshold(mut self, threshold: f64) -> Self {
        self.truncation_threshold = threshold.abs();
        self
    }

    /// Cap the number of Schmidt values retained per bond.
    pub fn with_max_bond_dimension(mut self, dim: usize) -> Self {
        self.max_bond_dimension = Some(dim.max(1));
        self
    }

    /// Set the snapshot chop threshold.
    pub fn with_chop_threshold(mut self, threshold: f64) -> Self {
        self.chop_threshold = threshold.abs();
        self
    }

    /// Set the qubit count at which parallel primitives engage.
    pub fn with_parallel_threshold(mut self, num_qubits: usize) -> Self {
        self.parallel_threshold = num_qubits;
        self
    }

    /// Set the number of worker threads for parallel shot sampling.
    pub fn with_worker_threads(mut self, nthreads: usize) -> Self {
        self.worker_threads = nthreads.max(1);
        self
    }

    /// Set the shot-sampling strategy.
    pub fn with_sample_measure_algorithm(mut self, alg: SampleMeasureAlg)
        -> Self
    {
        self.sample_measure_algorithm = alg;
        self
    }
}
