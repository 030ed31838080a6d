//! Strategies for drawing repeated measurement outcomes from a fixed state.
//!
//! Two strategies exist with very different cost profiles. The marginal
//! strategy computes the full distribution over the target subset once and
//! then draws shots from it; its cost is exponential in the subset size but
//! independent of the shot count. The clone-and-measure strategy clones the
//! chain and destructively measures it, once per shot; its cost is linear
//! in the shot count but polynomial in the bond dimension. The heuristic
//! selector picks between them from the subset size, the largest bond
//! dimension, and the shot count, with crossover constants found by
//! experimentation on the reference implementation.

use log::debug;
use rand::Rng;
use crate::{
    config::SampleMeasureAlg,
    mps::{ MPS, MPSResult },
    pool::{ PoolError, SamplerPool },
};

/// A resolved sampling strategy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SampleStrategy {
    /// Draw all shots from the marginal distribution.
    Prob,
    /// Clone the chain and destructively measure it, once per shot.
    Apply,
}

/// Resolve the strategy for a sampling job.
///
/// Deterministic in its inputs: the configured policy, the number of
/// measured qubits, the largest bond dimension, and the shot count.
pub fn select_strategy(
    alg: SampleMeasureAlg,
    num_qubits: usize,
    max_bond: usize,
    shots: usize,
) -> SampleStrategy
{
    match alg {
        SampleMeasureAlg::Prob => SampleStrategy::Prob,
        SampleMeasureAlg::Apply => SampleStrategy::Apply,
        SampleMeasureAlg::Heuristic => {
            if num_qubits >= 26 { return SampleStrategy::Apply; }
            if num_qubits < 10 { return SampleStrategy::Prob; }
            let nq = num_qubits as f64 - 10.0;
            let crossover: Option<f64> = match max_bond {
                0..=2 => Some(12.0 * 1.85_f64.powf(nq)),
                3..=4 => Some(3.0 * 1.75_f64.powf(nq)),
                5..=8 => Some(2.5 * 1.65_f64.powf(nq)),
                9..=16 => Some(0.5 * 1.75_f64.powf(nq)),
                _ => None,
            };
            match crossover {
                Some(c) if (shots as f64) < c => SampleStrategy::Apply,
                _ => SampleStrategy::Prob,
            }
        },
    }
}

impl MPS {
    /// Draw `shots` measurement outcomes over `qubits` without mutating the
    /// state.
    ///
    /// The strategy is chosen per the configured policy; see
    /// [`select_strategy`]. Each outcome aligns bit `i` with `qubits[i]`.
    pub fn sample_measure<R>(
        &self,
        qubits: &[usize],
        shots: usize,
        rng: &mut R,
    ) -> MPSResult<Vec<Vec<u8>>>
    where R: Rng + ?Sized
    {
        let strategy = select_strategy(
            self.config().sample_measure_algorithm,
            qubits.len(),
            self.max_bond_dimension(),
            shots,
        );
        debug!(
            "sample_measure: {} shot(s) on {} qubit(s) via {:?}",
            shots, qubits.len(), strategy,
        );
        match strategy {
            SampleStrategy::Prob => {
                self.sample_measure_using_probabilities(qubits, shots, rng)
            },
            SampleStrategy::Apply => {
                self.sample_measure_using_apply_measure(qubits, shots, rng)
            },
        }
    }

    /// Compute the marginal distribution over `qubits` once and draw
    /// `shots` independent outcomes from it.
    pub fn sample_measure_using_probabilities<R>(
        &self,
        qubits: &[usize],
        shots: usize,
        rng: &mut R,
    ) -> MPSResult<Vec<Vec<u8>>>
    where R: Rng + ?Sized
    {
        let probs = self.probabilities(qubits)?;
        let mut acc = 0.0;
        let cumulative: Vec<f64>
            = probs.iter().map(|p| { acc += *p; acc }).collect();
        let m = qubits.len();
        let mut all_samples: Vec<Vec<u8>> = Vec::with_capacity(shots);
        for _ in 0..shots {
            let r: f64 = rng.gen();
            let idx = cumulative.partition_point(|c| *c <= r)
                .min(probs.len() - 1);
            all_samples.push(
                (0..m).map(|i| ((idx >> i) & 1) as u8).collect());
        }
        Ok(all_samples)
    }

    /// Clone the chain and destructively measure it, once per shot.
    ///
    /// When the configuration allows more than one worker thread and the
    /// register is at least `parallel_threshold` qubits, shots are spread
    /// over a [`SamplerPool`] (seeded from `rng`, so results stay
    /// deterministic for a given generator); outcomes then arrive in
    /// completion order rather than submission order.
    pub fn sample_measure_using_apply_measure<R>(
        &self,
        qubits: &[usize],
        shots: usize,
        rng: &mut R,
    ) -> MPSResult<Vec<Vec<u8>>>
    where R: Rng + ?Sized
    {
        let cfg = self.config();
        if cfg.worker_threads > 1
            && shots > 1
            && self.n() >= cfg.parallel_threshold
        {
            let pool = SamplerPool::new(cfg.worker_threads.min(shots));
            let jobs: Vec<(MPS, Vec<usize>, u64)>
                = (0..shots)
                .map(|_| (self.clone(), qubits.to_vec(), rng.gen::<u64>()))
                .collect();
            return match pool.do_shots(jobs) {
                Ok(all_samples) => Ok(all_samples),
                Err(PoolError::WorkerFailure(err)) => Err(err),
                Err(err) => panic!("sampler pool failure: {err}"),
            };
        }
        let mut all_samples: Vec<Vec<u8>> = Vec::with_capacity(shots);
        for _ in 0..shots {
            let mut temp = self.clone();
            all_samples.push(temp.measure(qubits, rng)?);
        }
        Ok(all_samples)
    }
}
