//! Simple thread pool for processing batches of destructive measurement
//! shots.

use std::thread;
use crossbeam::channel;
use rand::{ SeedableRng, rngs::StdRng };
use thiserror::Error;
use crate::mps::{ MPS, MPSError, MPSResult };

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to enqueue shots: dead thread")]
    DeadThread,

    #[error("failed to enqueue shots: closed sender channel")]
    ClosedSenderChannel,

    #[error("failed to receive shot result: receiver error: {0}")]
    ClosedReceiverChannel(channel::RecvError),

    #[error("encountered receiver error from within a thread: receiver error: {0}")]
    WorkerReceiverError(channel::RecvError),

    #[error("measurement failed in worker: {0}")]
    WorkerFailure(MPSError),
}
use PoolError::*;
pub type PoolResult<T> = Result<T, PoolError>;

#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
enum ToWorker {
    Stop,
    Work(MPS, Vec<usize>, u64),
}

#[derive(Debug)]
enum FromWorker {
    RecvError(channel::RecvError),
    Output(MPSResult<Vec<u8>>),
}

/// A simple thread pool to run clone-and-measure shots in parallel.
///
/// Workload between threads is automatically balanced by means of a
/// single-producer, multiple-consumer channel. Each job carries its own
/// (already cloned) chain and an RNG seed, so workers are independent and
/// the source state is never touched. Outcomes are returned in the order in
/// which the measurements finished. The pool as a whole is meant to be
/// reused between batches of shots, and is **not** thread-safe.
#[derive(Debug)]
pub struct SamplerPool {
    threads: Vec<thread::JoinHandle<()>>,
    workers_in: channel::Sender<ToWorker>,
    workers_out: channel::Receiver<FromWorker>,
}

impl SamplerPool {
    /// Create a new thread pool of `nthreads` threads.
    pub fn new(nthreads: usize) -> Self {
        let (tx_in, rx_in) = channel::unbounded();
        let (tx_out, rx_out) = channel::unbounded();
        let mut threads = Vec::with_capacity(nthreads);
        for _ in 0..nthreads {
            let worker_receiver: channel::Receiver<ToWorker> = rx_in.clone();
            let worker_sender = tx_out.clone();
            let th = thread::spawn(move || loop {
                match worker_receiver.recv() {
                    Ok(ToWorker::Stop) => { break; },
                    Ok(ToWorker::Work(mut mps, qubits, seed)) => {
                        let mut rng = StdRng::seed_from_u64(seed);
                        let outcome = mps.measure(&qubits, &mut rng);
                        match worker_sender.send(FromWorker::Output(outcome)) {
                            Ok(()) => { continue; },
                            Err(err) => { panic!("sender error: {err}"); },
                        }
                    },
                    Err(err) => {
                        match worker_sender.send(FromWorker::RecvError(err)) {
                            Ok(()) => { panic!("receiver error"); },
                            Err(_) => { panic!("sender error: {err}"); },
                        }
                    },
                }
            });
            threads.push(th);
        }
        Self { threads, workers_in: tx_in, workers_out: rx_out }
    }

    /// Create a new thread pool with the number of threads equal to the
    /// number of logical CPU cores available in the current system.
    pub fn new_cpus() -> Self { Self::new(num_cpus::get()) }

    /// Enqueue a batch of shots to be distributed across all threads.
    ///
    /// Each job is a cloned chain, its target qubits, and an RNG seed. This
    /// method blocks until every enqueued shot has completed; outcomes come
    /// back in completion order.
    pub fn do_shots<I>(&self, jobs: I) -> PoolResult<Vec<Vec<u8>>>
    where I: IntoIterator<Item = (MPS, Vec<usize>, u64)>
    {
        if self.threads.iter().any(|th| th.is_finished()) {
            return Err(DeadThread);
        }
        let mut count: usize = 0;
        for (mps, qubits, seed) in jobs.into_iter() {
            match self.workers_in.send(ToWorker::Work(mps, qubits, seed)) {
                Ok(()) => { count += 1; },
                Err(_) => { return Err(ClosedSenderChannel); },
            }
        }
        let mut output = Vec::with_capacity(count);
        for _ in 0..count {
            match self.workers_out.recv() {
                Ok(FromWorker::Output(Ok(outcome))) => {
                    output.push(outcome);
                },
                Ok(FromWorker::Output(Err(err))) => {
                    return Err(WorkerFailure(err));
                },
                Ok(FromWorker::RecvError(err)) => {
                    return Err(WorkerReceiverError(err));
                },
                Err(err) => { return Err(ClosedReceiverChannel(err)); },
            }
        }
        Ok(output)
    }
}

impl Drop for SamplerPool {
    fn drop(&mut self) {
        (0..self.threads.len())
            .for_each(|_| { self.workers_in.send(ToWorker::Stop).ok(); });
        self.threads.drain(..)
            .for_each(|th| { th.join().ok(); });
    }
}
