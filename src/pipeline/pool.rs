//! Run a chunk operation over many positions.
//!
//! # Failure policy
//!
//! The first error reported by any position is kept and
//! returned from [`PoolProcessor::wait_for_completion`].
//! Once an error is recorded no further position is started;
//! positions already running are allowed to finish. Chunks
//! written before the failure are not rolled back. A panic
//! inside an operation is caught and recorded as an error.

use super::ChunkOperation;
use crate::chunking::ChunkPosition;
use crate::context::LogContext;
use crate::{verbose, Error, Result};
use anyhow::{anyhow, bail};
use rayon::prelude::*;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};

/// How the positions of a run are executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Execution {
    /// One at a time on the calling thread.
    Serial,
    /// On a pool of at most this many threads, further
    /// limited to the number of processors.
    Parallel(usize),
}

impl Execution {
    /// The mode selected by the usual command-line flags:
    /// serial wins over a thread count, and no thread count
    /// means one thread per processor.
    pub fn from_flags(serial: bool, threads: Option<usize>) -> Self {
        if serial {
            Execution::Serial
        } else {
            Execution::Parallel(threads.unwrap_or_else(available_processors))
        }
    }

    /// Number of worker threads actually used.
    pub fn workers(self) -> usize {
        match self {
            Execution::Serial => 1,
            Execution::Parallel(n) => n.min(available_processors()).max(1),
        }
    }
}

fn available_processors() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolState {
    Idle,
    Initialized,
    Running,
    Completed,
}

pub type ProgressFn = dyn Fn(&ChunkPosition) + Send + Sync;

/// Makes the progress hook of one run from a label and the
/// number of positions.
pub type ProgressFactory = dyn Fn(&str, usize) -> Option<Box<ProgressFn>>;

/// State shared between the processor and its workers.
struct Shared {
    operation: Arc<dyn ChunkOperation>,
    progress: Option<Box<ProgressFn>>,
    processed: AtomicUsize,
    failed: AtomicBool,
    first_error: Mutex<Option<Error>>,
}

impl Shared {
    fn run_one(&self, pos: &ChunkPosition) {
        if self.failed.load(Ordering::Acquire) {
            return;
        }
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.operation.perform(pos)))
            .unwrap_or_else(|payload| Err(panic_error(pos, payload)));
        match result {
            Ok(()) => {
                self.processed.fetch_add(1, Ordering::AcqRel);
                if let Some(progress) = &self.progress {
                    progress(pos);
                }
            }
            Err(e) => self.record_error(e),
        }
    }

    fn record_error(&self, e: Error) {
        tracing::debug!("chunk operation failed: {:#}", e);
        if let Ok(mut slot) = self.first_error.lock() {
            if slot.is_none() {
                *slot = Some(e);
            }
        }
        self.failed.store(true, Ordering::Release);
    }

    fn take_error(&self) -> Option<Error> {
        match self.first_error.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => Some(anyhow!("error slot poisoned")),
        }
    }
}

/// A panic in a chunk operation fails the run like an error.
fn panic_error(pos: &ChunkPosition, payload: Box<dyn Any + Send>) -> Error {
    let msg = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".into());
    anyhow!("chunk operation at {:?} panicked: {}", pos.start, msg)
}

/// Executes a [`ChunkOperation`] over a list of positions.
///
/// The processor moves through [`PoolState`]s: `init` binds
/// the positions and operation, `start` launches the work and
/// `wait_for_completion` blocks until every position is done
/// or the run has failed. In serial mode `start` does all the
/// work on the calling thread and no pool is created.
pub struct PoolProcessor {
    execution: Execution,
    state: PoolState,
    positions: Vec<ChunkPosition>,
    progress: Option<Box<ProgressFn>>,
    shared: Option<Arc<Shared>>,
    pool: Option<rayon::ThreadPool>,
    done: Option<Receiver<()>>,
}

impl PoolProcessor {
    pub fn new(execution: Execution) -> Self {
        PoolProcessor {
            execution,
            state: PoolState::Idle,
            positions: vec![],
            progress: None,
            shared: None,
            pool: None,
            done: None,
        }
    }

    pub fn serial() -> Self {
        PoolProcessor::new(Execution::Serial)
    }

    pub fn parallel(threads: usize) -> Self {
        PoolProcessor::new(Execution::Parallel(threads))
    }

    /// Call `hook` after each successfully processed
    /// position, from whichever thread processed it.
    pub fn with_progress<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ChunkPosition) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(hook));
        self
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn execution(&self) -> Execution {
        self.execution
    }

    /// Number of positions processed successfully so far.
    pub fn processed(&self) -> usize {
        self.shared
            .as_ref()
            .map(|s| s.processed.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    pub fn init(&mut self, positions: Vec<ChunkPosition>, operation: Arc<dyn ChunkOperation>) -> Result<()> {
        if self.state != PoolState::Idle {
            bail!("pool processor initialized twice");
        }
        self.positions = positions;
        self.shared = Some(Arc::new(Shared {
            operation,
            progress: self.progress.take(),
            processed: AtomicUsize::new(0),
            failed: AtomicBool::new(false),
            first_error: Mutex::new(None),
        }));
        self.state = PoolState::Initialized;
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        let shared = match (self.state, &self.shared) {
            (PoolState::Initialized, Some(shared)) => shared.clone(),
            _ => bail!("pool processor started before init"),
        };
        let positions = std::mem::take(&mut self.positions);
        self.state = PoolState::Running;

        match self.execution {
            Execution::Serial => {
                for pos in &positions {
                    shared.run_one(pos);
                    if shared.failed.load(Ordering::Acquire) {
                        break;
                    }
                }
                self.state = PoolState::Completed;
            }
            Execution::Parallel(_) => {
                let workers = self.execution.workers();
                tracing::debug!("dispatching {} positions on {} threads", positions.len(), workers);
                let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
                let (tx, rx) = channel();
                pool.spawn(move || {
                    positions.par_iter().for_each(|pos| shared.run_one(pos));
                    drop(shared);
                    let _ = tx.send(());
                });
                self.pool = Some(pool);
                self.done = Some(rx);
            }
        }
        Ok(())
    }

    /// Block until every position is processed or the run
    /// failed, and report the first failure.
    pub fn wait_for_completion(&mut self) -> Result<()> {
        match self.state {
            PoolState::Running => {
                if let Some(done) = self.done.take() {
                    done.recv()
                        .map_err(|_| anyhow!("worker pool terminated abnormally"))?;
                }
                self.pool = None;
                self.state = PoolState::Completed;
            }
            PoolState::Completed => {}
            _ => bail!("pool processor waited on before start"),
        }
        match self.shared.as_ref().and_then(|s| s.take_error()) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Run an operation over all positions and wait for it.
pub fn run_operation(
    ctx: &LogContext,
    operation: Arc<dyn ChunkOperation>,
    positions: Vec<ChunkPosition>,
    execution: Execution,
    progress: Option<Box<ProgressFn>>,
) -> Result<usize> {
    let total = positions.len();
    match execution {
        Execution::Serial => verbose!(ctx, "processing {} chunks serially", total),
        _ => verbose!(ctx, "processing {} chunks with {} threads", total, execution.workers()),
    }

    let mut proc = PoolProcessor::new(execution);
    proc.progress = progress;
    proc.init(positions, operation)?;
    proc.start()?;
    proc.wait_for_completion()?;
    Ok(proc.processed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkingScheme;
    use std::collections::HashSet;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<HashSet<ChunkPosition>>,
        fail_at: Option<[usize; 2]>,
        panic_at: Option<[usize; 2]>,
        delay: Option<Duration>,
    }

    impl ChunkOperation for Recorder {
        fn perform(&self, pos: &ChunkPosition) -> Result<()> {
            if Some(pos.start) == self.fail_at {
                bail!("bad chunk at {:?}", pos.start);
            }
            if Some(pos.start) == self.panic_at {
                panic!("corrupt tile");
            }
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            self.seen.lock().unwrap().insert(*pos);
            Ok(())
        }
    }

    fn positions() -> Vec<ChunkPosition> {
        ChunkingScheme::new([100, 100], [7, 9]).unwrap().positions()
    }

    #[test]
    fn serial_and_parallel_visit_all() {
        for &exec in &[Execution::Serial, Execution::Parallel(4)] {
            let op = Arc::new(Recorder::default());
            let done = Arc::new(AtomicUsize::new(0));
            let counter = done.clone();
            let mut proc = PoolProcessor::new(exec).with_progress(move |_| {
                counter.fetch_add(1, Ordering::AcqRel);
            });
            assert_eq!(proc.state(), PoolState::Idle);
            proc.init(positions(), op.clone()).unwrap();
            assert_eq!(proc.state(), PoolState::Initialized);
            proc.start().unwrap();
            proc.wait_for_completion().unwrap();
            assert_eq!(proc.state(), PoolState::Completed);

            let total = positions().len();
            assert_eq!(proc.processed(), total);
            assert_eq!(done.load(Ordering::Acquire), total);
            assert_eq!(op.seen.lock().unwrap().len(), total);
        }
    }

    #[test]
    fn serial_stops_at_first_error() {
        let all = positions();
        let fail_at = all[5].start;
        let op = Arc::new(Recorder {
            fail_at: Some(fail_at),
            ..Default::default()
        });
        let mut proc = PoolProcessor::serial();
        proc.init(all, op.clone()).unwrap();
        proc.start().unwrap();
        let err = proc.wait_for_completion().unwrap_err();
        assert_eq!(err.to_string(), format!("bad chunk at {:?}", fail_at));
        assert_eq!(proc.processed(), 5);
        assert_eq!(op.seen.lock().unwrap().len(), 5);
    }

    #[test]
    fn parallel_reports_error_and_stops_dispatch() {
        let all = positions();
        let total = all.len();
        let fail_at = all[0].start;
        let op = Arc::new(Recorder {
            fail_at: Some(fail_at),
            delay: Some(Duration::from_millis(2)),
            ..Default::default()
        });
        let mut proc = PoolProcessor::parallel(2);
        proc.init(all, op.clone()).unwrap();
        proc.start().unwrap();
        let err = proc.wait_for_completion().unwrap_err();
        assert!(err.to_string().starts_with("bad chunk"));
        // The failing position is dispatched first; the rest
        // of the run must not be.
        assert!(proc.processed() < total / 2);
        assert_eq!(op.seen.lock().unwrap().len(), proc.processed());
    }

    #[test]
    fn panics_become_errors() {
        for &exec in &[Execution::Serial, Execution::Parallel(2)] {
            let all = positions();
            let panic_at = all[3].start;
            let op = Arc::new(Recorder {
                panic_at: Some(panic_at),
                ..Default::default()
            });
            let mut proc = PoolProcessor::new(exec);
            proc.init(all, op).unwrap();
            proc.start().unwrap();
            let err = proc.wait_for_completion().unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("chunk operation at {:?} panicked: corrupt tile", panic_at)
            );
            assert_eq!(proc.state(), PoolState::Completed);
        }
    }

    #[test]
    fn state_machine_misuse() {
        let mut proc = PoolProcessor::serial();
        assert!(proc.start().is_err());
        assert!(proc.wait_for_completion().is_err());
        proc.init(vec![], Arc::new(Recorder::default())).unwrap();
        assert!(proc.init(vec![], Arc::new(Recorder::default())).is_err());
        proc.start().unwrap();
        proc.wait_for_completion().unwrap();
        assert_eq!(proc.processed(), 0);
    }

    #[test]
    fn execution_from_flags() {
        assert_eq!(Execution::from_flags(true, Some(8)), Execution::Serial);
        assert_eq!(Execution::from_flags(false, Some(3)), Execution::Parallel(3));
        assert!(Execution::Parallel(1000).workers() <= available_processors());
        assert_eq!(Execution::Parallel(0).workers(), 1);
    }
}
