use crate::cli::*;
use cwchunk::chunking::ChunkPosition;
use cwchunk::pipeline::ProgressFn;
use std::sync::Arc;
use std::thread::JoinHandle;

const PROGRESS_UPDATE_MILLIS: u64 = 500;

/// A progress spinner counting the chunks of one run.
pub struct Tracker {
    progress: Arc<Progress<ChunkCounter>>,
    handle: Option<JoinHandle<()>>,
}

impl Tracker {
    pub fn new(label: &str, len: usize) -> Self {
        let progress = Arc::new(Progress::new(ChunkCounter::new(label, "chunks")));
        progress.value.total.store(len);
        let handle = progress
            .clone()
            .spawn_auto_update_thread(std::time::Duration::from_millis(PROGRESS_UPDATE_MILLIS));
        Tracker {
            progress,
            handle: Some(handle),
        }
    }

    pub fn increment(&self) {
        self.progress.value.processed.fetch_add(1);
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.progress.finish();
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                eprintln!("Warning: progress thread panicked!");
            }
        }
    }
}

/// Progress hook for one run of the engine, shaped to serve
/// as a [`ProgressFactory`](cwchunk::pipeline::ProgressFactory).
pub fn track_chunks(label: &str, len: usize) -> Option<Box<ProgressFn>> {
    let tracker = Tracker::new(label, len);
    Some(Box::new(move |_: &ChunkPosition| tracker.increment()))
}
