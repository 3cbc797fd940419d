use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct Counter {
    val: AtomicUsize,
}
impl Counter {
    pub fn load(&self) -> usize {
        self.val.load(Ordering::Acquire)
    }

    pub fn store(&self, val: usize) {
        self.val.store(val, Ordering::Release);
    }

    pub fn fetch_add(&self, inc: usize) -> usize {
        self.val.fetch_add(inc, Ordering::AcqRel)
    }
}
impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.load())
    }
}

/// Progress of one labelled run over a known number of
/// chunks.
#[derive(Debug)]
pub struct ChunkCounter {
    pub total: Counter,
    pub processed: Counter,
    label: String,
    units: &'static str,
}
impl ChunkCounter {
    pub fn new(label: &str, units: &'static str) -> Self {
        ChunkCounter {
            total: Default::default(),
            processed: Default::default(),
            label: label.into(),
            units,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}
impl fmt::Display for ChunkCounter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (done, total) = (self.processed.load(), self.total.load());
        write!(f, "{}: {} of {} {}", self.label, done, total, self.units)?;
        if total > 0 {
            write!(f, " ({:.0}%)", done as f64 / total as f64 * 100.)?;
        }
        Ok(())
    }
}
