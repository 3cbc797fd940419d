use super::{ChunkConsumer, ChunkFunction, Collector};
use crate::chunking::ChunkPosition;
use crate::Result;
use anyhow::Context;
use serde_derive::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A unit of work that can be performed for any chunk
/// position, possibly concurrently for distinct positions.
pub trait ChunkOperation: Send + Sync {
    fn perform(&self, pos: &ChunkPosition) -> Result<()>;
}

/// Time accumulated in each stage of a computation, across
/// all positions and workers.
#[derive(Debug, Default)]
pub struct ComputationTimes {
    collect: AtomicU64,
    apply: AtomicU64,
    consume: AtomicU64,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct TimesSummary {
    pub collect_secs: f64,
    pub apply_secs: f64,
    pub consume_secs: f64,
}

impl ComputationTimes {
    fn record(&self, collect: Duration, apply: Duration, consume: Duration) {
        self.collect.fetch_add(collect.as_nanos() as u64, Ordering::Relaxed);
        self.apply.fetch_add(apply.as_nanos() as u64, Ordering::Relaxed);
        self.consume.fetch_add(consume.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn summary(&self) -> TimesSummary {
        let secs = |v: &AtomicU64| v.load(Ordering::Relaxed) as f64 * 1e-9;
        TimesSummary {
            collect_secs: secs(&self.collect),
            apply_secs: secs(&self.apply),
            consume_secs: secs(&self.consume),
        }
    }
}

/// Binds a collector, a function and a consumer: performing
/// it for a position collects the inputs, applies the
/// function and writes the output.
pub struct ChunkComputation {
    collector: Arc<dyn Collector>,
    function: Arc<dyn ChunkFunction>,
    consumer: Arc<dyn ChunkConsumer>,
    times: Option<ComputationTimes>,
}

impl ChunkComputation {
    pub fn new(
        collector: Arc<dyn Collector>,
        function: Arc<dyn ChunkFunction>,
        consumer: Arc<dyn ChunkConsumer>,
    ) -> Self {
        ChunkComputation {
            collector,
            function,
            consumer,
            times: None,
        }
    }

    /// Accumulate the time spent in each stage.
    pub fn tracked(mut self) -> Self {
        self.times = Some(Default::default());
        self
    }

    pub fn times(&self) -> Option<TimesSummary> {
        self.times.as_ref().map(ComputationTimes::summary)
    }
}

impl ChunkOperation for ChunkComputation {
    fn perform(&self, pos: &ChunkPosition) -> Result<()> {
        let start = Instant::now();
        let inputs = self.collector.get_chunks(pos)?;
        let collected = Instant::now();
        let output = self
            .function
            .apply(pos, inputs)
            .with_context(|| format!("computing chunk at {:?}", pos.start))?;
        let applied = Instant::now();
        self.consumer.put_chunk(pos, output)?;

        if let Some(times) = &self.times {
            times.record(collected - start, applied - collected, applied.elapsed());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkingScheme;
    use crate::data::DataChunk;
    use crate::dataset::CachedGrid;
    use crate::pipeline::{ChunkCollector, ChunkProducer, SyntheticChunkProducer};

    struct Sum;
    impl ChunkFunction for Sum {
        fn apply(&self, _: &ChunkPosition, inputs: Vec<DataChunk>) -> Result<DataChunk> {
            let len = inputs[0].values();
            let vals: Vec<i32> = (0..len)
                .map(|i| inputs.iter().map(|c| c.value_f64(i) as i32).sum())
                .collect();
            DataChunk::from_values(inputs[0].dims(), vals, None)
        }
    }

    #[test]
    fn perform_writes_output() {
        let scheme = ChunkingScheme::new([3, 3], [2, 2]).unwrap();
        let collector = ChunkCollector::with_producers(vec![
            Arc::new(SyntheticChunkProducer::new(scheme.clone(), |[i, _]| Some(i as i32))) as Arc<dyn ChunkProducer>,
            Arc::new(SyntheticChunkProducer::new(scheme.clone(), |[_, j]| Some(j as i32 * 10))),
        ]);
        let grid = Arc::new(CachedGrid::new("sum", [3, 3], [2, 2], DataChunk::prototype::<i32>(None)));
        let comp = ChunkComputation::new(Arc::new(collector), Arc::new(Sum), grid.clone()).tracked();

        for pos in &scheme {
            comp.perform(&pos).unwrap();
        }
        assert!(comp.times().is_some());

        let out = grid.assemble().unwrap();
        let out = out.read_chunk(&ChunkPosition::new([2, 0], [1, 3])).unwrap();
        assert_eq!(out.as_typed::<i32>().unwrap().values(), &[2, 12, 22]);
    }
}
