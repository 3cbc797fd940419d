//! Accuracy check of a resampling map.
//!
//! [`ResamplingDiagnostic`] stands in for the map factory of
//! a resampling run. Every map it hands out is sampled on a
//! regular stride; once the run is done,
//! [`complete`](ResamplingDiagnostic::complete) compares each
//! sampled source pixel with the nearest source pixel found
//! by searching a window around it.

use super::map::{ResamplingMap, ResamplingMapFactory};
use crate::chunking::{ChunkPosition, COL, ROW};
use crate::error::ToolError;
use crate::geometry::EarthTransform;
use crate::stats::SampleStats;
use crate::Result;
use anyhow::anyhow;
use rayon::prelude::*;
use serde_derive::Serialize;
use std::sync::{Arc, Mutex};

/// Side of the square searched for the optimal source pixel.
pub const DEFAULT_SEARCH_WINDOW: usize = 3;
/// Fraction of destination pixels sampled by default.
pub const DEFAULT_SAMPLING_FACTOR: f64 = 0.01;
/// Most suboptimal samples kept for reporting.
pub const MAX_LISTED_SAMPLES: usize = 1000;

/// One sampled destination pixel.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiagnosticSample {
    pub dest: [usize; 2],
    pub source: [usize; 2],
    pub optimal_source: [usize; 2],
    /// Distance in km between the destination pixel and the
    /// source pixel it was mapped to.
    pub actual_dist: f64,
    /// Distance in km to the nearest source pixel.
    pub optimal_dist: f64,
}

impl DiagnosticSample {
    pub fn is_optimal(&self) -> bool {
        self.source == self.optimal_source
    }

    pub fn distance_error(&self) -> f64 {
        self.actual_dist - self.optimal_dist
    }

    /// Normalized performance in `[0, 1]`, 1 being optimal.
    pub fn omega(&self) -> f64 {
        if self.actual_dist == self.optimal_dist {
            1.
        } else {
            1. - (self.actual_dist - self.optimal_dist) / (self.actual_dist + self.optimal_dist)
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct DiagnosticSummary {
    pub samples: usize,
    pub suboptimal: usize,
    pub distance: SampleStats,
    pub distance_error: SampleStats,
    pub omega: SampleStats,
    /// Suboptimal samples in destination order, at most
    /// [`MAX_LISTED_SAMPLES`].
    pub suboptimal_samples: Vec<DiagnosticSample>,
}

impl DiagnosticSummary {
    pub fn suboptimal_percent(&self) -> f64 {
        if self.samples == 0 {
            0.
        } else {
            self.suboptimal as f64 / self.samples as f64 * 100.
        }
    }
}

/// A map factory that samples the maps of another.
pub struct ResamplingDiagnostic {
    source: EarthTransform,
    dest: EarthTransform,
    factory: Arc<dyn ResamplingMapFactory>,
    stride: usize,
    window: usize,
    samples: Mutex<Vec<([usize; 2], [usize; 2])>>,
}

impl ResamplingDiagnostic {
    /// Sample about `factor` of the destination pixels;
    /// `factor` must lie in `(0, 1]`.
    pub fn new(
        source: EarthTransform,
        dest: EarthTransform,
        factory: Arc<dyn ResamplingMapFactory>,
        factor: f64,
    ) -> Result<Self> {
        if !(factor > 0. && factor <= 1.) {
            return Err(ToolError::configuration(format!("invalid diagnostic sampling factor {}", factor)).into());
        }
        Ok(ResamplingDiagnostic {
            source,
            dest,
            factory,
            stride: ((1. / factor).sqrt() as usize).max(1),
            window: DEFAULT_SEARCH_WINDOW,
            samples: Mutex::new(vec![]),
        })
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    fn sample(&self, pos: &ChunkPosition, map: &dyn ResamplingMap) -> Result<usize> {
        let end = pos.end();
        let mut found = vec![];
        for i in (pos.start[ROW]..end[ROW]).step_by(self.stride) {
            for j in (pos.start[COL]..end[COL]).step_by(self.stride) {
                if let Some(src) = map.map([i, j]) {
                    found.push(([i, j], src));
                }
            }
        }
        let count = found.len();
        self.samples
            .lock()
            .map_err(|_| anyhow!("diagnostic sample list poisoned"))?
            .extend(found);
        Ok(count)
    }

    fn evaluate(&self, dest: [usize; 2], source: [usize; 2]) -> Option<DiagnosticSample> {
        let dest_loc = self.dest.location(dest);
        let actual_dist = dest_loc.distance(&self.source.location(source));
        if actual_dist.is_nan() {
            return None;
        }

        let dims = self.source.dims;
        let radius = (self.window - 1) / 2;
        let mut best: Option<([usize; 2], f64)> = None;
        for i in source[ROW].saturating_sub(radius)..=(source[ROW] + radius).min(dims[ROW] - 1) {
            for j in source[COL].saturating_sub(radius)..=(source[COL] + radius).min(dims[COL] - 1) {
                let loc = self.source.location([i, j]);
                if !loc.is_valid() {
                    continue;
                }
                let dist = dest_loc.distance(&loc);
                match best {
                    Some((_, d)) if dist >= d => {}
                    _ => best = Some(([i, j], dist)),
                }
            }
        }

        let (optimal_source, optimal_dist) = best?;
        if optimal_dist > actual_dist {
            tracing::warn!("optimal distance exceeds resampled distance at {:?}", dest);
        }
        Some(DiagnosticSample {
            dest,
            source,
            optimal_source,
            actual_dist,
            optimal_dist,
        })
    }

    /// Evaluate all samples taken so far.
    pub fn complete(&self) -> Result<DiagnosticSummary> {
        let mut raw = std::mem::take(
            &mut *self
                .samples
                .lock()
                .map_err(|_| anyhow!("diagnostic sample list poisoned"))?,
        );
        raw.sort();
        tracing::debug!("running diagnostic on {} samples", raw.len());

        let samples: Vec<DiagnosticSample> = raw
            .par_iter()
            .filter_map(|&(dest, source)| self.evaluate(dest, source))
            .collect();

        let mut summary = DiagnosticSummary {
            samples: samples.len(),
            suboptimal: 0,
            distance: SampleStats::default(),
            distance_error: SampleStats::default(),
            omega: SampleStats::default(),
            suboptimal_samples: vec![],
        };
        for sample in samples {
            summary.distance += sample.actual_dist;
            summary.distance_error += sample.distance_error();
            summary.omega += sample.omega();
            if !sample.is_optimal() {
                summary.suboptimal += 1;
                if summary.suboptimal_samples.len() < MAX_LISTED_SAMPLES {
                    summary.suboptimal_samples.push(sample);
                }
            }
        }
        Ok(summary)
    }
}

impl ResamplingMapFactory for ResamplingDiagnostic {
    fn create(&self, pos: &ChunkPosition) -> Result<Option<Box<dyn ResamplingMap>>> {
        let map = self.factory.create(pos)?;
        if let Some(map) = &map {
            let count = self.sample(pos, map.as_ref())?;
            tracing::trace!("took {} diagnostic samples at {:?}", count, pos.start);
        }
        Ok(map)
    }
}
