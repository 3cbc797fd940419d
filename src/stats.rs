//! Utilities to accumulate first and second moments, min
//! and max of a `f64` statistic incrementally.
use serde_derive::Serialize;
use std::ops::AddAssign;

/// Stores the statistics collected from a `f64` random
/// variable. Accumulation of the statistic is done by
/// add-assigning (using `+=`) one of the following.
///
/// - a `f64` value.  Adds a new sample
/// - another `SampleStats` value.  Accumulates the statistic from the other into `self`.
///
/// NaN samples are ignored.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SampleStats {
    max: f64,
    min: f64,
    sum: f64,
    sum_2: f64,
    count: usize,
}

impl Default for SampleStats {
    fn default() -> Self {
        SampleStats {
            max: f64::NEG_INFINITY,
            min: f64::INFINITY,
            sum: 0.,
            sum_2: 0.,
            count: 0,
        }
    }
}

impl AddAssign<f64> for SampleStats {
    fn add_assign(&mut self, val: f64) {
        if val.is_nan() {
            return;
        }
        self.max = self.max.max(val);
        self.min = self.min.min(val);
        self.sum += val;
        self.sum_2 += val * val;
        self.count += 1;
    }
}

impl AddAssign<&SampleStats> for SampleStats {
    fn add_assign(&mut self, other: &SampleStats) {
        self.max = self.max.max(other.max);
        self.min = self.min.min(other.min);
        self.sum += other.sum;
        self.sum_2 += other.sum_2;
        self.count += other.count;
    }
}

impl SampleStats {
    #[inline]
    pub fn max(&self) -> f64 {
        self.max
    }

    #[inline]
    pub fn min(&self) -> f64 {
        self.min
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }

    /// Population standard deviation.
    #[inline]
    pub fn std_deviation(&self) -> f64 {
        let mean = self.mean();
        (self.sum_2 / self.count as f64 - mean * mean).max(0.).sqrt()
    }
}
