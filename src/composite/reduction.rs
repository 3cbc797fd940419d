//! Composite methods and pixel-wise reductions.

use crate::data::Sample;
use crate::error::ToolError;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A composite method as selected on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Mean,
    GeoMean,
    Median,
    Min,
    Max,
    /// Last valid value with inputs ordered by date.
    Latest,
    /// Last valid value with inputs in the given order.
    Explicit,
    /// Coherent selection by an optimization variable.
    Optimal,
}

impl FromStr for Method {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Method::*;
        Ok(match s {
            "mean" => Mean,
            "geomean" => GeoMean,
            "median" => Median,
            "min" => Min,
            "max" => Max,
            "latest" => Latest,
            "explicit" => Explicit,
            "optimal" => Optimal,
            _ => return Err(ToolError::validation(format!("unsupported composite method '{}'", s))),
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Method::*;
        f.write_str(match self {
            Mean => "mean",
            GeoMean => "geomean",
            Median => "median",
            Min => "min",
            Max => "max",
            Latest => "latest",
            Explicit => "explicit",
            Optimal => "optimal",
        })
    }
}

impl Method {
    /// Methods that select a value by input order rather
    /// than computing one.
    pub fn is_value_order(self) -> bool {
        matches!(self, Method::Latest | Method::Explicit)
    }

    /// Methods that may run in coherent mode.
    pub fn allows_coherent(self) -> bool {
        matches!(self, Method::Latest | Method::Explicit | Method::Optimal)
    }

    /// The pixel reduction for non-coherent compositing.
    pub fn reduction(self) -> Option<Reduction> {
        use Method::*;
        Some(match self {
            Mean => Reduction::Mean,
            GeoMean => Reduction::GeoMean,
            Median => Reduction::Median,
            Min => Reduction::Min,
            Max => Reduction::Max,
            Latest | Explicit => Reduction::Last,
            Optimal => return None,
        })
    }
}

/// Reduces the valid values at one pixel, in input order.
/// `None` means the result is missing.
pub type ReduceFn<T> = fn(&mut [T]) -> Option<T>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reduction {
    Mean,
    /// Geometric mean of the strictly positive values.
    GeoMean,
    Median,
    Min,
    Max,
    /// The last value.
    Last,
}

impl Reduction {
    /// Reductions that compute a new value, as opposed to
    /// selecting one of the inputs.
    pub fn is_arithmetic(self) -> bool {
        matches!(self, Reduction::Mean | Reduction::GeoMean | Reduction::Median)
    }

    /// Resolve the reduction for a value type, once.
    pub fn reducer<T: Sample>(self) -> ReduceFn<T> {
        match self {
            Reduction::Mean => mean::<T>,
            Reduction::GeoMean => geo_mean::<T>,
            Reduction::Median => median::<T>,
            Reduction::Min => min::<T>,
            Reduction::Max => max::<T>,
            Reduction::Last => last::<T>,
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Which reductions the minimum valid count applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidThreshold {
    /// Every reduction needs at least the minimum count.
    AllOperators,
    /// Only arithmetic reductions do; selections need one
    /// valid value.
    ArithmeticOnly,
}

impl Default for ValidThreshold {
    fn default() -> Self {
        ValidThreshold::AllOperators
    }
}

impl ValidThreshold {
    pub fn effective(self, min_valid: usize, reduction: Reduction) -> usize {
        match self {
            ValidThreshold::ArithmeticOnly if !reduction.is_arithmetic() => 1,
            _ => min_valid.max(1),
        }
    }
}

fn mean<T: Sample>(vals: &mut [T]) -> Option<T> {
    let sum: f64 = vals.iter().map(|v| v.to_f64()).sum();
    Some(T::from_f64(sum / vals.len() as f64))
}

fn geo_mean<T: Sample>(vals: &mut [T]) -> Option<T> {
    let (sum, count) = vals
        .iter()
        .map(|v| v.to_f64())
        .filter(|&v| v > 0.)
        .fold((0., 0usize), |(s, c), v| (s + v.ln(), c + 1));
    if count == 0 {
        None
    } else {
        Some(T::from_f64((sum / count as f64).exp()))
    }
}

fn median<T: Sample>(vals: &mut [T]) -> Option<T> {
    vals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let n = vals.len();
    if n % 2 == 1 {
        Some(vals[n / 2])
    } else {
        Some(T::from_f64((vals[n / 2 - 1].to_f64() + vals[n / 2].to_f64()) / 2.))
    }
}

fn min<T: Sample>(vals: &mut [T]) -> Option<T> {
    vals.iter().cloned().fold(None, |acc, v| match acc {
        Some(m) if m <= v => Some(m),
        _ => Some(v),
    })
}

fn max<T: Sample>(vals: &mut [T]) -> Option<T> {
    vals.iter().cloned().fold(None, |acc, v| match acc {
        Some(m) if m >= v => Some(m),
        _ => Some(v),
    })
}

fn last<T: Sample>(vals: &mut [T]) -> Option<T> {
    vals.last().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reduce<T: Sample>(r: Reduction, vals: &[T]) -> Option<T> {
        let mut vals = vals.to_vec();
        r.reducer::<T>()(&mut vals)
    }

    #[test]
    fn float_reductions() {
        let vals = [2.0f64, 4.0];
        assert_eq!(reduce(Reduction::Mean, &vals), Some(3.));
        assert_eq!(reduce(Reduction::Median, &vals), Some(3.));
        assert_eq!(reduce(Reduction::Min, &vals), Some(2.));
        assert_eq!(reduce(Reduction::Max, &vals), Some(4.));
        assert_eq!(reduce(Reduction::Last, &vals), Some(4.));
        assert!((reduce(Reduction::GeoMean, &vals).unwrap() - 8f64.sqrt()).abs() < 1e-12);

        assert_eq!(reduce(Reduction::Median, &[5f32, 1., 3.]), Some(3.));
        assert_eq!(reduce(Reduction::Last, &[5f32, 1., 3.]), Some(3.));
    }

    #[test]
    fn geo_mean_ignores_non_positive() {
        assert_eq!(reduce(Reduction::GeoMean, &[-1f64, 0., 4.]), Some(4.));
        assert_eq!(reduce(Reduction::GeoMean, &[-1f64, 0.]), None);
    }

    #[test]
    fn integer_reductions_round() {
        assert_eq!(reduce(Reduction::Mean, &[1i16, 2]), Some(2));
        assert_eq!(reduce(Reduction::Median, &[1i32, 2, 4, 10]), Some(3));
        assert_eq!(reduce(Reduction::Mean, &[100i8, 120, 127]), Some(116));
        assert_eq!(reduce(Reduction::Min, &[3i64, -7, 5]), Some(-7));
    }

    #[test]
    fn parse_methods() {
        assert_eq!("geomean".parse::<Method>().unwrap(), Method::GeoMean);
        assert!("average".parse::<Method>().is_err());
        assert_eq!(Method::Explicit.reduction(), Some(Reduction::Last));
        assert_eq!(Method::Optimal.reduction(), None);
        assert!(Method::Latest.allows_coherent());
        assert!(!Method::Median.allows_coherent());
        assert_eq!(Method::Median.to_string(), "median");
    }

    #[test]
    fn thresholds() {
        assert_eq!(ValidThreshold::AllOperators.effective(3, Reduction::Max), 3);
        assert_eq!(ValidThreshold::ArithmeticOnly.effective(3, Reduction::Max), 1);
        assert_eq!(ValidThreshold::ArithmeticOnly.effective(3, Reduction::Mean), 3);
        assert_eq!(ValidThreshold::AllOperators.effective(0, Reduction::Mean), 1);
    }
}
