//! Global metadata of an earth dataset.

use crate::geometry::EarthTransform;
use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

/// A period of data acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimePeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimePeriod {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        TimePeriod { start, end }
    }

    pub fn instant(date: DateTime<Utc>) -> Self {
        TimePeriod::new(date, date)
    }
}

/// Source, time and navigation of a dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EarthDataInfo {
    pub satellite: String,
    pub sensor: String,
    pub origin: String,
    pub history: Vec<String>,
    pub periods: Vec<TimePeriod>,
    pub transform: EarthTransform,
}

impl EarthDataInfo {
    pub fn new(transform: EarthTransform) -> Self {
        EarthDataInfo {
            satellite: String::new(),
            sensor: String::new(),
            origin: String::new(),
            history: vec![],
            periods: vec![],
            transform,
        }
    }

    pub fn dims(&self) -> [usize; 2] {
        self.transform.dims
    }

    /// The earliest start of acquisition, if any.
    pub fn start_date(&self) -> Option<DateTime<Utc>> {
        self.periods.iter().map(|p| p.start).min()
    }

    /// Append a command to the processing history.
    pub fn push_history(&mut self, command: &str) {
        self.history.push(command.into());
    }
}

/// Options for merging the metadata of composite inputs.
#[derive(Clone, Copy, Debug, Default)]
pub struct MergeOptions {
    /// Keep every input's value of text fields, including
    /// duplicates.
    pub pedantic: bool,
    /// Keep the input histories.
    pub keep_history: bool,
    /// Replace the input periods by one period spanning all
    /// of them.
    pub collapse_time: bool,
}

/// Merge the metadata of several inputs into the metadata of
/// their composite. Navigation is taken from the first input.
pub fn merge_info(infos: &[&EarthDataInfo], opts: MergeOptions) -> Option<EarthDataInfo> {
    let first = infos.first()?;
    let mut merged = EarthDataInfo::new(first.transform.clone());

    merged.satellite = join_values(infos.iter().map(|i| i.satellite.as_str()), opts.pedantic);
    merged.sensor = join_values(infos.iter().map(|i| i.sensor.as_str()), opts.pedantic);
    merged.origin = join_values(infos.iter().map(|i| i.origin.as_str()), opts.pedantic);

    if opts.keep_history {
        for info in infos {
            for entry in &info.history {
                if opts.pedantic || !merged.history.contains(entry) {
                    merged.history.push(entry.clone());
                }
            }
        }
    }

    let mut periods: Vec<TimePeriod> = infos.iter().flat_map(|i| i.periods.iter().cloned()).collect();
    periods.sort();
    if !opts.pedantic {
        periods.dedup();
    }
    if opts.collapse_time && !periods.is_empty() {
        let start = periods.iter().map(|p| p.start).min();
        let end = periods.iter().map(|p| p.end).max();
        if let (Some(start), Some(end)) = (start, end) {
            periods = vec![TimePeriod::new(start, end)];
        }
    }
    merged.periods = periods;
    Some(merged)
}

fn join_values<'a>(vals: impl Iterator<Item = &'a str>, keep_duplicates: bool) -> String {
    let mut values: Vec<&str> = vec![];
    for val in vals {
        if val.is_empty() || (!keep_duplicates && values.contains(&val)) {
            continue;
        }
        values.push(val);
    }
    values.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn info(sat: &str, day: u32, history: &str) -> EarthDataInfo {
        let mut info = EarthDataInfo::new(EarthTransform::regular([4, 4], 10., 10., 1.));
        info.satellite = sat.into();
        info.sensor = "avhrr".into();
        info.periods = vec![TimePeriod::instant(Utc.with_ymd_and_hms(2020, 5, day, 12, 0, 0).unwrap())];
        info.push_history(history);
        info
    }

    #[test]
    fn merge_metadata() {
        let (a, b, c) = (info("noaa-18", 3, "cwimport a"), info("noaa-19", 1, "cwimport b"), info("noaa-18", 2, "cwimport a"));
        let merged = merge_info(&[&a, &b, &c], MergeOptions::default()).unwrap();
        assert_eq!(merged.satellite, "noaa-18, noaa-19");
        assert_eq!(merged.sensor, "avhrr");
        assert!(merged.history.is_empty());
        assert_eq!(merged.periods.len(), 3);
        assert_eq!(merged.start_date(), b.start_date());

        let opts = MergeOptions {
            pedantic: true,
            keep_history: true,
            collapse_time: true,
        };
        let merged = merge_info(&[&a, &b, &c], opts).unwrap();
        assert_eq!(merged.satellite, "noaa-18, noaa-19, noaa-18");
        assert_eq!(merged.history.len(), 3);
        assert_eq!(merged.periods.len(), 1);
        assert_eq!(merged.periods[0].start, b.periods[0].start);
        assert_eq!(merged.periods[0].end, a.periods[0].end);
    }
}
