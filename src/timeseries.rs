//! Time series handed to the normalization check.

/// Access to the timestamps of a series, in series order.
pub trait TimeSeriesLike {
    fn timestamps(&self) -> Vec<f64>;
}

impl TimeSeriesLike for [f64] {
    fn timestamps(&self) -> Vec<f64> {
        self.to_vec()
    }
}

impl TimeSeriesLike for Vec<f64> {
    fn timestamps(&self) -> Vec<f64> {
        self.clone()
    }
}

/// Ordered `(timestamp, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    entries: Vec<(f64, f64)>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I: IntoIterator<Item = (f64, f64)>>(pairs: I) -> Self {
        Self {
            entries: pairs.into_iter().collect(),
        }
    }

    pub fn add_entry(&mut self, timestamp: f64, value: f64) {
        self.entries.push((timestamp, value));
    }

    /// Sort entries by timestamp, ascending.
    pub fn sort_timestamps(&mut self) {
        self.entries.sort_by(|a, b| a.0.total_cmp(&b.0));
    }

    pub fn entries(&self) -> &[(f64, f64)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TimeSeriesLike for TimeSeries {
    fn timestamps(&self) -> Vec<f64> {
        self.entries.iter().map(|(t, _)| *t).collect()
    }
}

impl FromIterator<(f64, f64)> for TimeSeries {
    fn from_iter<I: IntoIterator<Item = (f64, f64)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}
