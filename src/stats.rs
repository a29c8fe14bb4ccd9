/// Running moments plus the retained values, so order statistics can be
/// taken after the fact.
#[derive(Debug, Clone, Default)]
pub struct ValueStats {
    values: Vec<f64>,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl ValueStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let mut stats = Self::new();
        values.into_iter().for_each(|v| stats.add(v));
        stats
    }

    pub fn add(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.sum += value;
        self.min = Some(self.min.map_or(value, |current| current.min(value)));
        self.max = Some(self.max.map_or(value, |current| current.max(value)));
        self.values.push(value);
    }

    pub fn count(&self) -> usize {
        self.values.len()
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.sum / self.count() as f64)
        }
    }

    /// Sample standard deviation (n - 1 denominator).
    pub fn std_dev(&self) -> Option<f64> {
        if self.count() < 2 {
            return None;
        }
        let mean = self.mean()?;
        let variance = self
            .values
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / (self.count() as f64 - 1.0);
        Some(variance.max(0.0).sqrt())
    }

    pub fn median(&self) -> Option<f64> {
        self.percentile(50.0)
    }

    /// Linear-interpolated percentile, `p` in `[0, 100]`.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        let sorted = self.sorted();
        percentile_sorted(&sorted, p)
    }

    /// First and third quartile.
    pub fn quartiles(&self) -> Option<(f64, f64)> {
        let sorted = self.sorted();
        Some((percentile_sorted(&sorted, 25.0)?, percentile_sorted(&sorted, 75.0)?))
    }

    fn sorted(&self) -> Vec<f64> {
        let mut sorted = self.values.clone();
        sorted.sort_by(f64::total_cmp);
        sorted
    }
}

pub fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n == 1 {
        return Some(sorted[0]);
    }
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = (rank.ceil() as usize).min(n - 1);
    let frac = rank - lower as f64;
    Some(sorted[lower] * (1.0 - frac) + sorted[upper] * frac)
}

pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

pub fn format_optional(value: Option<f64>) -> String {
    value.map(format_number).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moments_match_sample_definitions() {
        let stats = ValueStats::from_values([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(stats.mean(), Some(5.0));
        let std = stats.std_dev().unwrap();
        assert!((std - 2.138_089_935).abs() < 1e-6);
        assert_eq!(stats.min(), Some(2.0));
        assert_eq!(stats.max(), Some(9.0));
    }

    #[test]
    fn percentiles_interpolate_linearly() {
        let stats = ValueStats::from_values([1.0, 2.0, 3.0, 4.0]);
        assert_eq!(stats.median(), Some(2.5));
        assert_eq!(stats.quartiles(), Some((1.75, 3.25)));
        assert_eq!(stats.percentile(100.0), Some(4.0));
    }

    #[test]
    fn non_finite_values_are_ignored() {
        let stats = ValueStats::from_values([1.0, f64::NAN, f64::INFINITY, 3.0]);
        assert_eq!(stats.count(), 2);
        assert_eq!(stats.std_dev().map(|s| (s * 1e6).round()), Some(1_414_214.0));
    }

    #[test]
    fn single_value_has_no_spread() {
        let stats = ValueStats::from_values([42.0]);
        assert_eq!(stats.std_dev(), None);
        assert_eq!(stats.median(), Some(42.0));
    }
}
