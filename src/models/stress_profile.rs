use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{FEATURE_DIM, ZoneId};
use crate::error::{StressError, StressResult};
use crate::utils::local_hour_and_weekday;

/// Welford accumulator: O(1) memory mean/variance of a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Chan et al. pairwise combination of two partial accumulators.
    pub fn merge(&mut self, other: &RunningStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let n_a = self.count as f64;
        let n_b = other.count as f64;
        let n = n_a + n_b;
        let delta = other.mean - self.mean;
        self.mean += delta * n_b / n;
        self.m2 += other.m2 + delta * delta * n_a * n_b / n;
        self.count += other.count;
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Unbiased sample variance; needs two observations.
    pub fn variance(&self) -> Option<f64> {
        (self.count > 1).then(|| self.m2 / (self.count - 1) as f64)
    }

    pub fn population_variance(&self) -> Option<f64> {
        (self.count > 0).then(|| self.m2 / self.count as f64)
    }
}

/// Whether a profile has seen enough data to be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reliability {
    Reliable { count: u64 },
    Insufficient { count: u64, required: u64 },
}

impl Reliability {
    pub fn is_reliable(&self) -> bool {
        matches!(self, Reliability::Reliable { .. })
    }
}

/// Running statistics of the flattened features and the stress proxy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub features: [RunningStats; FEATURE_DIM],
    pub stress: RunningStats,
}

impl ProfileStats {
    pub fn push(&mut self, row: &[f64; FEATURE_DIM], stress: f64) {
        for (stat, &x) in self.features.iter_mut().zip(row) {
            stat.push(x);
        }
        self.stress.push(stress);
    }

    pub fn merge(&mut self, other: &ProfileStats) {
        for (a, b) in self.features.iter_mut().zip(&other.features) {
            a.merge(b);
        }
        self.stress.merge(&other.stress);
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.stress.count()
    }

    pub fn reliability(&self, min_samples: u64) -> Reliability {
        let count = self.count();
        if count >= min_samples.max(1) {
            Reliability::Reliable { count }
        } else {
            Reliability::Insufficient {
                count,
                required: min_samples.max(1),
            }
        }
    }

    fn require_reliable(&self, subject: impl FnOnce() -> String, min_samples: u64) -> StressResult<()> {
        match self.reliability(min_samples) {
            Reliability::Reliable { .. } => Ok(()),
            Reliability::Insufficient { count, required } => {
                Err(StressError::insufficient(subject(), count, required))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DayKind {
    Weekday,
    Weekend,
}

/// Hour-of-day x weekday/weekend slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeBucket {
    pub day: DayKind,
    pub hour: u8,
}

impl TimeBucket {
    pub fn from_timestamp(epoch_ms: i64, utc_offset_hours: i32) -> Option<Self> {
        let (hour, weekday) = local_hour_and_weekday(epoch_ms, utc_offset_hours)?;
        let day = match weekday {
            Weekday::Sat | Weekday::Sun => DayKind::Weekend,
            _ => DayKind::Weekday,
        };
        Some(Self { day, hour })
    }
}

impl std::fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}@{:02}h", self.day, self.hour)
    }
}

/// Aggregated observations of one zone, optionally split by time bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct StressProfile {
    pub zone: ZoneId,
    overall: ProfileStats,
    buckets: BTreeMap<TimeBucket, ProfileStats>,
}

impl StressProfile {
    pub fn new(zone: ZoneId) -> Self {
        Self {
            zone,
            overall: ProfileStats::default(),
            buckets: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, row: &[f64; FEATURE_DIM], stress: f64, bucket: Option<TimeBucket>) {
        self.overall.push(row, stress);
        if let Some(b) = bucket {
            self.buckets.entry(b).or_default().push(row, stress);
        }
    }

    pub fn merge(&mut self, other: &StressProfile) {
        self.overall.merge(&other.overall);
        for (b, stats) in &other.buckets {
            self.buckets.entry(*b).or_default().merge(stats);
        }
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.overall.count()
    }

    pub fn overall(&self) -> &ProfileStats {
        &self.overall
    }

    pub fn reliability(&self, min_samples: u64) -> Reliability {
        self.overall.reliability(min_samples)
    }

    pub fn is_reliable(&self, min_samples: u64) -> bool {
        self.reliability(min_samples).is_reliable()
    }

    /// Mean stress proxy, or `InsufficientData` below the reliability threshold.
    pub fn mean_stress(&self, min_samples: u64) -> StressResult<f64> {
        self.overall
            .require_reliable(|| format!("zone {}", self.zone), min_samples)?;
        Ok(self.overall.stress.mean)
    }

    pub fn stress_variance(&self) -> Option<f64> {
        self.overall.stress.variance()
    }

    /// Mean feature row, the zone's input to the learner.
    pub fn mean_features(&self, min_samples: u64) -> StressResult<[f64; FEATURE_DIM]> {
        self.overall
            .require_reliable(|| format!("zone {}", self.zone), min_samples)?;
        Ok(std::array::from_fn(|i| self.overall.features[i].mean))
    }

    pub fn bucket(&self, bucket: TimeBucket) -> Option<&ProfileStats> {
        self.buckets.get(&bucket)
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&TimeBucket, &ProfileStats)> {
        self.buckets.iter()
    }

    pub fn bucket_mean_stress(&self, bucket: TimeBucket, min_samples: u64) -> StressResult<f64> {
        let subject = || format!("zone {} bucket {}", self.zone, bucket);
        match self.buckets.get(&bucket) {
            Some(stats) => {
                stats.require_reliable(subject, min_samples)?;
                Ok(stats.stress.mean)
            }
            None => Err(StressError::insufficient(subject(), 0, min_samples.max(1))),
        }
    }
}

/// Immutable copy of all zone profiles at one point in time.
#[derive(Debug, Clone, Default)]
pub struct ProfileSnapshot {
    pub profiles: BTreeMap<ZoneId, StressProfile>,
    pub min_reliable_samples: u64,
    pub accepted: u64,
    pub rejected: u64,
}

impl ProfileSnapshot {
    pub fn get(&self, zone: ZoneId) -> Option<&StressProfile> {
        self.profiles.get(&zone)
    }

    pub fn reliable_zones(&self) -> impl Iterator<Item = &StressProfile> {
        self.profiles
            .values()
            .filter(|p| p.is_reliable(self.min_reliable_samples))
    }

    pub fn mean_stress(&self, zone: ZoneId) -> StressResult<f64> {
        match self.profiles.get(&zone) {
            Some(p) => p.mean_stress(self.min_reliable_samples),
            None => Err(StressError::insufficient(
                format!("zone {}", zone),
                0,
                self.min_reliable_samples.max(1),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welford_matches_two_pass() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mut s = RunningStats::default();
        data.iter().for_each(|&x| s.push(x));
        assert_eq!(s.mean(), Some(5.0));
        assert!((s.population_variance().unwrap() - 4.0).abs() < 1e-12);
        assert!((s.variance().unwrap() - 32.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn merged_partials_equal_single_stream() {
        let data: Vec<f64> = (0..50).map(|i| (i as f64 * 0.37).sin() * 10.0).collect();
        let mut whole = RunningStats::default();
        data.iter().for_each(|&x| whole.push(x));

        let mut left = RunningStats::default();
        let mut right = RunningStats::default();
        data[..17].iter().for_each(|&x| left.push(x));
        data[17..].iter().for_each(|&x| right.push(x));
        left.merge(&right);

        assert_eq!(left.count(), whole.count());
        assert!((left.mean().unwrap() - whole.mean().unwrap()).abs() < 1e-12);
        assert!((left.variance().unwrap() - whole.variance().unwrap()).abs() < 1e-9);
    }

    #[test]
    fn empty_profile_is_insufficient_not_zero() {
        let p = StressProfile::new(ZoneId(4));
        assert_eq!(
            p.reliability(3),
            Reliability::Insufficient { count: 0, required: 3 }
        );
        let err = p.mean_stress(3).unwrap_err();
        assert!(matches!(err, StressError::InsufficientData { count: 0, required: 3, .. }));
        assert!(p.mean_features(3).is_err());
        assert_eq!(RunningStats::default().mean(), None);
    }

    #[test]
    fn profile_turns_reliable_at_threshold() {
        let mut p = StressProfile::new(ZoneId(1));
        let row = [1.0; FEATURE_DIM];
        p.record(&row, 2.0, None);
        p.record(&row, 4.0, None);
        assert!(!p.is_reliable(3));
        p.record(&row, 6.0, None);
        assert!(p.is_reliable(3));
        assert_eq!(p.mean_stress(3).unwrap(), 4.0);
    }

    #[test]
    fn buckets_track_independently() {
        let mut p = StressProfile::new(ZoneId(1));
        let row = [0.0; FEATURE_DIM];
        let morning = TimeBucket { day: DayKind::Weekday, hour: 8 };
        let night = TimeBucket { day: DayKind::Weekend, hour: 23 };
        for _ in 0..3 {
            p.record(&row, 1.0, Some(morning));
        }
        p.record(&row, 9.0, Some(night));
        assert_eq!(p.bucket_mean_stress(morning, 3).unwrap(), 1.0);
        assert!(p.bucket_mean_stress(night, 3).is_err());
        assert_eq!(p.count(), 4);
    }
}
