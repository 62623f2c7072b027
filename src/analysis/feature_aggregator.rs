use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use super::zone_tessellator::Tessellation;
use crate::config::{AggregationConfig, DF};
use crate::domain::{FEATURE_DIM, FeatureVector, SensorId, ZoneId};
use crate::error::{StressError, StressResult, ValidationError};
use crate::models::{ProfileSnapshot, Reliability, StressProfile, TimeBucket};

/// A dropped record, kept for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// None when the record could not be parsed at all.
    pub source: Option<SensorId>,
    pub timestamp_ms: Option<i64>,
    pub error: ValidationError,
}

/// Outcome of one batch. Batches never fail; bad records land here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub accepted: u64,
    pub rejected: u64,
    pub rejected_by_reason: BTreeMap<&'static str, u64>,
    pub accepted_by_zone: BTreeMap<ZoneId, u64>,
}

impl IngestReport {
    fn accept(&mut self, zone: ZoneId) {
        self.accepted += 1;
        *self.accepted_by_zone.entry(zone).or_default() += 1;
    }

    fn reject(&mut self, err: &ValidationError) {
        self.rejected += 1;
        *self.rejected_by_reason.entry(err.reason_key()).or_default() += 1;
    }

    pub fn total(&self) -> u64 {
        self.accepted + self.rejected
    }

    /// Folds another report into this one.
    pub fn absorb(&mut self, other: IngestReport) {
        self.accepted += other.accepted;
        self.rejected += other.rejected;
        for (reason, n) in other.rejected_by_reason {
            *self.rejected_by_reason.entry(reason).or_default() += n;
        }
        for (zone, n) in other.accepted_by_zone {
            *self.accepted_by_zone.entry(zone).or_default() += n;
        }
    }
}

#[derive(Debug, Default)]
struct RejectionLog {
    by_reason: BTreeMap<&'static str, u64>,
    recent: VecDeque<Rejection>,
}

/// Folded observation ready to be applied to a zone.
struct Observation {
    row: [f64; FEATURE_DIM],
    stress: f64,
    bucket: Option<TimeBucket>,
}

/// Online per-zone aggregation of feature vectors.
///
/// Each zone has its own lock, so writers to different zones never contend
/// and writes to one zone apply in the order they arrive. Memory stays
/// O(zones): records are folded into running statistics and dropped.
pub struct FeatureAggregator {
    config: AggregationConfig,
    zones: BTreeMap<ZoneId, Mutex<StressProfile>>,
    sources: HashMap<SensorId, ZoneId>,
    accepted: AtomicU64,
    rejected: AtomicU64,
    log: Mutex<RejectionLog>,
}

impl FeatureAggregator {
    /// `sources` maps every accepted source id (camera or zone) to its zone.
    pub fn new<I>(config: AggregationConfig, sources: I) -> StressResult<Self>
    where
        I: IntoIterator<Item = (SensorId, ZoneId)>,
    {
        config.validate()?;
        let sources: HashMap<SensorId, ZoneId> = sources.into_iter().collect();
        let zones = sources
            .values()
            .map(|&z| (z, Mutex::new(StressProfile::new(z))))
            .collect();
        Ok(Self {
            config,
            zones,
            sources,
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            log: Mutex::new(RejectionLog::default()),
        })
    }

    pub fn for_tessellation(config: AggregationConfig, tessellation: &Tessellation) -> StressResult<Self> {
        Self::new(config, tessellation.sensor_zones())
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Validates and folds one record. A rejected record is counted and its
    /// `DataValidation` error returned; the aggregator state is untouched.
    pub fn ingest(&self, fv: &FeatureVector) -> StressResult<ZoneId> {
        let (zone, obs) = match self.prepare(fv) {
            Ok(v) => v,
            Err(err) => {
                self.record_rejection(Some(fv), err.clone());
                return Err(StressError::DataValidation(err));
            }
        };
        self.apply(zone, std::iter::once(obs));
        self.accepted.fetch_add(1, Ordering::Relaxed);
        Ok(zone)
    }

    /// Sequential batch ingestion in arrival order.
    pub fn ingest_batch(&self, batch: &[FeatureVector]) -> IngestReport {
        let mut report = IngestReport::default();
        for fv in batch {
            match self.ingest(fv) {
                Ok(zone) => report.accept(zone),
                Err(StressError::DataValidation(err)) => report.reject(&err),
                Err(err) => log::error!("record from {} dropped: {}", fv.source, err),
            }
        }
        self.log_report("batch", &report);
        report
    }

    /// Groups the batch by zone (arrival order kept inside each group) and
    /// folds the groups concurrently.
    pub fn ingest_batch_parallel(&self, batch: &[FeatureVector]) -> IngestReport {
        let prepared: Vec<Result<(ZoneId, Observation), ValidationError>> =
            batch.par_iter().map(|fv| self.prepare(fv)).collect();

        let mut report = IngestReport::default();
        let mut groups: BTreeMap<ZoneId, Vec<Observation>> = BTreeMap::new();
        for (fv, outcome) in batch.iter().zip(prepared) {
            match outcome {
                Ok((zone, obs)) => {
                    report.accept(zone);
                    groups.entry(zone).or_default().push(obs);
                }
                Err(err) => {
                    report.reject(&err);
                    self.record_rejection(Some(fv), err);
                }
            }
        }

        groups
            .into_par_iter()
            .for_each(|(zone, observations)| self.apply(zone, observations));
        self.accepted.fetch_add(report.accepted, Ordering::Relaxed);

        self.log_report("parallel batch", &report);
        report
    }

    fn prepare(&self, fv: &FeatureVector) -> Result<(ZoneId, Observation), ValidationError> {
        let zone = *self
            .sources
            .get(&fv.source)
            .ok_or(ValidationError::UnknownSource(fv.source))?;
        fv.validate(self.config.embedding_dim)?;
        let bucket = if self.config.time_buckets {
            TimeBucket::from_timestamp(fv.timestamp_ms, self.config.utc_offset_hours)
        } else {
            None
        };
        Ok((
            zone,
            Observation {
                row: fv.flatten(),
                stress: fv.stress_proxy(),
                bucket,
            },
        ))
    }

    fn apply<I>(&self, zone: ZoneId, observations: I)
    where
        I: IntoIterator<Item = Observation>,
    {
        // Zones come from `sources`, so the lookup only misses on a logic error
        let Some(slot) = self.zones.get(&zone) else {
            log::error!("zone {} has no profile slot", zone);
            return;
        };
        let mut profile = slot.lock().unwrap_or_else(PoisonError::into_inner);
        for obs in observations {
            profile.record(&obs.row, obs.stress, obs.bucket);
        }
    }

    /// Counts a record that never parsed into a feature vector.
    pub fn reject_malformed(&self, detail: impl Into<String>) -> IngestReport {
        let err = ValidationError::Malformed(detail.into());
        let mut report = IngestReport::default();
        report.reject(&err);
        self.record_rejection(None, err);
        report
    }

    fn record_rejection(&self, fv: Option<&FeatureVector>, error: ValidationError) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        if DF.log_aggregation {
            match fv {
                Some(fv) => log::debug!("Rejected record from {} at {}: {}", fv.source, fv.timestamp_ms, error),
                None => log::debug!("Rejected record: {}", error),
            }
        }
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        *log.by_reason.entry(error.reason_key()).or_default() += 1;
        log.recent.push_back(Rejection {
            source: fv.map(|f| f.source),
            timestamp_ms: fv.map(|f| f.timestamp_ms),
            error,
        });
        while log.recent.len() > self.config.max_rejection_samples {
            log.recent.pop_front();
        }
    }

    fn log_report(&self, label: &str, report: &IngestReport) {
        if report.rejected > 0 {
            log::warn!(
                "Ingested {} {}: {} accepted, {} rejected {:?}",
                label,
                report.total(),
                report.accepted,
                report.rejected,
                report.rejected_by_reason
            );
        } else if DF.log_aggregation {
            log::info!("Ingested {} {}: all accepted", label, report.total());
        }
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn rejection_counts(&self) -> BTreeMap<&'static str, u64> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_reason
            .clone()
    }

    /// The most recent rejections, oldest first.
    pub fn recent_rejections(&self) -> Vec<Rejection> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recent
            .iter()
            .cloned()
            .collect()
    }

    pub fn zone_ids(&self) -> impl Iterator<Item = ZoneId> + '_ {
        self.zones.keys().copied()
    }

    /// Copy of one zone's profile.
    pub fn profile(&self, zone: ZoneId) -> Option<StressProfile> {
        self.zones
            .get(&zone)
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    pub fn reliability(&self, zone: ZoneId) -> StressResult<Reliability> {
        self.profile(zone)
            .map(|p| p.reliability(self.config.min_reliable_samples))
            .ok_or_else(|| StressError::configuration(format!("unknown zone {}", zone)))
    }

    /// Mean stress proxy of a zone, `InsufficientData` below the threshold.
    pub fn mean_stress(&self, zone: ZoneId) -> StressResult<f64> {
        match self.profile(zone) {
            Some(p) => p.mean_stress(self.config.min_reliable_samples),
            None => Err(StressError::insufficient(
                format!("zone {}", zone),
                0,
                self.config.min_reliable_samples.max(1),
            )),
        }
    }

    /// Immutable copy of every profile, for the learner and the stress map.
    pub fn snapshot(&self) -> ProfileSnapshot {
        let profiles = self
            .zones
            .iter()
            .map(|(z, m)| (*z, m.lock().unwrap_or_else(PoisonError::into_inner).clone()))
            .collect();
        ProfileSnapshot {
            profiles,
            min_reliable_samples: self.config.min_reliable_samples,
            accepted: self.accepted(),
            rejected: self.rejected(),
        }
    }
}
