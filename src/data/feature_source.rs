use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use crate::analysis::{FeatureAggregator, IngestReport};
use crate::domain::FeatureVector;

/// Records pulled from a source in one go. Lines that did not parse are
/// reported by line number rather than failing the whole stream.
#[derive(Debug, Default)]
pub struct SourceBatch {
    pub records: Vec<FeatureVector>,
    pub malformed: Vec<(usize, String)>,
}

impl SourceBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.malformed.is_empty()
    }
}

/// Abstract interface for anything that produces feature vectors.
#[async_trait]
pub trait FeatureSource: Send {
    /// Next batch, or `None` once the source is exhausted.
    async fn next_batch(&mut self) -> Result<Option<SourceBatch>>;
}

/// JSON lines file, one `FeatureVector` per line. Blank lines are skipped.
pub struct JsonlFeatureSource {
    lines: Lines<BufReader<File>>,
    batch_size: usize,
    line_no: usize,
}

impl JsonlFeatureSource {
    pub async fn open(path: &Path, batch_size: usize) -> Result<Self> {
        let file = File::open(path)
            .await
            .with_context(|| format!("opening feature stream {:?}", path))?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            batch_size: batch_size.max(1),
            line_no: 0,
        })
    }
}

#[async_trait]
impl FeatureSource for JsonlFeatureSource {
    async fn next_batch(&mut self) -> Result<Option<SourceBatch>> {
        let mut batch = SourceBatch::default();
        while batch.records.len() + batch.malformed.len() < self.batch_size {
            let Some(line) = self.lines.next_line().await? else {
                break;
            };
            self.line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<FeatureVector>(trimmed) {
                Ok(fv) => batch.records.push(fv),
                Err(e) => batch.malformed.push((self.line_no, e.to_string())),
            }
        }
        Ok((!batch.is_empty()).then_some(batch))
    }
}

/// In-memory source, mostly for tests and replays.
pub struct VecFeatureSource {
    records: VecDeque<FeatureVector>,
    batch_size: usize,
}

impl VecFeatureSource {
    pub fn new(records: Vec<FeatureVector>, batch_size: usize) -> Self {
        Self {
            records: records.into(),
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl FeatureSource for VecFeatureSource {
    async fn next_batch(&mut self) -> Result<Option<SourceBatch>> {
        if self.records.is_empty() {
            return Ok(None);
        }
        let n = self.batch_size.min(self.records.len());
        Ok(Some(SourceBatch {
            records: self.records.drain(..n).collect(),
            malformed: Vec::new(),
        }))
    }
}

/// Pulls every batch from `source` into `aggregator`, in source order.
pub async fn drain_into<S>(source: &mut S, aggregator: &FeatureAggregator) -> Result<IngestReport>
where
    S: FeatureSource + ?Sized,
{
    let mut report = IngestReport::default();
    let mut batches = 0usize;
    while let Some(batch) = source.next_batch().await? {
        batches += 1;
        for (line, detail) in batch.malformed {
            report.absorb(aggregator.reject_malformed(format!("line {}: {}", line, detail)));
        }
        report.absorb(aggregator.ingest_batch_parallel(&batch.records));
    }
    log::info!(
        "Drained {} batch(es): {} accepted, {} rejected",
        batches,
        report.accepted,
        report.rejected
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ANALYSIS;
    use crate::domain::fixtures::record;
    use crate::domain::{SensorId, ZoneId};
    use std::io::Write;

    fn aggregator() -> FeatureAggregator {
        FeatureAggregator::new(
            ANALYSIS.aggregation,
            [(SensorId(1), ZoneId(1)), (SensorId(2), ZoneId(2))],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn jsonl_stream_counts_malformed_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..5 {
            writeln!(file, "{}", serde_json::to_string(&record(1, i, 0.5)).unwrap()).unwrap();
        }
        writeln!(file).unwrap();
        writeln!(file, "{{ not json").unwrap();
        writeln!(file, "{}", serde_json::to_string(&record(9, 0, 0.5)).unwrap()).unwrap();
        writeln!(file, "{}", serde_json::to_string(&record(2, 0, 0.2)).unwrap()).unwrap();
        file.flush().unwrap();

        let agg = aggregator();
        let mut source = JsonlFeatureSource::open(file.path(), 3).await.unwrap();
        let report = drain_into(&mut source, &agg).await.unwrap();

        assert_eq!(report.accepted, 6);
        assert_eq!(report.rejected, 2);
        assert_eq!(report.rejected_by_reason["malformed"], 1);
        assert_eq!(report.rejected_by_reason["unknown_source"], 1);
        assert_eq!(report.accepted_by_zone[&ZoneId(1)], 5);
        assert_eq!(agg.accepted(), 6);
        assert_eq!(agg.rejected(), 2);
    }

    #[tokio::test]
    async fn vec_source_matches_direct_ingestion() {
        let records: Vec<_> = (0..10)
            .map(|i| record(1 + (i % 2) as u64, i, 0.1 * i as f64))
            .collect();

        let direct = aggregator();
        direct.ingest_batch(&records);

        let streamed = aggregator();
        let mut source = VecFeatureSource::new(records, 4);
        drain_into(&mut source, &streamed).await.unwrap();

        for zone in [ZoneId(1), ZoneId(2)] {
            let a = direct.profile(zone).unwrap();
            let b = streamed.profile(zone).unwrap();
            assert_eq!(a.count(), b.count());
            let (ma, mb) = (
                a.mean_stress(1).unwrap(),
                b.mean_stress(1).unwrap(),
            );
            assert!((ma - mb).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let res = JsonlFeatureSource::open(Path::new("/no/such/features.jsonl"), 8).await;
        assert!(res.is_err());
    }
}
