use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use chrono::TimeDelta;
use dashmap::DashMap;
use serde::{Serialize, Serializer};
use tokio::sync::Mutex;

/// Collects outcomes from the download tasks while a run is in progress.
///
/// Tasks only append; the contents are read once, through [ResultAggregator::finish]
/// or [ResultAggregator::snapshot], after every task has completed.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    downloaded: DashMap<String, String>,
    missing: Mutex<Vec<String>>,
}

impl ResultAggregator {
    /// Record that `hash` was written to disk after being fetched from `endpoint`
    pub fn record_download(&self, hash: &str, endpoint: &str) {
        self.downloaded.insert(hash.to_string(), endpoint.to_string());
    }

    /// Record that no endpoint could provide `hash`
    pub async fn record_missing(&self, hash: &str) {
        self.missing.lock().await.push(hash.to_string());
    }

    /// Consume the aggregator into the final, read-only result
    pub fn finish(self, elapsed: TimeDelta) -> FetchResult {
        FetchResult {
            downloaded: self.downloaded.into_iter().collect(),
            missing: self.missing.into_inner(),
            elapsed,
        }
    }

    /// Copy of the outcomes recorded so far, for when the aggregator is still shared
    pub async fn snapshot(&self, elapsed: TimeDelta) -> FetchResult {
        FetchResult {
            downloaded: self
                .downloaded
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
            missing: self.missing.lock().await.clone(),
            elapsed,
        }
    }
}

/// Outcome of a complete run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResult {
    /// Downloaded hashes and the name of the endpoint which provided each one
    pub downloaded: BTreeMap<String, String>,

    /// Hashes which none of the endpoints had
    pub missing: Vec<String>,

    /// Wall clock time from the start of the run until the last task finished
    #[serde(serialize_with = "serialize_elapsed")]
    pub elapsed: TimeDelta,
}

impl FetchResult {
    /// Total number of hashes handled during the run
    #[inline]
    pub fn total(&self) -> usize {
        self.downloaded.len() + self.missing.len()
    }

    /// Elapsed time as `hh:mm:ss`
    pub fn elapsed_display(&self) -> String {
        ElapsedTime(self.elapsed).to_string()
    }
}

struct ElapsedTime(TimeDelta);

impl Display for ElapsedTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let seconds = self.0.num_seconds().max(0);
        write!(
            f,
            "{:02}:{:02}:{:02}",
            seconds / 3600,
            (seconds / 60) % 60,
            seconds % 60
        )
    }
}

fn serialize_elapsed<S>(elapsed: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&ElapsedTime(*elapsed).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    #[test]
    fn elapsed_format() {
        let result = ResultAggregator::default().finish(TimeDelta::seconds(3 * 3600 + 25 * 60 + 7));
        assert_eq!(result.elapsed_display(), "03:25:07");

        let result = ResultAggregator::default().finish(TimeDelta::milliseconds(999));
        assert_eq!(result.elapsed_display(), "00:00:00");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_are_kept() {
        let aggregator = Arc::new(ResultAggregator::default());

        let mut handles = Vec::new();
        for i in 0..64 {
            let local = aggregator.clone();
            handles.push(tokio::spawn(async move {
                let hash = format!("hash{i}");
                if i % 2 == 0 {
                    local.record_download(&hash, "MalShare");
                } else {
                    local.record_missing(&hash).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let aggregator = Arc::try_unwrap(aggregator).unwrap();
        let result = aggregator.finish(TimeDelta::zero());
        assert_eq!(result.downloaded.len(), 32);
        assert_eq!(result.missing.len(), 32);
        assert_eq!(result.total(), 64);
        assert_eq!(result.downloaded["hash0"], "MalShare");
    }

    #[test]
    fn report_json() {
        let aggregator = ResultAggregator::default();
        aggregator.record_download("h1", "Triage");
        let result = aggregator.finish(TimeDelta::seconds(61));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["downloaded"]["h1"], "Triage");
        assert_eq!(json["missing"], serde_json::json!([]));
        assert_eq!(json["elapsed"], "00:01:01");
    }

    #[tokio::test]
    async fn snapshot_of_shared_aggregator() {
        let aggregator = Arc::new(ResultAggregator::default());
        let still_held = aggregator.clone();
        aggregator.record_download("h1", "Koodous");
        aggregator.record_missing("h2").await;

        let result = still_held.snapshot(TimeDelta::seconds(5)).await;
        assert_eq!(result.downloaded["h1"], "Koodous");
        assert_eq!(result.missing, vec!["h2".to_string()]);
        assert_eq!(result.elapsed_display(), "00:00:05");

        // Later records don't change a snapshot already taken
        aggregator.record_missing("h3").await;
        assert_eq!(result.total(), 2);
        assert_eq!(still_held.snapshot(TimeDelta::zero()).await.total(), 3);
    }
}
