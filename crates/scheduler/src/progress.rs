//! Per-stage progress and per-item results

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Progress of one named stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageProgress {
    pub completed: usize,
    pub total: usize,
    /// 0..=100
    pub percentage: u8,
}

impl StageProgress {
    /// Fresh progress for a batch of `total` items
    ///
    /// An empty batch is vacuously complete.
    pub fn for_batch(total: usize) -> Self {
        Self {
            completed: 0,
            total,
            percentage: if total == 0 { 100 } else { 0 },
        }
    }

    /// Count one more finished item
    ///
    /// `completed` never passes `total`.
    pub fn advance(&mut self) {
        if self.completed < self.total {
            self.completed += 1;
        }
        self.percentage = Self::percentage_of(self.completed, self.total);
    }

    /// Whether every item of the stage has finished
    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }

    fn percentage_of(completed: usize, total: usize) -> u8 {
        if total == 0 {
            return 100;
        }
        ((completed as f64 / total as f64) * 100.0).round().min(100.0) as u8
    }
}

impl Default for StageProgress {
    /// A stage that has never been submitted is vacuously complete
    fn default() -> Self {
        Self::for_batch(0)
    }
}

/// Outcome of preloading one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadResult {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub load_time_ms: u64,
    pub served_from_cache: bool,
}

impl PreloadResult {
    /// A successful load
    pub fn loaded(id: impl Into<String>, load_time_ms: u64) -> Self {
        Self {
            id: id.into(),
            success: true,
            error_kind: None,
            load_time_ms,
            served_from_cache: false,
        }
    }

    /// A cache hit
    pub fn cached(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: true,
            error_kind: None,
            load_time_ms: 0,
            served_from_cache: true,
        }
    }

    /// A failed load
    pub fn failed(id: impl Into<String>, kind: ErrorKind, load_time_ms: u64) -> Self {
        Self {
            id: id.into(),
            success: false,
            error_kind: Some(kind),
            load_time_ms,
            served_from_cache: false,
        }
    }
}

/// Aggregate statistics over every recorded result
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Mean load time of successful, non-cached loads
    pub average_load_time_ms: f64,
    pub cache_hits: usize,
}

impl PreloadStats {
    /// Summarize a set of results
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a PreloadResult>) -> Self {
        let mut stats = PreloadStats::default();
        let mut timed = 0usize;
        let mut total_time = 0u64;

        for result in results {
            stats.total += 1;
            if result.success {
                stats.successful += 1;
                if result.served_from_cache {
                    stats.cache_hits += 1;
                } else {
                    timed += 1;
                    total_time += result.load_time_ms;
                }
            } else {
                stats.failed += 1;
            }
        }

        if timed > 0 {
            stats.average_load_time_ms = total_time as f64 / timed as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_batch_is_complete() {
        let progress = StageProgress::for_batch(0);
        assert_eq!(progress.percentage, 100);
        assert!(progress.is_complete());
        assert_eq!(StageProgress::default(), progress);
    }

    #[test]
    fn test_advance_rounds_percentage() {
        let mut progress = StageProgress::for_batch(3);
        assert_eq!(progress.percentage, 0);

        progress.advance();
        assert_eq!(progress.percentage, 33);
        progress.advance();
        assert_eq!(progress.percentage, 67);
        progress.advance();
        assert_eq!(progress.percentage, 100);
        assert!(progress.is_complete());
    }

    #[test]
    fn test_advance_saturates_at_total() {
        let mut progress = StageProgress::for_batch(1);
        progress.advance();
        progress.advance();
        assert_eq!(progress.completed, 1);
    }

    #[test]
    fn test_stats_from_results() {
        let results = vec![
            PreloadResult::loaded("a", 100),
            PreloadResult::loaded("b", 300),
            PreloadResult::cached("c"),
            PreloadResult::failed("d", ErrorKind::Timeout, 15_000),
        ];

        let stats = PreloadStats::from_results(&results);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.successful, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.cache_hits, 1);
        assert!((stats.average_load_time_ms - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_result_json_shape() {
        let json = serde_json::to_value(PreloadResult::failed("x", ErrorKind::Aborted, 5)).unwrap();
        assert_eq!(json["errorKind"], "aborted");
        assert_eq!(json["servedFromCache"], false);
        assert_eq!(json["loadTimeMs"], 5);
    }
}
