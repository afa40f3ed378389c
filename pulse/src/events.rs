use crate::cache::FetchOutcome;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrefetchEvent {
    Completed(PrefetchCompletedEvent),
    Skipped(PrefetchSkippedEvent),
}

impl PrefetchEvent {
    pub fn user_id(&self) -> &str {
        match self {
            PrefetchEvent::Completed(e) => &e.user_id,
            PrefetchEvent::Skipped(e) => &e.user_id,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            PrefetchEvent::Completed(e) => e.timestamp,
            PrefetchEvent::Skipped(e) => e.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefetchCompletedEvent {
    pub user_id: String,
    pub report: PrefetchReport,
    pub forced: bool,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Throttled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefetchSkippedEvent {
    pub user_id: String,
    pub reason: SkipReason,
    pub last_run: u64,
    pub timestamp: u64,
}

/// Per-outcome task counts of one prefetch batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefetchReport {
    pub refreshed: usize,
    pub fresh: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl PrefetchReport {
    pub fn from_outcomes(outcomes: &[FetchOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut report, outcome| {
            match outcome {
                FetchOutcome::Refreshed => report.refreshed += 1,
                FetchOutcome::Fresh => report.fresh += 1,
                FetchOutcome::Rejected => report.rejected += 1,
                FetchOutcome::Failed => report.failed += 1,
            }
            report
        })
    }

    pub fn total(&self) -> usize {
        self.refreshed + self.fresh + self.rejected + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts_outcomes() {
        let report = PrefetchReport::from_outcomes(&[
            FetchOutcome::Refreshed,
            FetchOutcome::Refreshed,
            FetchOutcome::Fresh,
            FetchOutcome::Failed,
        ]);

        assert_eq!(report.refreshed, 2);
        assert_eq!(report.fresh, 1);
        assert_eq!(report.rejected, 0);
        assert_eq!(report.failed, 1);
        assert_eq!(report.total(), 4);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = PrefetchEvent::Skipped(PrefetchSkippedEvent {
            user_id: "42".to_string(),
            reason: SkipReason::Throttled,
            last_run: 0,
            timestamp: 60_000,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "skipped");
        assert_eq!(json["reason"], "throttled");
        assert_eq!(event.user_id(), "42");
        assert_eq!(event.timestamp(), 60_000);
    }
}
