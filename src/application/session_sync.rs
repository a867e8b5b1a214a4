use crate::domain::models::{NewStudySession, StudySession};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::session_feed_client::{ExternalFeedBatch, SessionFeedClient};
use crate::infrastructure::session_mapper::{
    ExternalSessionRecord, RecordRejection, decode_external_record,
};
use crate::infrastructure::session_store::SessionStore;
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::{Duration as TokioDuration, sleep};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

fn should_retry(error: &InfraError) -> bool {
    match error {
        InfraError::Feed(message) => {
            let message = message.to_ascii_lowercase();
            message.contains("network error")
                || message.contains("timeout")
                || message.contains("timed out")
                || message.contains("temporarily unavailable")
                || message.contains("connection reset")
        }
        _ => false,
    }
}

pub async fn fetch_feed_with_retry<C>(
    client: &C,
    retry_policy: &RetryPolicy,
) -> Result<ExternalFeedBatch, InfraError>
where
    C: SessionFeedClient + ?Sized,
{
    let max_attempts = retry_policy.max_attempts.max(1);
    let mut attempt: u8 = 0;

    loop {
        match client.fetch_sessions().await {
            Ok(batch) => return Ok(batch),
            Err(error) if should_retry(&error) && attempt + 1 < max_attempts => {
                let delay = retry_policy
                    .base_delay_ms
                    .saturating_mul(2u64.saturating_pow(attempt as u32));
                tracing::warn!(%error, attempt = attempt + 1, delay_ms = delay, "retrying session feed");
                sleep(TokioDuration::from_millis(delay)).await;
                attempt = attempt.saturating_add(1);
            }
            Err(error) => return Err(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationPlan {
    pub to_insert: Vec<NewStudySession>,
    pub skipped_invalid: usize,
    pub skipped_duplicate: usize,
    pub rejections: Vec<(String, RecordRejection)>,
}

/// Converts feed records into insertable sessions. Duplicates are checked against
/// `existing` only, so two matching records in one batch are both kept.
pub fn reconcile_records(
    records: &[ExternalSessionRecord],
    existing: &[StudySession],
    local: Tz,
) -> ReconciliationPlan {
    let mut plan = ReconciliationPlan {
        to_insert: Vec::new(),
        skipped_invalid: 0,
        skipped_duplicate: 0,
        rejections: Vec::new(),
    };

    for record in records {
        let candidate = match decode_external_record(record, local) {
            Ok(candidate) => candidate,
            Err(rejection) => {
                plan.skipped_invalid += 1;
                plan.rejections.push((record.label(), rejection));
                continue;
            }
        };

        if existing.iter().any(|session| candidate.duplicates(session)) {
            plan.skipped_duplicate += 1;
            continue;
        }
        plan.to_insert.push(candidate);
    }

    plan
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub inserted: usize,
    pub skipped_invalid: usize,
    pub skipped_duplicate: usize,
    pub failed_inserts: usize,
}

pub struct SessionSyncService<C, S>
where
    C: SessionFeedClient + ?Sized,
    S: SessionStore + ?Sized,
{
    feed_client: Arc<C>,
    store: Arc<S>,
    timezone: Tz,
    retry_policy: RetryPolicy,
}

impl<C, S> SessionSyncService<C, S>
where
    C: SessionFeedClient + ?Sized,
    S: SessionStore + ?Sized,
{
    pub fn new(feed_client: Arc<C>, store: Arc<S>) -> Self {
        Self {
            feed_client,
            store,
            timezone: Tz::UTC,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub async fn sync(&self) -> Result<SyncReport, InfraError> {
        let batch = fetch_feed_with_retry(self.feed_client.as_ref(), &self.retry_policy).await?;
        let existing = self.store.list_all()?;
        let plan = reconcile_records(&batch.records, &existing, self.timezone);

        for (label, rejection) in &plan.rejections {
            tracing::debug!(record = %label, %rejection, "discarding feed record");
        }

        let mut report = SyncReport {
            inserted: 0,
            skipped_invalid: plan.skipped_invalid + batch.malformed,
            skipped_duplicate: plan.skipped_duplicate,
            failed_inserts: 0,
        };
        for candidate in &plan.to_insert {
            match self.store.insert(candidate) {
                Ok(_) => report.inserted += 1,
                Err(error) => {
                    tracing::warn!(%error, subject = %candidate.subject_name, "failed to store synced session");
                    report.failed_inserts += 1;
                }
            }
        }

        tracing::info!(
            inserted = report.inserted,
            skipped_invalid = report.skipped_invalid,
            skipped_duplicate = report.skipped_duplicate,
            failed_inserts = report.failed_inserts,
            "session sync finished"
        );
        Ok(report)
    }
}
