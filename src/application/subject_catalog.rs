use crate::application::session_sync::{RetryPolicy, fetch_feed_with_retry};
use crate::domain::models::SubjectCatalogEntry;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::session_feed_client::SessionFeedClient;
use crate::infrastructure::session_mapper::extract_distinct_subjects;
use crate::infrastructure::subject_cache::SubjectCacheRepository;
use std::sync::Arc;

pub struct SubjectCatalogService<C, R>
where
    C: SessionFeedClient + ?Sized,
    R: SubjectCacheRepository + ?Sized,
{
    feed_client: Arc<C>,
    cache: Arc<R>,
    retry_policy: RetryPolicy,
}

impl<C, R> SubjectCatalogService<C, R>
where
    C: SessionFeedClient + ?Sized,
    R: SubjectCacheRepository + ?Sized,
{
    pub fn new(feed_client: Arc<C>, cache: Arc<R>) -> Self {
        Self {
            feed_client,
            cache,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub async fn refresh(&self) -> Result<Vec<SubjectCatalogEntry>, InfraError> {
        let batch = match fetch_feed_with_retry(self.feed_client.as_ref(), &self.retry_policy).await {
            Ok(batch) => batch,
            Err(error) => {
                tracing::warn!(%error, "subject catalog refresh failed; keeping cached catalog");
                return Err(error);
            }
        };

        let entries = extract_distinct_subjects(&batch.records);
        self.cache.replace(entries.clone())?;
        tracing::info!(subjects = entries.len(), "subject catalog refreshed");
        Ok(entries)
    }

    pub async fn subjects(&self) -> Result<Vec<SubjectCatalogEntry>, InfraError> {
        if let Some(entries) = self.cache.load()? {
            return Ok(entries);
        }
        match self.refresh().await {
            Ok(entries) => Ok(entries),
            Err(InfraError::Feed(_)) => Ok(Vec::new()),
            Err(error) => Err(error),
        }
    }
}
