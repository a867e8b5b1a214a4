use crate::domain::models::SubjectCatalogEntry;
use crate::infrastructure::error::InfraError;
use std::sync::Mutex;

pub trait SubjectCacheRepository: Send + Sync {
    fn load(&self) -> Result<Option<Vec<SubjectCatalogEntry>>, InfraError>;
    fn replace(&self, entries: Vec<SubjectCatalogEntry>) -> Result<(), InfraError>;
}

#[derive(Debug, Default)]
pub struct InMemorySubjectCacheRepository {
    entries: Mutex<Option<Vec<SubjectCatalogEntry>>>,
}

impl SubjectCacheRepository for InMemorySubjectCacheRepository {
    fn load(&self) -> Result<Option<Vec<SubjectCatalogEntry>>, InfraError> {
        let entries = self
            .entries
            .lock()
            .map_err(|error| InfraError::Store(format!("subject cache lock poisoned: {error}")))?;
        Ok(entries.clone())
    }

    fn replace(&self, entries: Vec<SubjectCatalogEntry>) -> Result<(), InfraError> {
        let mut cached = self
            .entries
            .lock()
            .map_err(|error| InfraError::Store(format!("subject cache lock poisoned: {error}")))?;
        *cached = Some(entries);
        Ok(())
    }
}
