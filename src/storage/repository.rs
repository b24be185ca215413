use crate::model::{Listing, ListingFilter, StorageError};
use crate::storage::sqlite::SqliteStorage;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

/// Read-side view of the dataset. The table is loaded on first access and the
/// snapshot is reused for the rest of the process; later writes to the file
/// are not observed.
pub struct DatasetRepository {
    path: PathBuf,
    snapshot: OnceLock<Arc<Vec<Listing>>>,
}

impl DatasetRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            snapshot: OnceLock::new(),
        }
    }

    pub fn listings(&self) -> Result<Arc<Vec<Listing>>, StorageError> {
        if let Some(snapshot) = self.snapshot.get() {
            return Ok(snapshot.clone());
        }

        let storage = SqliteStorage::new(&self.path)?;
        let mut scan = storage.scan(ListingFilter::default()).with_batch_size(1024);
        let rows = match scan.by_ref().collect::<Result<Vec<_>, _>>() {
            Ok(rows) => rows,
            Err(e) => {
                // a concurrent scrape can hold the write lock mid-walk
                warn!("Dataset read interrupted ({}); reading again from the start", e);
                scan.restart();
                scan.collect::<Result<Vec<_>, _>>()?
            }
        };
        info!("Loaded {} listings from {}", rows.len(), self.path.display());

        Ok(self.snapshot.get_or_init(|| Arc::new(rows)).clone())
    }

    pub fn search(&self, filter: &ListingFilter) -> Result<Vec<Listing>, StorageError> {
        Ok(self
            .listings()?
            .iter()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect())
    }

    pub fn find_by_link(&self, link: &str) -> Result<Option<Listing>, StorageError> {
        Ok(self.listings()?.iter().find(|l| l.link() == link.trim()).cloned())
    }
}
