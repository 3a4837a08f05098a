use rtls_core::registry_contracts::ReaderRecord;
use rtls_locator::LocationDirectory;
use rtls_storage::{RegistryStore, StorageError};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Location names of registered readers, held in memory so location queries
/// never reach SQLite. Loaded once at startup and kept current by reader
/// registration.
#[derive(Debug, Default)]
pub struct RegisteredLocations {
    names: RwLock<BTreeMap<String, String>>,
}

impl RegisteredLocations {
    pub fn load(store: &RegistryStore) -> Result<Self, StorageError> {
        let names = store
            .list_readers()?
            .into_iter()
            .map(|reader| (reader.reader_id, reader.location_name))
            .collect();
        Ok(Self {
            names: RwLock::new(names),
        })
    }

    pub fn remember(&self, reader: &ReaderRecord) {
        let mut names = self.names.write().unwrap_or_else(PoisonError::into_inner);
        names.insert(reader.reader_id.clone(), reader.location_name.clone());
    }

    pub fn len(&self) -> usize {
        self.names
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl LocationDirectory for RegisteredLocations {
    fn location_name(&self, reader_id: &str) -> Option<String> {
        self.names
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(reader_id)
            .cloned()
    }
}
