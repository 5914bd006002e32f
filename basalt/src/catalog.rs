//! The table registry: names, ids, schemas and file handles.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::errors::DbError;
use crate::heap_file::HeapFile;
use crate::schema::Schema;

/// Tracks every table in the database: a name↔id bimap plus the heap file
/// (which carries its schema) per table id. Shared behind an `Arc`; interior
/// locking keeps registration and lookup safe from any thread.
#[derive(Default)]
pub struct Catalog {
    inner: RwLock<CatalogState>,
}

#[derive(Default)]
struct CatalogState {
    files: HashMap<u32, Arc<HeapFile>>,
    names: HashMap<String, u32>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table. On a name conflict the newest registration wins;
    /// the displaced table stays reachable by id.
    pub fn add_table(&self, file: Arc<HeapFile>, name: &str) {
        let id = file.id();
        let mut state = self.inner.write().unwrap();
        // Force-put into the bimap: drop any stale name for this id first so
        // every id has at most one name.
        state.names.retain(|_, mapped| *mapped != id);
        state.names.insert(name.to_string(), id);
        state.files.insert(id, file);
    }

    pub fn table_id(&self, name: &str) -> Result<u32, DbError> {
        self.inner
            .read()
            .unwrap()
            .names
            .get(name)
            .copied()
            .ok_or_else(|| DbError::NoSuchElement(format!("no table named {name}")))
    }

    pub fn table_name(&self, id: u32) -> Result<String, DbError> {
        self.inner
            .read()
            .unwrap()
            .names
            .iter()
            .find(|(_, mapped)| **mapped == id)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| DbError::NoSuchElement(format!("no table with id {id}")))
    }

    pub fn file(&self, id: u32) -> Result<Arc<HeapFile>, DbError> {
        self.inner
            .read()
            .unwrap()
            .files
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NoSuchElement(format!("no table with id {id}")))
    }

    pub fn schema(&self, id: u32) -> Result<Arc<Schema>, DbError> {
        Ok(self.file(id)?.schema().clone())
    }

    pub fn table_ids(&self) -> Vec<u32> {
        self.inner.read().unwrap().files.keys().copied().collect()
    }

    pub fn clear(&self) {
        let mut state = self.inner.write().unwrap();
        state.files.clear();
        state.names.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use tempfile::tempdir;

    fn open_table(dir: &std::path::Path, name: &str) -> Arc<HeapFile> {
        let schema = Arc::new(Schema::of_types(&[FieldType::Int]).unwrap());
        Arc::new(HeapFile::open(dir.join(format!("{name}.dat")), schema).unwrap())
    }

    #[test]
    fn registration_and_lookup() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::new();
        let file = open_table(dir.path(), "users");
        let id = file.id();
        catalog.add_table(file, "users");

        assert_eq!(catalog.table_id("users").unwrap(), id);
        assert_eq!(catalog.table_name(id).unwrap(), "users");
        assert_eq!(catalog.file(id).unwrap().id(), id);
        assert_eq!(catalog.schema(id).unwrap().num_fields(), 1);
    }

    #[test]
    fn lookups_miss_with_no_such_element() {
        let catalog = Catalog::new();
        assert!(matches!(
            catalog.table_id("ghost"),
            Err(DbError::NoSuchElement(_))
        ));
        assert!(matches!(catalog.file(9), Err(DbError::NoSuchElement(_))));
        assert!(matches!(
            catalog.table_name(9),
            Err(DbError::NoSuchElement(_))
        ));
    }

    #[test]
    fn newest_registration_wins_a_name() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::new();
        let first = open_table(dir.path(), "a");
        let second = open_table(dir.path(), "b");
        let (first_id, second_id) = (first.id(), second.id());

        catalog.add_table(first, "t");
        catalog.add_table(second, "t");

        assert_eq!(catalog.table_id("t").unwrap(), second_id);
        // The displaced table is still reachable by id, just unnamed.
        assert!(catalog.file(first_id).is_ok());
        assert!(catalog.table_name(first_id).is_err());
    }

    #[test]
    fn clear_empties_everything() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::new();
        let file = open_table(dir.path(), "t");
        let id = file.id();
        catalog.add_table(file, "t");
        catalog.clear();
        assert!(catalog.file(id).is_err());
        assert!(catalog.table_ids().is_empty());
    }
}
