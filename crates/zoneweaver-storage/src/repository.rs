use crate::{KVStore, KeyEncoder, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Arc;

/// Typed-table CRUD layer over a `KVStore`, implementing the find-by-id /
/// find-one-by-where / find-all-by-where-with-ordering-and-limit /
/// create / bulk-create-or-update / update-by-where / destroy-by-where
/// surface the persistence layer is required to expose.
///
/// Rows are stored as JSON under `{table}/{id}`; predicates run against
/// deserialized values rather than a secondary-index scheme, which keeps
/// the layer generic across the very different record shapes it holds
/// (Task, Zone, Recipe, storage time-series rows, ...) at the cost of a
/// full-table scan per query. For this system's scale (single host,
/// thousands of rows at most) that tradeoff is the right one.
pub struct Repository<T> {
    store: Arc<dyn KVStore>,
    table: &'static str,
    _marker: PhantomData<T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            table: self.table,
            _marker: PhantomData,
        }
    }
}

impl<T> Repository<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn KVStore>, table: &'static str) -> Self {
        Self {
            store,
            table,
            _marker: PhantomData,
        }
    }

    /// Insert or overwrite a single row by natural id.
    pub fn create(&self, id: &str, value: &T) -> Result<()> {
        let key = KeyEncoder::encode(self.table, id);
        let bytes = serde_json::to_vec(value)?;
        self.store.put(key.as_bytes(), &bytes)
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<T>> {
        let key = KeyEncoder::encode(self.table, id);
        match self.store.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every row in the table, in storage order.
    pub fn find_all(&self) -> Result<Vec<T>> {
        let prefix = KeyEncoder::encode_prefix(self.table);
        let entries = self.store.scan(prefix.as_bytes())?;
        entries
            .into_iter()
            .map(|(_, v)| serde_json::from_slice(&v).map_err(Into::into))
            .collect()
    }

    pub fn find_one_by(&self, predicate: impl Fn(&T) -> bool) -> Result<Option<T>> {
        Ok(self.find_all()?.into_iter().find(|v| predicate(v)))
    }

    /// All matching rows, optionally sorted and capped.
    pub fn find_all_by(
        &self,
        predicate: impl Fn(&T) -> bool,
        order_by: Option<impl Fn(&T, &T) -> Ordering>,
        limit: Option<usize>,
    ) -> Result<Vec<T>> {
        let mut rows: Vec<T> = self.find_all()?.into_iter().filter(|v| predicate(v)).collect();
        if let Some(cmp) = order_by {
            rows.sort_by(cmp);
        }
        if let Some(n) = limit {
            rows.truncate(n);
        }
        Ok(rows)
    }

    /// Insert-or-update every `(id, value)` pair in one batch. Rows that
    /// already exist are overwritten; new ones are created.
    pub fn bulk_upsert(&self, rows: &[(String, T)]) -> Result<()> {
        for (id, value) in rows {
            self.create(id, value)?;
        }
        Ok(())
    }

    /// Apply `updater` to every row matching `predicate`, writing each
    /// back under its original id. Returns the number of rows touched.
    pub fn update_by(&self, id_of: impl Fn(&T) -> String, predicate: impl Fn(&T) -> bool, updater: impl Fn(&mut T)) -> Result<usize> {
        let mut touched = 0usize;
        for mut row in self.find_all()? {
            if predicate(&row) {
                updater(&mut row);
                let id = id_of(&row);
                self.create(&id, &row)?;
                touched += 1;
            }
        }
        Ok(touched)
    }

    /// Delete every row matching `predicate`. Returns the number removed.
    pub fn destroy_by(&self, id_of: impl Fn(&T) -> String, predicate: impl Fn(&T) -> bool) -> Result<usize> {
        let mut removed = 0usize;
        for row in self.find_all()? {
            if predicate(&row) {
                let id = id_of(&row);
                let key = KeyEncoder::encode(self.table, &id);
                self.store.delete(key.as_bytes())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn destroy_by_id(&self, id: &str) -> Result<()> {
        let key = KeyEncoder::encode(self.table, id);
        self.store.delete(key.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RedbBackend;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Widget {
        id: String,
        count: u32,
    }

    fn repo() -> (tempfile::TempDir, Repository<Widget>) {
        let dir = tempdir().unwrap();
        let backend = RedbBackend::new(dir.path().join("test.redb")).unwrap();
        let repo = Repository::new(Arc::new(backend), "widgets");
        (dir, repo)
    }

    #[test]
    fn test_create_and_find_by_id() {
        let (_dir, repo) = repo();
        let w = Widget { id: "a".into(), count: 3 };
        repo.create(&w.id, &w).unwrap();
        assert_eq!(repo.find_by_id("a").unwrap(), Some(w));
        assert_eq!(repo.find_by_id("missing").unwrap(), None);
    }

    #[test]
    fn test_find_all_by_with_order_and_limit() {
        let (_dir, repo) = repo();
        for (id, count) in [("a", 3), ("b", 1), ("c", 2)] {
            repo.create(id, &Widget { id: id.into(), count }).unwrap();
        }
        let rows = repo
            .find_all_by(|_| true, Some(|a: &Widget, b: &Widget| a.count.cmp(&b.count)), Some(2))
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].count, 1);
        assert_eq!(rows[1].count, 2);
    }

    #[test]
    fn test_update_by_and_destroy_by() {
        let (_dir, repo) = repo();
        repo.create("a", &Widget { id: "a".into(), count: 1 }).unwrap();
        repo.create("b", &Widget { id: "b".into(), count: 2 }).unwrap();

        let touched = repo
            .update_by(|w| w.id.clone(), |w| w.count > 1, |w| w.count += 100)
            .unwrap();
        assert_eq!(touched, 1);
        assert_eq!(repo.find_by_id("b").unwrap().unwrap().count, 102);

        let removed = repo.destroy_by(|w| w.id.clone(), |w| w.count == 1).unwrap();
        assert_eq!(removed, 1);
        assert!(repo.find_by_id("a").unwrap().is_none());
    }

    #[test]
    fn test_bulk_upsert() {
        let (_dir, repo) = repo();
        let rows = vec![
            ("a".to_string(), Widget { id: "a".into(), count: 1 }),
            ("b".to_string(), Widget { id: "b".into(), count: 2 }),
        ];
        repo.bulk_upsert(&rows).unwrap();
        assert_eq!(repo.find_all().unwrap().len(), 2);
    }
}
