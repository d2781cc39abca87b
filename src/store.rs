//! Relation store - durable bind storage behind a trait
//!
//! The service only sees [`RelationStore`]. The SQLite implementation maps
//! each call onto one statement in `db::binds`, so every operation is a single
//! store round trip and the duplicate check is the insert itself.

use std::sync::Arc;

use tracing::debug;

use crate::db::{binds, BinderDb};
use crate::error::BinderError;
use crate::model::{Bind, EntityRef, RelationKind};

/// Storage for binds keyed by (author, target, kind)
pub trait RelationStore: Send + Sync {
    /// Insert a bind; a second insert of the same triple fails with
    /// `BinderError::DuplicateBind`, even under concurrent callers
    fn insert(&self, bind: Bind) -> Result<Bind, BinderError>;

    /// Delete the bind for a triple; `None` when nothing was removed
    fn delete(
        &self,
        author: &EntityRef,
        target: &EntityRef,
        kind: &RelationKind,
    ) -> Result<Option<Bind>, BinderError>;

    fn exists(
        &self,
        author: &EntityRef,
        target: &EntityRef,
        kind: &RelationKind,
    ) -> Result<bool, BinderError>;

    /// Targets of one type bound by one author under one kind
    fn list_targets(
        &self,
        author: &EntityRef,
        kind: &RelationKind,
        target_type_id: &str,
    ) -> Result<Vec<EntityRef>, BinderError>;
}

/// SQLite-backed relation store
pub struct SqliteRelationStore {
    db: Arc<BinderDb>,
}

impl SqliteRelationStore {
    pub fn new(db: Arc<BinderDb>) -> Self {
        Self { db }
    }
}

impl RelationStore for SqliteRelationStore {
    fn insert(&self, bind: Bind) -> Result<Bind, BinderError> {
        self.db.with_conn(|conn| binds::insert_bind(conn, &bind))?;
        debug!(bind = %bind, id = %bind.id, "Bind inserted");
        Ok(bind)
    }

    fn delete(
        &self,
        author: &EntityRef,
        target: &EntityRef,
        kind: &RelationKind,
    ) -> Result<Option<Bind>, BinderError> {
        let removed = self
            .db
            .with_conn(|conn| binds::delete_bind(conn, author, target, kind))?;
        if let Some(ref bind) = removed {
            debug!(bind = %bind, id = %bind.id, "Bind deleted");
        }
        Ok(removed)
    }

    fn exists(
        &self,
        author: &EntityRef,
        target: &EntityRef,
        kind: &RelationKind,
    ) -> Result<bool, BinderError> {
        self.db
            .with_conn(|conn| binds::bind_exists(conn, author, target, kind))
    }

    fn list_targets(
        &self,
        author: &EntityRef,
        kind: &RelationKind,
        target_type_id: &str,
    ) -> Result<Vec<EntityRef>, BinderError> {
        let keys = self
            .db
            .with_conn(|conn| binds::list_target_keys(conn, author, kind, target_type_id))?;

        Ok(keys
            .into_iter()
            .map(|key| EntityRef::new(target_type_id, key))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::current_timestamp;
    use crate::model::EntityKey;

    fn store() -> SqliteRelationStore {
        SqliteRelationStore::new(Arc::new(BinderDb::open_in_memory().unwrap()))
    }

    fn new_bind(author: &EntityRef, target: &EntityRef) -> Bind {
        Bind {
            id: uuid::Uuid::new_v4().to_string(),
            author: author.clone(),
            target: target.clone(),
            kind: RelationKind::WISHLIST,
            created_at: current_timestamp(),
        }
    }

    #[test]
    fn test_store_roundtrip() {
        let store = store();
        let author = EntityRef::new("user.user", EntityKey::from(1));
        let target = EntityRef::new("catalog.item", EntityKey::from(9));

        assert!(!store.exists(&author, &target, &RelationKind::WISHLIST).unwrap());
        store.insert(new_bind(&author, &target)).unwrap();
        assert!(store.exists(&author, &target, &RelationKind::WISHLIST).unwrap());

        let listed = store
            .list_targets(&author, &RelationKind::WISHLIST, "catalog.item")
            .unwrap();
        assert_eq!(listed, vec![target.clone()]);

        assert!(store.delete(&author, &target, &RelationKind::WISHLIST).unwrap().is_some());
        assert!(store.delete(&author, &target, &RelationKind::WISHLIST).unwrap().is_none());
    }

    #[test]
    fn test_store_duplicate_insert() {
        let store = store();
        let author = EntityRef::new("user.user", EntityKey::from(1));
        let target = EntityRef::new("catalog.item", EntityKey::from(9));

        store.insert(new_bind(&author, &target)).unwrap();
        let err = store.insert(new_bind(&author, &target)).unwrap_err();
        assert!(matches!(err, BinderError::DuplicateBind { .. }));
    }
}
