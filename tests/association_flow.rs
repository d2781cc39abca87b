//! End-to-end bind semantics through the public engine API

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use entity_binder::{
    AssociationCapable, AuthorResolver, Bind, BinderDb, BinderError, DelegationResolver,
    EntityKey, EntityRef, EntityTypeDescriptor, EntityTypeRegistry, EventBus, KeySet, Principal,
    RelationKind, RelationStore, Services, SqliteRelationStore,
};

/// Store wrapper counting calls per operation
struct CountingStore {
    inner: SqliteRelationStore,
    inserts: AtomicUsize,
    lists: AtomicUsize,
    exists: AtomicUsize,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: SqliteRelationStore::new(Arc::new(BinderDb::open_in_memory().unwrap())),
            inserts: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
            exists: AtomicUsize::new(0),
        }
    }
}

impl RelationStore for CountingStore {
    fn insert(&self, bind: Bind) -> Result<Bind, BinderError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(bind)
    }

    fn delete(
        &self,
        author: &EntityRef,
        target: &EntityRef,
        kind: &RelationKind,
    ) -> Result<Option<Bind>, BinderError> {
        self.inner.delete(author, target, kind)
    }

    fn exists(
        &self,
        author: &EntityRef,
        target: &EntityRef,
        kind: &RelationKind,
    ) -> Result<bool, BinderError> {
        self.exists.fetch_add(1, Ordering::SeqCst);
        self.inner.exists(author, target, kind)
    }

    fn list_targets(
        &self,
        author: &EntityRef,
        kind: &RelationKind,
        target_type_id: &str,
    ) -> Result<Vec<EntityRef>, BinderError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list_targets(author, kind, target_type_id)
    }
}

fn registry() -> Arc<EntityTypeRegistry> {
    Arc::new(
        EntityTypeRegistry::builder()
            .register(EntityTypeDescriptor::new(
                "catalog.Item",
                "Item",
                Arc::new(KeySet::new(1u64..=100)),
            ))
            .unwrap()
            .register(EntityTypeDescriptor::new(
                "blog.Post",
                "Post",
                Arc::new(|key: &EntityKey| -> Result<bool, BinderError> {
                    Ok(key.as_str().starts_with("post-"))
                }),
            ))
            .unwrap()
            .build(),
    )
}

fn setup() -> (Services, Arc<CountingStore>) {
    let store = Arc::new(CountingStore::new());
    let services = Services::new(store.clone(), registry(), Arc::new(EventBus::new()));
    (services, store)
}

fn user(key: u64) -> EntityRef {
    EntityRef::new("user.User", EntityKey::from(key))
}

fn item(key: u64) -> EntityRef {
    EntityRef::new("catalog.Item", EntityKey::from(key))
}

#[test]
fn add_then_add_conflicts_for_every_kind() {
    let (services, _) = setup();
    for kind in [RelationKind::WISHLIST, RelationKind::BLACKLIST] {
        for key in [1u64, 50, 100] {
            let target_key = EntityKey::from(key);
            services
                .association
                .add(&user(1), "catalog.Item", &target_key, &kind)
                .unwrap();
            let err = services
                .association
                .add(&user(1), "catalog.Item", &target_key, &kind)
                .unwrap_err();
            assert!(matches!(err, BinderError::Conflict(_)), "{:?}", err);
        }
    }
}

#[test]
fn is_bound_follows_add_and_remove() {
    let (services, _) = setup();
    let association = &services.association;
    let kind = RelationKind::WISHLIST;

    assert!(!association.is_bound(&user(1), &item(9), &kind).unwrap());
    association.add(&user(1), "catalog.Item", &EntityKey::from(9), &kind).unwrap();
    assert!(association.is_bound(&user(1), &item(9), &kind).unwrap());
    association.remove(&user(1), "catalog.Item", &EntityKey::from(9), &kind).unwrap();
    assert!(!association.is_bound(&user(1), &item(9), &kind).unwrap());

    let err = association
        .remove(&user(1), "catalog.Item", &EntityKey::from(9), &kind)
        .unwrap_err();
    assert!(matches!(err, BinderError::NotFound(_)));
}

#[test]
fn kinds_are_independent() {
    let (services, _) = setup();
    let association = &services.association;

    association
        .add(&user(1), "catalog.Item", &EntityKey::from(9), &RelationKind::WISHLIST)
        .unwrap();
    assert!(!association
        .is_bound(&user(1), &item(9), &RelationKind::BLACKLIST)
        .unwrap());

    // Same target, other kind, is its own triple
    association
        .add(&user(1), "catalog.Item", &EntityKey::from(9), &RelationKind::BLACKLIST)
        .unwrap();
    association
        .remove(&user(1), "catalog.Item", &EntityKey::from(9), &RelationKind::WISHLIST)
        .unwrap();
    assert!(association
        .is_bound(&user(1), &item(9), &RelationKind::BLACKLIST)
        .unwrap());
}

#[test]
fn custom_kind_works_without_engine_changes() {
    let (services, _) = setup();
    let read_later = RelationKind::parse("read_later").unwrap();

    services
        .association
        .add(&user(1), "blog.Post", &EntityKey::new("post-7").unwrap(), &read_later)
        .unwrap();
    let post = EntityRef::new("blog.Post", EntityKey::new("post-7").unwrap());
    assert!(services.association.is_bound(&user(1), &post, &read_later).unwrap());
    assert!(!services
        .association
        .is_bound(&user(1), &post, &RelationKind::WISHLIST)
        .unwrap());
}

#[test]
fn add_missing_target_never_reaches_store() {
    let (services, store) = setup();

    for key in [0u64, 101, 999999] {
        let err = services
            .association
            .add(&user(1), "catalog.Item", &EntityKey::from(key), &RelationKind::WISHLIST)
            .unwrap_err();
        match err {
            BinderError::Validation { field, message } => {
                assert_eq!(field, "target_object_id");
                assert_eq!(message, format!("Item with pk={} does not exist.", key));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    let err = services
        .association
        .add(&user(1), "shop.Widget", &EntityKey::from(1), &RelationKind::WISHLIST)
        .unwrap_err();
    assert!(matches!(err, BinderError::Validation { ref field, .. } if field == "target_ct"));

    assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
}

#[test]
fn remove_tolerates_target_deleted_elsewhere() {
    let live = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let live_check = live.clone();
    let registry = Arc::new(
        EntityTypeRegistry::builder()
            .register(EntityTypeDescriptor::new(
                "catalog.Item",
                "Item",
                Arc::new(move |_: &EntityKey| -> Result<bool, BinderError> {
                    Ok(live_check.load(Ordering::SeqCst))
                }),
            ))
            .unwrap()
            .build(),
    );
    let db = Arc::new(BinderDb::open_in_memory().unwrap());
    let services = Services::sqlite(db, registry, Arc::new(EventBus::new()));
    let key = EntityKey::from(9);

    services
        .association
        .add(&user(1), "catalog.Item", &key, &RelationKind::WISHLIST)
        .unwrap();

    // Target disappears; the dangling bind is still readable and removable
    live.store(false, Ordering::SeqCst);
    assert!(services
        .association
        .is_bound(&user(1), &item(9), &RelationKind::WISHLIST)
        .unwrap());
    services
        .association
        .remove(&user(1), "catalog.Item", &key, &RelationKind::WISHLIST)
        .unwrap();
}

#[test]
fn annotate_is_one_query_and_matches_is_bound() {
    let (services, store) = setup();
    for key in [3u64, 4, 42] {
        services
            .association
            .add(&user(1), "catalog.Item", &EntityKey::from(key), &RelationKind::WISHLIST)
            .unwrap();
    }
    // Another author's binds must not leak in
    services
        .association
        .add(&user(2), "catalog.Item", &EntityKey::from(5), &RelationKind::WISHLIST)
        .unwrap();

    let candidates: Vec<EntityRef> = (1..=60).map(item).collect();
    let before = store.lists.load(Ordering::SeqCst);
    let states = services
        .annotator
        .annotate(&user(1), &RelationKind::WISHLIST, "catalog.Item", &candidates)
        .unwrap();
    assert_eq!(store.lists.load(Ordering::SeqCst) - before, 1);
    assert_eq!(store.exists.load(Ordering::SeqCst), 0);

    for candidate in &candidates {
        let expected = services
            .association
            .is_bound(&user(1), candidate, &RelationKind::WISHLIST)
            .unwrap();
        assert_eq!(states[candidate], expected, "{}", candidate);
    }
    assert_eq!(states.values().filter(|bound| **bound).count(), 3);
}

#[test]
fn list_bound_targets_filters_by_type_and_author() {
    let (services, _) = setup();
    let association = &services.association;

    association
        .add(&user(1), "catalog.Item", &EntityKey::from(2), &RelationKind::BLACKLIST)
        .unwrap();
    association
        .add(&user(1), "blog.Post", &EntityKey::new("post-2").unwrap(), &RelationKind::BLACKLIST)
        .unwrap();
    association
        .add(&user(1), "catalog.Item", &EntityKey::from(8), &RelationKind::BLACKLIST)
        .unwrap();
    association
        .add(&user(3), "catalog.Item", &EntityKey::from(9), &RelationKind::BLACKLIST)
        .unwrap();

    let items = association
        .list_bound_targets(&user(1), "catalog.Item", &RelationKind::BLACKLIST)
        .unwrap();
    assert_eq!(items, vec![item(2), item(8)]);

    let posts = association
        .list_bound_targets(&user(1), "blog.Post", &RelationKind::BLACKLIST)
        .unwrap();
    assert_eq!(posts.len(), 1);
}

#[test]
fn delegated_principal_binds_as_owner() {
    let (services, _) = setup();
    let resolver = DelegationResolver::new().with_delegate("staff.Member", |principal: &Principal| {
        Some(EntityRef::new(
            "org.Organisation",
            EntityKey::new(format!("org-of-{}", principal.entity_ref().key)).ok()?,
        ))
    });
    let services = services.with_author_resolver(Arc::new(resolver));

    let staff = Principal::new(EntityRef::new("staff.Member", EntityKey::from(7)));
    let author = services.authors.resolve(&staff);
    assert_eq!(
        author,
        EntityRef::new("org.Organisation", EntityKey::new("org-of-7").unwrap())
    );

    services
        .association
        .add(&author, "catalog.Item", &EntityKey::from(9), &RelationKind::WISHLIST)
        .unwrap();
    assert!(!services
        .association
        .is_bound(&staff.entity_ref(), &item(9), &RelationKind::WISHLIST)
        .unwrap());

    // Undelegated principal types author as themselves
    let plain = Principal::new(user(4));
    assert_eq!(services.authors.resolve(&plain), user(4));
}

#[tokio::test]
async fn per_kind_subscription_sees_only_its_kind() {
    let (services, _) = setup();
    let mut wishlist_events = services.events.subscribe_kind(RelationKind::WISHLIST);

    services
        .association
        .add(&user(1), "catalog.Item", &EntityKey::from(1), &RelationKind::BLACKLIST)
        .unwrap();
    services
        .association
        .add(&user(1), "catalog.Item", &EntityKey::from(2), &RelationKind::WISHLIST)
        .unwrap();

    let event = wishlist_events.recv().await.unwrap();
    assert_eq!(event.kind, RelationKind::WISHLIST);
    assert_eq!(event.bind.target, item(2));
}
