//! Black-box tests over the public `recondb` surface
//!
//! Everything here goes through the re-exported facade only, the way an
//! embedding application would: store, read, query, search, migrate.

use proptest::prelude::*;
use recondb::{
    EntityPatch, MigrationOperation, MigrationPlan, MigrationStatus, NewEntity, QueryOptions,
    SearchRequest, SortField, SortOrder, StoreConfig, StoreHandle,
};
use serde_json::json;
use std::time::Duration;

const SYNC: Duration = Duration::from_secs(2);

fn open_store() -> StoreHandle {
    StoreHandle::open(StoreConfig::in_memory()).unwrap()
}

// ============================================================================
// Round-trip property
// ============================================================================

fn arb_new_entity() -> impl Strategy<Value = NewEntity> {
    (
        "[a-z]{1,8}",
        proptest::collection::btree_set("[a-z]{1,6}", 0..4),
        proptest::collection::btree_map("[a-z]{1,6}", "[ -~]{0,16}", 0..4),
    )
        .prop_map(|(entity_type, tags, fields)| {
            let mut new = NewEntity::new(entity_type);
            for tag in tags {
                new = new.with_tag(tag);
            }
            for (key, value) in fields {
                new = new.with_field(key, value);
            }
            new
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// For all valid inputs, reading back a stored entity returns the
    /// stored record, modulo the server-assigned id and timestamps.
    #[test]
    fn prop_store_then_get_roundtrip(new in arb_new_entity()) {
        let store = StoreHandle::open(StoreConfig::ephemeral()).unwrap();
        let stored = store.store_entity(new.clone()).unwrap();
        let fetched = store.get_entity(&stored.id).unwrap();

        prop_assert_eq!(&fetched, &stored);
        prop_assert_eq!(&fetched.entity_type, &new.entity_type);
        prop_assert_eq!(&fetched.tags, &new.tags);
        prop_assert_eq!(&fetched.metadata, &new.metadata);
        prop_assert_eq!(fetched.created_at, fetched.updated_at);
    }
}

// ============================================================================
// Querying
// ============================================================================

#[test]
fn test_query_filters_compose() {
    let store = open_store();
    store
        .store_entity(
            NewEntity::new("node")
                .with_tag("alpha")
                .with_field("status", "active"),
        )
        .unwrap();
    store
        .store_entity(NewEntity::new("node").with_tag("bravo"))
        .unwrap();
    store
        .store_entity(NewEntity::new("report").with_tag("alpha"))
        .unwrap();

    let by_type = store
        .query_entities(&QueryOptions::new().with_type("node"))
        .unwrap();
    assert_eq!(by_type.len(), 2);

    let by_type_and_tag = store
        .query_entities(&QueryOptions::new().with_type("node").with_tag("alpha"))
        .unwrap();
    assert_eq!(by_type_and_tag.len(), 1);

    let by_field = store
        .query_entities(&QueryOptions::new().with_field("status", "active"))
        .unwrap();
    assert_eq!(by_field.len(), 1);
}

#[test]
fn test_query_pagination_is_stable() {
    let store = open_store();
    for i in 0..7 {
        store
            .store_entity(NewEntity::new("node").with_field("seq", i))
            .unwrap();
    }

    let sorted = QueryOptions::new()
        .with_type("node")
        .sorted_by(SortField::CreatedAt, SortOrder::Ascending);
    let all = store.query_entities(&sorted).unwrap();

    let page_one = store
        .query_entities(&sorted.clone().with_limit(3))
        .unwrap();
    let page_two = store
        .query_entities(&sorted.clone().with_limit(3).with_offset(3))
        .unwrap();

    assert_eq!(page_one.len(), 3);
    assert_eq!(page_two.len(), 3);
    assert_eq!(page_one[0].id, all[0].id);
    assert_eq!(page_two[0].id, all[3].id);
}

// ============================================================================
// Search relevance
// ============================================================================

#[test]
fn test_fuzzy_matches_within_budget_score_below_exact() {
    let store = open_store();
    let exact = store
        .store_entity(NewEntity::new("report").with_field("title", "scan results"))
        .unwrap();
    let near = store
        .store_entity(NewEntity::new("report").with_field("title", "scanned results"))
        .unwrap();
    assert!(store.wait_for_index_sync(SYNC));

    let strict = store.search(&SearchRequest::new("scan")).unwrap();
    assert_eq!(strict.len(), 1);
    assert_eq!(strict[0].entity.id, exact.id);

    let fuzzy = store
        .search(&SearchRequest::new("scan").with_fuzzy(1))
        .unwrap();
    assert_eq!(fuzzy.len(), 2);
    assert_eq!(fuzzy[0].entity.id, exact.id);
    assert_eq!(fuzzy[1].entity.id, near.id);
    assert!(fuzzy[0].score > fuzzy[1].score);
}

#[test]
fn test_search_highlights_carry_emphasis_markers() {
    let store = open_store();
    store
        .store_entity(
            NewEntity::new("report")
                .with_field("summary", "Unusual traffic observed near the relay station"),
        )
        .unwrap();
    assert!(store.wait_for_index_sync(SYNC));

    let hits = store.search(&SearchRequest::new("relay")).unwrap();
    assert_eq!(hits.len(), 1);
    let snippets = &hits[0].highlights["summary"];
    assert!(snippets[0].contains("**relay**"));
}

#[test]
fn test_stemmed_forms_meet_in_the_middle() {
    let store = open_store();
    store
        .store_entity(NewEntity::new("report").with_field("title", "scanning the perimeter"))
        .unwrap();
    assert!(store.wait_for_index_sync(SYNC));

    // Query and index sides stem to the same term.
    assert_eq!(store.search(&SearchRequest::new("scanned")).unwrap().len(), 1);
}

// ============================================================================
// Migration
// ============================================================================

#[test]
fn test_migration_idempotent_over_reruns() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = StoreHandle::open(StoreConfig::file(dir.path())).unwrap();
    store
        .store_entity(NewEntity::new("report").with_field("title", "summary"))
        .unwrap();

    let plan = MigrationPlan::new("m-status", "1.0.0", "1.1.0")
        .for_type("report")
        .with_operation(MigrationOperation::AddField {
            field: "status".into(),
            default: json!("draft"),
        });

    let first = store.execute_migration(&plan).unwrap();
    assert_eq!(first.status, MigrationStatus::Completed);
    let after_first = store
        .query_entities(&QueryOptions::new().with_type("report").force_refresh())
        .unwrap();

    let second = store.execute_migration(&plan).unwrap();
    assert_eq!(second.status, MigrationStatus::Completed);
    let after_second = store
        .query_entities(&QueryOptions::new().with_type("report").force_refresh())
        .unwrap();

    assert_eq!(after_first.len(), after_second.len());
    for (a, b) in after_first.iter().zip(after_second.iter()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.metadata, b.metadata);
        assert_eq!(a.entity_type, b.entity_type);
    }
}

#[test]
fn test_migrated_records_survive_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let id = {
        let store = StoreHandle::open(StoreConfig::file(dir.path())).unwrap();
        let stored = store
            .store_entity(NewEntity::new("report").with_field("level", "5"))
            .unwrap();

        let plan = MigrationPlan::new("m-level", "1.0.0", "2.0.0")
            .for_type("report")
            .with_operation(MigrationOperation::ConvertType {
                field: "level".into(),
                to: recondb::FieldType::Number,
            });
        assert_eq!(
            store.execute_migration(&plan).unwrap().status,
            MigrationStatus::Completed
        );
        store.shutdown();
        stored.id
    };

    let reopened = StoreHandle::open(StoreConfig::file(dir.path())).unwrap();
    let fetched = reopened.get_entity(&id).unwrap();
    assert_eq!(fetched.metadata["level"], json!(5));
}

// ============================================================================
// Update semantics
// ============================================================================

#[test]
fn test_updated_at_monotonic_across_mutations() {
    let store = open_store();
    let stored = store.store_entity(NewEntity::new("node")).unwrap();

    let mut last = stored.updated_at;
    for i in 0..3 {
        let updated = store
            .update_entity(&stored.id, EntityPatch::new().set_field("rev", i))
            .unwrap();
        assert!(updated.updated_at >= last);
        last = updated.updated_at;
    }
    assert_eq!(store.get_entity(&stored.id).unwrap().created_at, stored.created_at);
}

#[test]
fn test_patch_null_removes_metadata_key() {
    let store = open_store();
    let stored = store
        .store_entity(NewEntity::new("node").with_field("temp", "value"))
        .unwrap();

    store
        .update_entity(&stored.id, EntityPatch::new().remove_field("temp"))
        .unwrap();
    assert!(!store
        .get_entity(&stored.id)
        .unwrap()
        .metadata
        .contains_key("temp"));
}
