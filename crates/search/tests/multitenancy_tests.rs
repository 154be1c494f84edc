//! Tenant isolation and index/store reconciliation tests.

mod common;

use serde_json::json;

use common::{Harness, ids, note, sorted_ids};
use kestrel_search::core::{IndexClient, IndexDocument};
use kestrel_search::{Indexable, QueryDescriptor, ReindexOptions, SearchConfig, TermFilter};

// ============================================================================
// Shared tenants
// ============================================================================

#[tokio::test]
async fn test_shared_tenants_are_isolated() {
    let h = Harness::new();
    h.provision(" alpha").await;
    h.provision(" beta").await;
    h.save(" alpha", &[note("n1", " alpha", "Meeting alpha")]).await;
    h.save(" beta", &[note("n1", " beta", "Meeting beta"), note("n2", " beta", "Memo")])
        .await;
    let svc = &h.service;

    assert_eq!(h.index.document_count("platform-0"), 3);
    assert_eq!(svc.count(" alpha", "note").await, 1);
    assert_eq!(svc.count(" beta", "note").await, 2);

    let alpha = svc.find_query(" alpha", "note", "meeting", None).await;
    assert_eq!(alpha.len(), 1);
    assert_eq!(alpha[0].field_str("title"), Some("Meeting alpha"));

    let by_id = svc.find_by_id(" alpha", "n2").await;
    assert!(by_id.is_none());
}

#[tokio::test]
async fn test_shared_unindex_only_touches_own_documents() {
    let h = Harness::new();
    h.provision(" alpha").await;
    h.provision(" beta").await;
    h.save(" alpha", &[note("n1", " alpha", "A")]).await;
    h.save(" beta", &[note("n1", " beta", "B")]).await;
    let svc = &h.service;

    svc.unindex(" alpha", &note("n1", " alpha", "A")).await;
    assert_eq!(svc.count(" alpha", "note").await, 0);
    assert_eq!(svc.count(" beta", "note").await, 1);

    assert_eq!(svc.unindex_matching(" beta", &[], true).await, 1);
    assert_eq!(h.index.document_count("platform-0"), 0);
}

#[tokio::test]
async fn test_shared_tenants_with_colliding_key_prefixes() {
    let h = Harness::new();
    h.provision(" a").await;
    h.save(" a", &[note("0", " a", "Meeting")]).await;
    h.save(" a_b", &[note("0", " a_b", "Memo")]).await;
    let svc = &h.service;

    let summary = svc.reindex(" a", ReindexOptions::default()).await;
    assert!(summary.completed);
    assert_eq!(summary.objects, 1);

    let own = svc.find_by_id(" a", "0").await;
    assert_eq!(own.and_then(|o| o.field_str("title").map(String::from)), Some("Meeting".into()));
    assert_eq!(ids(&svc.find_prefix(" a", "note", "title", "M", None).await), ["0"]);
    assert_eq!(svc.count(" a", "note").await, 1);
    assert_eq!(svc.count(" a_b", "note").await, 1);

    let other = svc.find_by_id(" a_b", "0").await;
    assert_eq!(other.and_then(|o| o.field_str("title").map(String::from)), Some("Memo".into()));
}

#[tokio::test]
async fn test_reindex_with_index_unavailable() {
    let h = Harness::new();
    h.provision("acme").await;
    h.save("acme", &[note("n1", "acme", "A"), note("n2", "acme", "B")]).await;

    h.index.set_unavailable(true);
    let summary = h.service.reindex("acme", ReindexOptions::default()).await;
    assert!(!summary.completed);
    assert_eq!(summary.objects, 0);

    h.index.set_unavailable(false);
    let summary = h.service.reindex("acme", ReindexOptions::default()).await;
    assert!(summary.completed);
    assert_eq!(summary.objects, 2);
}

#[tokio::test]
async fn test_dedicated_tenants_use_separate_indexes() {
    let h = Harness::new();
    h.provision("acme").await;
    h.provision("globex").await;
    h.save("acme", &[note("n1", "acme", "A")]).await;
    h.save("globex", &[note("n1", "globex", "G")]).await;

    assert_eq!(h.index.document_count("platform-acme"), 1);
    assert_eq!(h.index.document_count("platform-globex"), 1);
    assert_eq!(
        h.service.find_by_id("acme", "n1").await.and_then(|o| o.field_str("title").map(String::from)),
        Some("A".to_string())
    );
}

#[tokio::test]
async fn test_root_scope() {
    let h = Harness::new();
    h.provision("platform").await;
    let root = h.service.root();
    root.index(&note("r1", "platform", "Root note")).await;

    assert_eq!(h.index.document_count("platform"), 1);
    assert_eq!(root.count("note").await, 1);
    assert_eq!(ids(&root.find_query("note", "root", None).await), ["r1"]);
}

#[tokio::test]
async fn test_blank_tenant_is_rejected_everywhere() {
    let h = Harness::new();
    let svc = &h.service;
    svc.index(" ", &note("x", " ", "X")).await;
    svc.index("", &note("x", "", "X")).await;

    assert!(!svc.exists_resource("").await);
    assert!(!svc.create_resource("", 1, 1).await);
    assert_eq!(svc.count("", "note").await, 0);
    assert_eq!(svc.unindex_matching("", &[], true).await, 0);
    assert!(svc.find_query("", "note", "*", None).await.is_empty());
    assert!(svc.describe_resource("").await.is_empty());
}

// ============================================================================
// Reconciliation
// ============================================================================

#[tokio::test]
async fn test_store_is_source_of_truth() {
    let h = Harness::new();
    h.provision("acme").await;
    h.save("acme", &[note("n1", "acme", "Meeting")]).await;

    let ctx = h.service.mapper().context("acme").unwrap();
    h.store
        .put(&ctx, note("n1", "acme", "Meeting").with_field("edited", json!(true)))
        .unwrap();

    let found = h.service.find_query("acme", "note", "meeting", None).await;
    assert_eq!(found[0].field("edited"), Some(&json!(true)));
}

#[tokio::test]
async fn test_drift_is_reported_and_still_returned() {
    let h = Harness::new();
    h.provision("acme").await;
    h.save("acme", &[note("n1", "acme", "Kept"), note("n2", "acme", "Deleted")])
        .await;

    let ctx = h.service.mapper().context("acme").unwrap();
    assert!(h.store.remove(&ctx, "n2").unwrap());

    let result = h
        .service
        .search_reconciled("acme", "note", &QueryDescriptor::MatchAll, None)
        .await;
    assert_eq!(sorted_ids(&result.objects), ["n1", "n2"]);
    assert_eq!(result.drift, ["n2"]);
}

#[tokio::test]
async fn test_index_only_objects_are_not_drift() {
    let h = Harness::new();
    h.provision("acme").await;
    let ephemeral = note("e1", "acme", "Ephemeral").with_stored(false);
    h.service.index("acme", &ephemeral).await;

    let result = h
        .service
        .search_reconciled("acme", "note", &QueryDescriptor::MatchAll, None)
        .await;
    assert_eq!(result.objects, vec![ephemeral]);
    assert!(!result.has_drift());
}

#[tokio::test]
async fn test_read_from_index_skips_store() {
    let h = Harness::with_config(SearchConfig {
        read_from_index: true,
        ..Default::default()
    });
    h.provision("acme").await;
    h.service.index("acme", &note("n1", "acme", "Indexed only")).await;
    h.store.set_unavailable(true);

    let found = h.service.find_query("acme", "note", "indexed", None).await;
    assert_eq!(ids(&found), ["n1"]);
}

#[tokio::test]
async fn test_store_outage_yields_empty_results() {
    let h = Harness::new();
    h.provision("acme").await;
    h.save("acme", &[note("n1", "acme", "Meeting")]).await;
    h.store.set_unavailable(true);

    assert!(h.service.find_query("acme", "note", "*", None).await.is_empty());
    assert_eq!(h.service.count("acme", "note").await, 1);
}

#[tokio::test]
async fn test_index_outage_yields_empty_results() {
    let h = Harness::new();
    h.provision("acme").await;
    h.save("acme", &[note("n1", "acme", "Meeting")]).await;
    h.index.set_unavailable(true);

    let svc = &h.service;
    assert!(svc.find_query("acme", "note", "*", None).await.is_empty());
    assert_eq!(svc.count("acme", "note").await, 0);
    assert!(svc.find_by_id("acme", "n1").await.is_none());
    svc.index("acme", &note("n2", "acme", "Lost")).await;
    assert_eq!(
        svc.count_terms("acme", "note", &[TermFilter::eq("id", json!("n1"))]).await,
        0
    );
}

// ============================================================================
// Expiry
// ============================================================================

#[tokio::test]
async fn test_expired_documents_are_hidden() {
    let h = Harness::new();
    h.provision("acme").await;
    h.save("acme", &[note("live", "acme", "Live")]).await;

    let mut source = note("old", "acme", "Old").to_document(0);
    source["_expires"] = json!(1);
    h.index
        .index(IndexDocument {
            index: "platform-acme".into(),
            id: "old".into(),
            source,
        })
        .await
        .unwrap();

    let svc = &h.service;
    assert_eq!(svc.count("acme", "note").await, 1);
    assert_eq!(ids(&svc.find_query("acme", "note", "*", None).await), ["live"]);

    assert_eq!(svc.unindex_matching("acme", &[], true).await, 2);
}

#[tokio::test]
async fn test_ttl_sets_expiry() {
    let h = Harness::new();
    h.provision("acme").await;
    h.service.index_with_ttl("acme", &note("t1", "acme", "Temp"), 3600).await;

    let source = h.service.executor().get_source("acme", "t1").await.unwrap();
    assert!(source["_expires"].as_i64().unwrap() > chrono::Utc::now().timestamp_millis());
    assert_eq!(h.service.count("acme", "note").await, 1);
}
