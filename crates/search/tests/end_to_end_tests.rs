//! End-to-end tests of the query and mutation API over the in-memory
//! backends.

mod common;

use serde_json::json;

use common::{Harness, address, ids, note, sorted_ids, tag};
use kestrel_search::query::RangeOp;
use kestrel_search::{PageCursor, SearchableObject, TermFilter};

const TENANT: &str = "acct-42";

async fn seeded() -> Harness {
    let h = Harness::new();
    h.provision(TENANT).await;
    h.save(
        TENANT,
        &[
            note("n1", TENANT, "Meeting notes").with_field("votes", json!(7)),
            note("n2", TENANT, "Memo").with_field("votes", json!(2)),
            note("n3", TENANT, "Meetup plan").with_field("votes", json!(12)),
        ],
    )
    .await;
    h
}

// ============================================================================
// Lifecycle of an index
// ============================================================================

#[tokio::test]
async fn test_index_count_unindex_prefix() {
    let h = seeded().await;
    let svc = &h.service;

    assert!(svc.exists_resource(TENANT).await);
    assert_eq!(svc.count(TENANT, "note").await, 3);

    svc.unindex(TENANT, &note("n2", TENANT, "Memo")).await;
    assert_eq!(svc.count(TENANT, "note").await, 2);

    let found = svc.find_prefix(TENANT, "note", "title", "Mee", None).await;
    assert_eq!(sorted_ids(&found), ["n1", "n3"]);
}

#[tokio::test]
async fn test_reindexing_replaces_document() {
    let h = seeded().await;
    let svc = &h.service;

    let renamed = note("n1", TENANT, "Retro");
    h.save(TENANT, &[renamed.clone()]).await;

    assert_eq!(svc.count(TENANT, "note").await, 3);
    assert!(svc.find_query(TENANT, "note", "title:meeting", None).await.is_empty());
    assert_eq!(svc.find_by_id(TENANT, "n1").await, Some(renamed));
}

#[tokio::test]
async fn test_tenant_scope_matches_explicit_calls() {
    let h = seeded().await;
    let scope = h.service.tenant(TENANT);

    assert_eq!(scope.count("note").await, 3);
    let found = scope.find_prefix("note", "title", "Mee", None).await;
    assert_eq!(sorted_ids(&found), ["n1", "n3"]);

    scope.unindex_all(&[note("n1", TENANT, ""), note("n3", TENANT, "")]).await;
    assert_eq!(scope.count("note").await, 1);
}

// ============================================================================
// Query operations
// ============================================================================

#[tokio::test]
async fn test_find_term_in_list() {
    let h = seeded().await;
    let found = h
        .service
        .find_term_in_list(TENANT, "note", "id", vec![json!("n1"), json!("n3"), json!("zz")], None)
        .await;
    assert_eq!(sorted_ids(&found), ["n1", "n3"]);

    let none = h
        .service
        .find_term_in_list(TENANT, "note", "id", Vec::new(), None)
        .await;
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_find_wildcard() {
    let h = seeded().await;
    let found = h
        .service
        .find_wildcard(TENANT, "note", "title", "Me*o", None)
        .await;
    assert_eq!(ids(&found), ["n2"]);
}

#[tokio::test]
async fn test_find_query() {
    let h = seeded().await;
    let svc = &h.service;

    let found = svc.find_query(TENANT, "note", "meetup OR memo", None).await;
    assert_eq!(sorted_ids(&found), ["n2", "n3"]);

    let ranged = svc.find_query(TENANT, "note", "votes:[5 TO 10]", None).await;
    assert_eq!(ids(&ranged), ["n1"]);

    let all = svc.find_query(TENANT, "note", "*", None).await;
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn test_unparsable_query_broadens_to_match_all() {
    let h = seeded().await;
    let found = h.service.find_query(TENANT, "note", "(meeting AND", None).await;
    assert_eq!(found.len(), 3);
}

#[tokio::test]
async fn test_find_nested_query() {
    let h = Harness::new();
    h.provision(TENANT).await;
    h.save(
        TENANT,
        &[
            SearchableObject::new("c1", "car", TENANT).with_field("nstd", json!([{ "color": "red" }])),
            SearchableObject::new("c2", "car", TENANT).with_field("nstd", json!([{ "color": "blue" }])),
        ],
    )
    .await;

    let found = h
        .service
        .find_nested_query(TENANT, "car", "color", "red", None)
        .await;
    assert_eq!(ids(&found), ["c1"]);
}

#[tokio::test]
async fn test_find_tagged_requires_every_tag() {
    let h = Harness::new();
    h.provision(TENANT).await;
    h.save(
        TENANT,
        &[
            note("a", TENANT, "A").with_field("tags", json!(["work", "urgent"])),
            note("b", TENANT, "B").with_field("tags", json!(["work"])),
        ],
    )
    .await;

    let svc = &h.service;
    let both = svc
        .find_tagged(TENANT, "note", &["work".into(), "urgent".into()], None)
        .await;
    assert_eq!(ids(&both), ["a"]);

    let work = svc.find_tagged(TENANT, "note", &["work".into()], None).await;
    assert_eq!(sorted_ids(&work), ["a", "b"]);

    assert!(svc.find_tagged(TENANT, "note", &[], None).await.is_empty());
}

#[tokio::test]
async fn test_find_terms_conjunction_and_disjunction() {
    let h = seeded().await;
    let svc = &h.service;

    let filters = vec![
        TermFilter::range("votes", RangeOp::Gte, json!(5)),
        TermFilter::eq("title", json!("Memo")),
    ];
    let all = svc.find_terms(TENANT, "note", &filters, true, None).await;
    assert!(all.is_empty());

    let any = svc.find_terms(TENANT, "note", &filters, false, None).await;
    assert_eq!(sorted_ids(&any), ["n1", "n2", "n3"]);

    let high = svc
        .find_terms(TENANT, "note", &[TermFilter::range("votes", RangeOp::Gt, json!(7))], true, None)
        .await;
    assert_eq!(ids(&high), ["n3"]);

    assert!(svc.find_terms(TENANT, "note", &[], true, None).await.is_empty());
}

#[tokio::test]
async fn test_count_terms() {
    let h = seeded().await;
    let svc = &h.service;
    let filters = [TermFilter::range("votes", RangeOp::Lt, json!(10))];
    assert_eq!(svc.count_terms(TENANT, "note", &filters).await, 2);
    assert_eq!(svc.count_terms(TENANT, "note", &[]).await, 0);
}

#[tokio::test]
async fn test_find_similar_excludes_filter_key() {
    let h = Harness::new();
    h.provision(TENANT).await;
    h.save(
        TENANT,
        &[
            note("s1", TENANT, "weekly sync meeting"),
            note("s2", TENANT, "sync with design"),
            note("s3", TENANT, "budget review"),
        ],
    )
    .await;

    let found = h
        .service
        .find_similar(TENANT, "note", Some("s1"), &["title".into()], "weekly sync meeting", None)
        .await;
    assert_eq!(ids(&found), ["s2"]);

    assert!(h
        .service
        .find_similar(TENANT, "note", None, &[], " ", None)
        .await
        .is_empty());
}

#[tokio::test]
async fn test_find_tags_by_prefix() {
    let h = Harness::new();
    h.provision(TENANT).await;
    h.save(TENANT, &[tag("books", TENANT), tag("bookmarks", TENANT), tag("music", TENANT)])
        .await;

    let found = h.service.find_tags(TENANT, "book", None).await;
    assert_eq!(sorted_ids(&found), ["tag:bookmarks", "tag:books"]);
}

#[tokio::test]
async fn test_find_nearby_resolves_parents() {
    let h = Harness::new();
    h.provision(TENANT).await;
    h.save(
        TENANT,
        &[
            SearchableObject::new("cafe", "place", TENANT).with_field("name", json!("Cafe Sofia")),
            SearchableObject::new("bar", "place", TENANT).with_field("name", json!("Bar Sofia")),
            SearchableObject::new("far", "place", TENANT).with_field("name", json!("Cafe Paris")),
            address("a1", TENANT, "cafe", 42.6977, 23.3219),
            address("a2", TENANT, "bar", 42.6980, 23.3225),
            address("a3", TENANT, "far", 48.8566, 2.3522),
        ],
    )
    .await;
    let svc = &h.service;

    let nearby = svc
        .find_nearby(TENANT, "place", "*", 5.0, 42.6975, 23.3220, None)
        .await;
    assert_eq!(sorted_ids(&nearby), ["bar", "cafe"]);

    let cafes = svc
        .find_nearby(TENANT, "place", "cafe", 5.0, 42.6975, 23.3220, None)
        .await;
    assert_eq!(ids(&cafes), ["cafe"]);

    let addresses = svc
        .find_nearby(TENANT, "address", "", 5.0, 42.6975, 23.3220, None)
        .await;
    assert_eq!(sorted_ids(&addresses), ["a1", "a2"]);

    let nowhere = svc.find_nearby(TENANT, "place", "*", 1.0, 0.0, 0.0, None).await;
    assert!(nowhere.is_empty());
}

#[tokio::test]
async fn test_find_by_ids_ignores_missing() {
    let h = seeded().await;
    let found = h
        .service
        .find_by_ids(TENANT, &["n3".into(), "missing".into(), "n1".into()])
        .await;
    assert_eq!(ids(&found), ["n3", "n1"]);
    assert!(h.service.find_by_id(TENANT, "missing").await.is_none());
}

// ============================================================================
// Pagination
// ============================================================================

#[tokio::test]
async fn test_pagination_and_sorting() {
    let h = seeded().await;
    let svc = &h.service;

    let mut cursor = PageCursor::new(1, 2).with_sort("votes", true);
    let first = svc.find_query(TENANT, "note", "*", Some(&mut cursor)).await;
    assert_eq!(ids(&first), ["n3", "n1"]);
    assert_eq!(cursor.count, 3);

    let mut cursor = PageCursor::new(2, 2).with_sort("votes", true);
    let second = svc.find_query(TENANT, "note", "*", Some(&mut cursor)).await;
    assert_eq!(ids(&second), ["n2"]);
    assert_eq!(cursor.count, 3);
}

#[tokio::test]
async fn test_unindex_matching() {
    let h = seeded().await;
    let svc = &h.service;

    let removed = svc
        .unindex_matching(TENANT, &[TermFilter::range("votes", RangeOp::Gte, json!(7))], true)
        .await;
    assert_eq!(removed, 2);
    assert_eq!(svc.count(TENANT, "note").await, 1);

    assert_eq!(svc.unindex_matching(TENANT, &[], true).await, 1);
    assert_eq!(svc.count(TENANT, "note").await, 0);
}
