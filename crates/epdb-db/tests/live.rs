//! Live integration tests for epdb-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/epdb-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use epdb_core::{parse_click_stats, policy_for, MoveOutcome};
use epdb_db::{
    backup_and_delete, browse_rows, count_deleted_items, create_credential, delete_rows,
    find_default_credential, find_title_duplicates, insert_products, insert_replacements,
    insert_titles, list_city_images, list_known_titles, list_product_keys,
    list_taken_identifiers, list_title_corpus, move_zero_click_items, preview_zero_clicks,
    reconcile_zero_clicks, record_credential_usage, set_default_credential, table_counts,
    truncate_table, update_row, upsert_products, BrowseQuery, DbError, NewCredential, SortOrder,
    TruncateMethod,
};
use serde_json::{json, Map, Value};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn insert_product(pool: &sqlx::PgPool, id: &str, original_id: Option<&str>, title: &str) {
    sqlx::query("INSERT INTO ep_data (id, original_id, title) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(original_id)
        .bind(title)
        .execute(pool)
        .await
        .unwrap_or_else(|e| panic!("insert_product failed for '{id}': {e}"));
}

async fn count_products(pool: &sqlx::PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM ep_data")
        .fetch_one(pool)
        .await
        .expect("count ep_data")
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

// ---------------------------------------------------------------------------
// Zero-click reconciliation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn reconcile_moves_zero_click_rows_and_reports_missing(pool: sqlx::PgPool) {
    insert_product(&pool, "EP-1", None, "Osaka Castle Pass").await;
    insert_product(&pool, "EP-2", Some("LEGACY-2"), "Kyoto Day Trip").await;
    insert_product(&pool, "EP-3", None, "Nara Deer Park").await;

    let csv = "상품ID,상품명,클릭수\nEP-1,a,0\nLEGACY-2,b,0\nEP-3,c,12\nGHOST,d,0\nEP-4,e,x\n";
    let parsed = parse_click_stats(csv.as_bytes()).expect("parse");

    let summary = reconcile_zero_clicks(&pool, &parsed).await;

    assert_eq!(summary.total_csv_items, 4);
    assert_eq!(summary.zero_click_items, 3);
    assert_eq!(summary.moved_to_delete, 2);
    assert_eq!(summary.not_found_in_ep_data, 1);
    assert_eq!(summary.failed_items, 0);
    assert_eq!(summary.invalid_rows, 1);
    assert_eq!(summary.not_found_ids, vec!["GHOST"]);
    assert_eq!(summary.total_moved_to_delete, 3);
    assert!(summary.is_balanced());

    assert_eq!(count_products(&pool).await, 1);

    let reason: String =
        sqlx::query_scalar("SELECT reason FROM deleted_items WHERE original_id = 'EP-2'")
            .fetch_one(&pool)
            .await
            .expect("backup for EP-2");
    assert_eq!(reason, "zero clicks");
}

#[sqlx::test(migrations = "../../migrations")]
async fn failed_move_rolls_back_backup_insert(pool: sqlx::PgPool) {
    insert_product(&pool, "EP-1", None, "Osaka Castle Pass").await;
    insert_product(&pool, "EP-2", None, "Kyoto Day Trip").await;

    sqlx::query(
        "CREATE FUNCTION refuse_delete() RETURNS trigger AS $$ \
         BEGIN \
             IF OLD.id = 'EP-2' THEN RAISE EXCEPTION 'refused'; END IF; \
             RETURN OLD; \
         END; $$ LANGUAGE plpgsql",
    )
    .execute(&pool)
    .await
    .expect("create trigger function");
    sqlx::query(
        "CREATE TRIGGER refuse_delete BEFORE DELETE ON ep_data \
         FOR EACH ROW EXECUTE FUNCTION refuse_delete()",
    )
    .execute(&pool)
    .await
    .expect("create trigger");

    let outcomes =
        move_zero_click_items(&pool, &["EP-1".to_string(), "EP-2".to_string()], "test").await;

    assert!(matches!(outcomes[0].1, MoveOutcome::Moved { .. }));
    assert!(matches!(outcomes[1].1, MoveOutcome::Failed(_)));

    // EP-2 stays active and has no orphaned backup.
    assert_eq!(count_products(&pool).await, 1);
    assert_eq!(count_deleted_items(&pool).await.expect("count"), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn reconcile_total_ignores_backups_from_earlier_runs(pool: sqlx::PgPool) {
    for n in 0..3 {
        sqlx::query(
            "INSERT INTO deleted_items (original_id, original_data, reason) \
             VALUES ($1, '{}'::jsonb, 'zero clicks')",
        )
        .bind(format!("OLD-{n}"))
        .execute(&pool)
        .await
        .expect("seed old backup");
    }
    insert_product(&pool, "EP-1", None, "Osaka Castle Pass").await;

    let parsed = parse_click_stats("상품ID,상품명,클릭수\nEP-1,a,0\nGHOST,b,0\n".as_bytes())
        .expect("parse");
    let summary = reconcile_zero_clicks(&pool, &parsed).await;

    assert_eq!(summary.moved_to_delete, 1);
    assert_eq!(summary.not_found_in_ep_data, 1);
    assert_eq!(summary.total_moved_to_delete, 2);
    assert_eq!(count_deleted_items(&pool).await.expect("count"), 4);
}

#[sqlx::test(migrations = "../../migrations")]
async fn preview_changes_nothing(pool: sqlx::PgPool) {
    insert_product(&pool, "EP-1", None, "Osaka Castle Pass").await;

    let csv = "상품ID,상품명,클릭수\nEP-1,a,0\nEP-9,b,0\n";
    let parsed = parse_click_stats(csv.as_bytes()).expect("parse");

    let preview = preview_zero_clicks(&pool, &parsed)
        .await
        .expect("preview_zero_clicks failed");

    assert_eq!(preview.matched.len(), 1);
    assert_eq!(preview.matched[0].ep_data_id, "EP-1");
    assert_eq!(preview.not_found_ids, vec!["EP-9"]);
    assert_eq!(count_products(&pool).await, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn backup_and_delete_stores_submitted_snapshots(pool: sqlx::PgPool) {
    insert_product(&pool, "EP-1", None, "Osaka Castle Pass").await;

    let items = vec![
        object(json!({ "id": "EP-1", "title": "Edited in sheet" })),
        object(json!({ "title": "no id" })),
    ];
    let backups = backup_and_delete(&pool, &items, "manual")
        .await
        .expect("backup_and_delete failed");

    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].original_id, "EP-1");
    assert_eq!(backups[0].original_data["title"], "Edited in sheet");
    assert_eq!(count_products(&pool).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn backup_and_delete_rejects_batch_without_ids(pool: sqlx::PgPool) {
    let err = backup_and_delete(&pool, &[object(json!({ "title": "x" }))], "manual")
        .await
        .expect_err("batch without ids should fail");
    assert!(matches!(err, DbError::EmptyBatch));
}

// ---------------------------------------------------------------------------
// Regeneration inserts
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn insert_products_strips_system_fields(pool: sqlx::PgPool) {
    let candidates = vec![object(json!({
        "id": "SHEET-1",
        "created_at": "2020-01-01T00:00:00Z",
        "title": "Busan Night View",
        "price_pc": 45000,
        "not_a_column": "ignored"
    }))];

    let rows = insert_products(&pool, candidates)
        .await
        .expect("insert_products failed");

    assert_eq!(rows.len(), 1);
    assert_ne!(rows[0]["id"], "SHEET-1");
    assert_eq!(rows[0]["original_id"], "SHEET-1");
    assert_eq!(rows[0]["price_pc"], 45000);

    let taken = list_taken_identifiers(&pool, "SHEET")
        .await
        .expect("list_taken_identifiers");
    assert!(taken.contains("SHEET-1"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn insert_products_is_all_or_nothing(pool: sqlx::PgPool) {
    let candidates = vec![
        object(json!({ "title": "Valid" })),
        object(json!({ "price_pc": 1 })),
    ];
    insert_products(&pool, candidates)
        .await
        .expect_err("missing title should fail the batch");
    assert_eq!(count_products(&pool).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn replacements_store_products_and_titles_together(pool: sqlx::PgPool) {
    let candidates = vec![object(json!({ "title": "Osaka Fresh", "city": "Osaka" }))];
    let titles = vec![("Osaka Fresh".to_string(), Some("Osaka".to_string()))];

    let (products, logged) = insert_replacements(&pool, candidates, &titles)
        .await
        .expect("insert_replacements failed");

    assert_eq!(products.len(), 1);
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].city.as_deref(), Some("Osaka"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn failed_title_log_rolls_back_replacement_products(pool: sqlx::PgPool) {
    sqlx::query(
        "CREATE FUNCTION reject_titles() RETURNS trigger LANGUAGE plpgsql AS $$ \
         BEGIN RAISE EXCEPTION 'titles unavailable'; END; $$",
    )
    .execute(&pool)
    .await
    .expect("create trigger function");
    sqlx::query(
        "CREATE TRIGGER reject_titles BEFORE INSERT ON titles \
         FOR EACH ROW EXECUTE FUNCTION reject_titles()",
    )
    .execute(&pool)
    .await
    .expect("create trigger");

    let candidates = vec![object(json!({ "title": "Osaka Fresh" }))];
    let titles = vec![("Osaka Fresh".to_string(), Some("Osaka".to_string()))];
    insert_replacements(&pool, candidates, &titles)
        .await
        .expect_err("title log failure should fail the batch");

    assert_eq!(count_products(&pool).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn upsert_products_inserts_new_ids_and_replaces_existing(pool: sqlx::PgPool) {
    insert_product(&pool, "EP-1", Some("EP-1"), "Old title").await;

    let rows = vec![
        object(json!({ "id": "EP-1", "title": "New title", "price_pc": 1000 })),
        object(json!({ "id": "EP-2", "title": "Second", "city": "Osaka", "extra": "ignored" })),
    ];
    let written = upsert_products(&pool, &rows).await.expect("upsert_products");

    assert_eq!(written, 2);
    assert_eq!(count_products(&pool).await, 2);
    let (title, price, original_id): (String, Option<i64>, Option<String>) =
        sqlx::query_as("SELECT title, price_pc, original_id FROM ep_data WHERE id = 'EP-1'")
            .fetch_one(&pool)
            .await
            .expect("fetch EP-1");
    assert_eq!(title, "New title");
    assert_eq!(price, Some(1000));
    assert_eq!(original_id, None);
}

#[sqlx::test(migrations = "../../migrations")]
async fn upsert_products_commits_nothing_when_a_row_fails(pool: sqlx::PgPool) {
    let rows = vec![
        object(json!({ "id": "EP-1", "title": "Valid" })),
        object(json!({ "id": "EP-2" })),
    ];
    upsert_products(&pool, &rows)
        .await
        .expect_err("missing title should fail");
    assert_eq!(count_products(&pool).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn product_keys_list_identifying_columns(pool: sqlx::PgPool) {
    insert_product(&pool, "uuid-1", Some("20250101_A12_Osaka_0001"), "Osaka tour").await;

    let keys = list_product_keys(&pool).await.expect("list_product_keys");

    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].id, "uuid-1");
    assert_eq!(keys[0].original_id.as_deref(), Some("20250101_A12_Osaka_0001"));
    assert_eq!(keys[0].title.as_deref(), Some("Osaka tour"));
}

// ---------------------------------------------------------------------------
// Admin table operations
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn update_row_applies_only_allow_listed_columns(pool: sqlx::PgPool) {
    insert_product(&pool, "EP-1", None, "Old").await;
    let policy = policy_for("ep_data").expect("policy");

    let values = object(json!({ "title": "New", "price_pc": "1200", "id": "HIJACK" }));
    let updates = policy.filter_updates(&values);
    let row = update_row(&pool, policy, "EP-1", &updates)
        .await
        .expect("update_row failed");

    assert_eq!(row["id"], "EP-1");
    assert_eq!(row["title"], "New");
    assert_eq!(row["price_pc"], 1200);

    let keys: Vec<&str> = row
        .as_object()
        .expect("object")
        .keys()
        .take(4)
        .map(String::as_str)
        .collect();
    assert_eq!(keys, ["id", "original_id", "title", "price_pc"]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_row_reports_missing_row(pool: sqlx::PgPool) {
    let policy = policy_for("deleted_items").expect("policy");
    let values = object(json!({ "reason": "x" }));
    let err = update_row(&pool, policy, "not-a-number", &policy.filter_updates(&values))
        .await
        .expect_err("malformed id should not match");
    assert!(matches!(err, DbError::NotFound));
}

#[sqlx::test(migrations = "../../migrations")]
async fn delete_rows_counts_requested_and_matched(pool: sqlx::PgPool) {
    insert_product(&pool, "EP-1", None, "a").await;
    insert_product(&pool, "EP-2", None, "b").await;
    let policy = policy_for("ep_data").expect("policy");

    let outcome = delete_rows(
        &pool,
        policy,
        &["EP-1".to_string(), "EP-2".to_string(), "EP-3".to_string()],
    )
    .await
    .expect("delete_rows failed");

    assert_eq!(outcome.requested, 3);
    assert_eq!(outcome.matched, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn truncate_uses_privileged_function(pool: sqlx::PgPool) {
    insert_product(&pool, "EP-1", None, "a").await;
    let policy = policy_for("ep_data").expect("policy");

    let method = truncate_table(&pool, policy).await.expect("truncate failed");
    assert_eq!(method, TruncateMethod::Truncate);
    assert_eq!(count_products(&pool).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn truncate_falls_back_to_delete(pool: sqlx::PgPool) {
    insert_product(&pool, "EP-1", None, "a").await;
    sqlx::query("DROP FUNCTION admin_truncate_table(TEXT)")
        .execute(&pool)
        .await
        .expect("drop function");
    let policy = policy_for("ep_data").expect("policy");

    let method = truncate_table(&pool, policy).await.expect("truncate failed");
    assert_eq!(method, TruncateMethod::DeleteAll);
    assert_eq!(count_products(&pool).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn browse_rows_filters_sorts_and_pages(pool: sqlx::PgPool) {
    insert_product(&pool, "EP-1", None, "Osaka Castle").await;
    insert_product(&pool, "EP-2", None, "Osaka Aquarium").await;
    insert_product(&pool, "EP-3", None, "Tokyo Tower").await;
    let policy = policy_for("ep_data").expect("policy");

    let page = browse_rows(
        &pool,
        policy,
        &BrowseQuery {
            page: 1,
            limit: 1,
            search: Some("osaka".to_string()),
            sort_by: Some("title".to_string()),
            sort_order: SortOrder::Asc,
        },
    )
    .await
    .expect("browse_rows failed");

    assert_eq!(page.total, 2);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.rows.len(), 1);
    assert_eq!(page.rows[0]["title"], "Osaka Aquarium");
}

#[sqlx::test(migrations = "../../migrations")]
async fn table_counts_cover_every_registered_table(pool: sqlx::PgPool) {
    insert_product(&pool, "EP-1", None, "a").await;
    let counts = table_counts(&pool).await.expect("table_counts failed");
    assert_eq!(counts.len(), 5);
    assert_eq!(counts[0].table, "ep_data");
    assert_eq!(counts[0].count, 1);
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn set_default_leaves_one_default_per_provider(pool: sqlx::PgPool) {
    let first = create_credential(
        &pool,
        &NewCredential {
            provider: "openai",
            name: "primary",
            description: None,
            api_key: "sk-first-0000000000",
        },
    )
    .await
    .expect("create first");
    let second = create_credential(
        &pool,
        &NewCredential {
            provider: "openai",
            name: "secondary",
            description: Some("backup key"),
            api_key: "sk-second-000000000",
        },
    )
    .await
    .expect("create second");

    set_default_credential(&pool, first.id).await.expect("set first");
    set_default_credential(&pool, second.id).await.expect("set second");

    let defaults: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM api WHERE provider = 'openai' AND is_default")
            .fetch_one(&pool)
            .await
            .expect("count defaults");
    assert_eq!(defaults, 1);

    let chosen = find_default_credential(&pool, "openai")
        .await
        .expect("find default")
        .expect("a default exists");
    assert_eq!(chosen.id, second.id);

    record_credential_usage(&pool, chosen.id).await.expect("usage");
    let refreshed = epdb_db::get_credential(&pool, chosen.id).await.expect("get");
    assert_eq!(refreshed.usage_count, 1);
    assert!(refreshed.last_used_at.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn set_default_unknown_id_is_not_found(pool: sqlx::PgPool) {
    let err = set_default_credential(&pool, 999_999)
        .await
        .expect_err("unknown id");
    assert!(matches!(err, DbError::NotFound));
}

// ---------------------------------------------------------------------------
// Titles
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn duplicate_check_searches_active_and_backup_tables(pool: sqlx::PgPool) {
    insert_product(&pool, "EP-1", None, "Osaka Castle Pass").await;
    insert_product(&pool, "EP-2", None, "Kyoto Day Trip").await;
    let items = vec![object(json!({ "id": "EP-2", "title": "Kyoto Day Trip" }))];
    backup_and_delete(&pool, &items, "manual").await.expect("backup");

    let active = find_title_duplicates(&pool, "castle").await.expect("check");
    assert!(active.found_in_ep_data);
    assert!(!active.found_in_delete);
    assert_eq!(active.ep_data_id.as_deref(), Some("EP-1"));

    let deleted = find_title_duplicates(&pool, "Kyoto Day Trip").await.expect("check");
    assert!(!deleted.found_in_ep_data);
    assert!(deleted.found_in_delete);
    assert!(deleted.delete_id.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn duplicate_check_treats_wildcards_literally(pool: sqlx::PgPool) {
    insert_product(&pool, "EP-1", None, "Osaka Castle Pass").await;
    insert_product(&pool, "EP-2", None, "Summer 50% Sale").await;

    let wildcard = find_title_duplicates(&pool, "%").await.expect("check");
    assert!(!wildcard.found_in_ep_data);

    let underscore = find_title_duplicates(&pool, "Osaka_Castle").await.expect("check");
    assert!(!underscore.found_in_ep_data);

    let literal = find_title_duplicates(&pool, "50% sale").await.expect("check");
    assert_eq!(literal.ep_data_id.as_deref(), Some("EP-2"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn title_corpus_spans_active_and_deleted(pool: sqlx::PgPool) {
    insert_product(&pool, "EP-1", None, "Osaka Castle Pass").await;
    insert_product(&pool, "EP-2", None, "Kyoto Day Trip").await;
    let items = vec![object(json!({ "id": "EP-2", "title": "Kyoto Day Trip" }))];
    backup_and_delete(&pool, &items, "manual").await.expect("backup");

    insert_titles(&pool, &[("Fresh Title".to_string(), Some("Osaka".to_string()))])
        .await
        .expect("insert_titles");

    let corpus = list_title_corpus(&pool).await.expect("corpus");
    assert_eq!(corpus.len(), 2);

    let known = list_known_titles(&pool).await.expect("known");
    assert!(known.contains(&"Fresh Title".to_string()));
    assert!(known.contains(&"Osaka Castle Pass".to_string()));
}

#[sqlx::test(migrations = "../../migrations")]
async fn city_images_list_main_image_first(pool: sqlx::PgPool) {
    sqlx::query(
        "INSERT INTO city_images (city, image_link, is_main_image) VALUES \
         ('Osaka', 'https://img/2.jpg', false), ('Osaka', 'https://img/1.jpg', true)",
    )
    .execute(&pool)
    .await
    .expect("seed city images");

    let images = list_city_images(&pool).await.expect("list_city_images");
    assert_eq!(images.len(), 2);
    assert!(images[0].is_main_image);
}
