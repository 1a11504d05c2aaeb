mod common;

use serde_json::json;
use tableforge::{
    AppError, ColumnDefinition, ColumnUpdate, DataQuery, IndexDefinition, TableDefinition, TableMetadataUpdate,
    TableService,
};

fn notes_table(name: &str) -> TableDefinition {
    TableDefinition::new(
        name,
        vec![
            ColumnDefinition::new("id", "serial").primary_key(),
            ColumnDefinition::new("title", "text").not_null(),
            ColumnDefinition::new("tags", "text[]"),
        ],
    )
}

#[tokio::test]
async fn create_get_delete_lifecycle() {
    let Some(state) = common::state().await else { return };
    let tables = TableService::new(state);
    let name = common::unique("notes");

    let created = tables.create("owner_a", notes_table(&name)).await.unwrap();
    assert_eq!(created.name, name);
    assert_eq!(created.owner_id, "owner_a");
    assert_eq!(created.columns().len(), 3);
    assert!(!created.column("id").unwrap().nullable);

    let fetched = tables.get(&name).await.unwrap();
    assert_eq!(fetched.schema, created.schema);
    let owned = tables.list(Some("owner_a")).await.unwrap();
    assert!(owned.iter().any(|t| t.name == name));

    tables.delete(&name, false).await.unwrap();
    assert!(matches!(tables.get(&name).await, Err(AppError::NotFound(_))));
    assert!(matches!(tables.delete(&name, false).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn duplicate_create_is_already_exists() {
    let Some(state) = common::state().await else { return };
    let tables = TableService::new(state);
    let name = common::unique("dup");

    tables.create("u", notes_table(&name)).await.unwrap();
    let second = tables.create("u", notes_table(&name)).await;
    assert!(matches!(second, Err(AppError::AlreadyExists(_))));
    tables.delete(&name, false).await.unwrap();
}

#[tokio::test]
async fn concurrent_creates_of_one_name_leave_one_table() {
    let Some(state) = common::state().await else { return };
    let first = TableService::new(state.clone());
    let second = TableService::new(state);
    let name = common::unique("race");

    let (a, b) = tokio::join!(first.create("u1", notes_table(&name)), second.create("u2", notes_table(&name)));
    let outcomes = [a.is_ok(), b.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser, Err(AppError::AlreadyExists(_))), "{:?}", loser.err());

    assert_eq!(first.get(&name).await.unwrap().columns().len(), 3);
    first.delete(&name, false).await.unwrap();
}

#[tokio::test]
async fn constraint_words_in_a_type_are_rejected() {
    let Some(state) = common::state().await else { return };
    let tables = TableService::new(state);
    let name = common::unique("smuggle");
    let def = TableDefinition::new(&name, vec![ColumnDefinition::new("id", "integer primary key")]);
    assert!(matches!(tables.create("u", def).await, Err(AppError::Validation(_))));
    assert!(tables.get_create_statement(&name).await.is_err());
}

#[tokio::test]
async fn invalid_definition_is_rejected_before_ddl() {
    let Some(state) = common::state().await else { return };
    let tables = TableService::new(state);
    let name = common::unique("bad");
    let def = TableDefinition::new(
        &name,
        vec![ColumnDefinition::new("a", "text"), ColumnDefinition::new("a", "integer")],
    );
    assert!(matches!(tables.create("u", def).await, Err(AppError::Validation(_))));
    assert!(matches!(tables.get(&name).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn second_page_of_two() {
    let Some(state) = common::state().await else { return };
    let tables = TableService::new(state);
    let name = common::unique("paged");
    tables
        .create(
            "u",
            TableDefinition::new(
                &name,
                vec![
                    ColumnDefinition::new("id", "serial").primary_key(),
                    ColumnDefinition::new("n", "integer"),
                ],
            ),
        )
        .await
        .unwrap();
    for n in 1..=5 {
        tables.insert_row(&name, &json!({ "n": n })).await.unwrap();
    }

    let data = tables
        .get_data(&name, DataQuery { page: 2, page_size: 2, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(data.rows.len(), 2);
    assert_eq!(data.rows[0]["n"], json!(3));
    assert_eq!(data.rows[1]["n"], json!(4));
    assert_eq!(data.pagination.total_count, 5);
    assert_eq!(data.pagination.total_pages, 3);
    assert_eq!(tables.get(&name).await.unwrap().row_count, 5);

    let filtered = tables
        .get_data(
            &name,
            DataQuery {
                filter_column: Some("n".into()),
                filter_value: Some(json!("4")),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(filtered.pagination.total_count, 1);

    let bad_order = tables
        .get_data(&name, DataQuery { order_by: Some("missing".into()), ..Default::default() })
        .await;
    assert!(matches!(bad_order, Err(AppError::Column(_))));
    let bad_page = tables.get_data(&name, DataQuery { page: 0, ..Default::default() }).await;
    assert!(matches!(bad_page, Err(AppError::Validation(_))));

    tables.delete(&name, false).await.unwrap();
}

#[tokio::test]
async fn primary_key_column_cannot_be_dropped() {
    let Some(state) = common::state().await else { return };
    let tables = TableService::new(state);
    let name = common::unique("pkdrop");
    tables.create("u", notes_table(&name)).await.unwrap();

    assert!(matches!(tables.delete_column(&name, "id").await, Err(AppError::Column(_))));
    assert!(matches!(tables.delete_column(&name, "nope").await, Err(AppError::Column(_))));
    let after = tables.delete_column(&name, "tags").await.unwrap();
    assert!(after.column("tags").is_none());

    tables.delete(&name, false).await.unwrap();
}

#[tokio::test]
async fn uuid_keyed_rows_end_to_end() {
    let Some(state) = common::state().await else { return };
    let tables = TableService::new(state);
    let name = common::unique("people");
    tables
        .create(
            "u",
            TableDefinition::new(
                &name,
                vec![
                    ColumnDefinition::new("id", "uuid").primary_key(),
                    ColumnDefinition::new("name", "varchar(80)").not_null(),
                    ColumnDefinition::new("active", "boolean").with_default(json!(true)),
                    ColumnDefinition::new("born", "date"),
                    ColumnDefinition::new("profile", "jsonb"),
                    ColumnDefinition::new("balance", "numeric(10,2)"),
                ],
            ),
        )
        .await
        .unwrap();

    let row = tables
        .insert_row(
            &name,
            &json!({
                "name": "Ada",
                "born": "1815/12/10",
                "profile": "{\"lang\": \"en\"}",
                "balance": "12.50"
            }),
        )
        .await
        .unwrap();
    let id = row["id"].clone();
    assert!(uuid::Uuid::parse_str(id.as_str().unwrap()).is_ok());
    assert_eq!(row["active"], json!(true));
    assert_eq!(row["born"], json!("1815-12-10"));
    assert_eq!(row["profile"], json!({"lang": "en"}));
    assert_eq!(row["balance"], json!("12.50"));

    let unknown = tables.insert_row(&name, &json!({ "nickname": "x" })).await;
    assert!(matches!(unknown, Err(AppError::Column(_))));
    let bad_value = tables.insert_row(&name, &json!({ "name": "B", "active": "maybe" })).await;
    assert!(matches!(bad_value, Err(AppError::Validation(_))));
    let empty = tables.insert_row(&name, &json!({})).await;
    assert!(matches!(empty, Err(AppError::Validation(_))));

    let updated = tables
        .update_row(&name, &id, None, &json!({ "name": "Ada L.", "active": "no" }))
        .await
        .unwrap();
    assert_eq!(updated["name"], json!("Ada L."));
    assert_eq!(updated["active"], json!(false));

    let missing = json!(uuid::Uuid::new_v4().to_string());
    let not_found = tables.update_row(&name, &missing, None, &json!({ "name": "x" })).await;
    assert!(matches!(not_found, Err(AppError::NotFound(_))));

    tables.delete_row(&name, &id, None).await.unwrap();
    assert!(matches!(tables.delete_row(&name, &id, None).await, Err(AppError::NotFound(_))));
    assert_eq!(tables.get(&name).await.unwrap().row_count, 0);
    let data = tables.get_data(&name, DataQuery::default()).await.unwrap();
    assert!(data.rows.is_empty());
    assert_eq!(data.pagination.total_count, 0);

    tables.delete(&name, false).await.unwrap();
}

#[tokio::test]
async fn column_and_index_changes_reach_catalog_and_registry() {
    let Some(state) = common::state().await else { return };
    let tables = TableService::new(state);
    let name = common::unique("evolve");
    tables.create("u", notes_table(&name)).await.unwrap();

    tables
        .add_column(&name, ColumnDefinition::new("score", "integer").with_default(json!(0)))
        .await
        .unwrap();
    let dup = tables.add_column(&name, ColumnDefinition::new("score", "integer")).await;
    assert!(matches!(dup, Err(AppError::Column(_))));

    let record = tables
        .update_column(
            &name,
            "score",
            ColumnUpdate {
                new_name: Some("points".into()),
                type_: Some("bigint".into()),
                nullable: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let points = record.column("points").unwrap();
    assert_eq!(points.type_, "bigint");
    assert!(!points.nullable);
    assert!(record.column("score").is_none());

    let record = tables
        .add_index(&name, IndexDefinition { name: None, columns: vec!["points".into()], unique: false })
        .await
        .unwrap();
    assert_eq!(record.schema.indexes.len(), 1);
    let bad_index = tables
        .add_index(&name, IndexDefinition { name: None, columns: vec!["ghost".into()], unique: false })
        .await;
    assert!(matches!(bad_index, Err(AppError::Column(_))));

    let ddl = tables.get_create_statement(&name).await.unwrap();
    assert!(ddl.contains("\"points\" bigint NOT NULL"));
    assert!(ddl.contains("PRIMARY KEY (\"id\")"));
    assert!(ddl.contains(&format!("idx_{}_points", name)));

    tables.delete(&name, false).await.unwrap();
}

#[tokio::test]
async fn rename_and_metadata_update() {
    let Some(state) = common::state().await else { return };
    let tables = TableService::new(state);
    let name = common::unique("before");
    let taken = common::unique("taken");
    let renamed = common::unique("after");
    tables.create("u", notes_table(&name)).await.unwrap();
    tables.create("u", notes_table(&taken)).await.unwrap();

    let clash = tables
        .update_metadata(&name, TableMetadataUpdate { new_name: Some(taken.clone()), ..Default::default() })
        .await;
    assert!(matches!(clash, Err(AppError::AlreadyExists(_))));

    let mut metadata = serde_json::Map::new();
    metadata.insert("color".into(), json!("blue"));
    let record = tables
        .update_metadata(
            &name,
            TableMetadataUpdate {
                new_name: Some(renamed.clone()),
                description: Some("renamed table".into()),
                is_public: Some(true),
                metadata: Some(metadata),
            },
        )
        .await
        .unwrap();
    assert_eq!(record.name, renamed);
    assert!(record.is_public);
    assert_eq!(record.description.as_deref(), Some("renamed table"));
    assert_eq!(record.metadata["color"], json!("blue"));
    assert!(matches!(tables.get(&name).await, Err(AppError::NotFound(_))));

    tables.delete(&renamed, false).await.unwrap();
    tables.delete(&taken, false).await.unwrap();
}

#[tokio::test]
async fn resync_registers_strays_and_drops_ghosts() {
    let Some(state) = common::state().await else { return };
    let tables = TableService::new(state.clone());
    let stray = common::unique("stray");

    sqlx::query(&format!("CREATE TABLE public.{} (id integer PRIMARY KEY, label text)", stray))
        .execute(&state.pool)
        .await
        .unwrap();
    assert!(matches!(tables.get(&stray).await, Err(AppError::NotFound(_))));
    let ddl = tables.get_create_statement(&stray).await.unwrap();
    assert!(ddl.contains("\"label\" text"));

    let report = tables.resync_registry().await.unwrap();
    assert!(report.registered.contains(&stray));
    let record = tables.get(&stray).await.unwrap();
    assert_eq!(record.owner_id, "system");
    assert_eq!(record.columns().len(), 2);

    sqlx::query(&format!("ALTER TABLE public.{} ADD COLUMN weight real", stray))
        .execute(&state.pool)
        .await
        .unwrap();
    let report = tables.resync_registry().await.unwrap();
    assert!(report.refreshed.contains(&stray));
    assert!(tables.get(&stray).await.unwrap().column("weight").is_some());

    sqlx::query(&format!("DROP TABLE public.{}", stray)).execute(&state.pool).await.unwrap();
    let report = tables.resync_registry().await.unwrap();
    assert!(report.deregistered.contains(&stray));
    assert!(matches!(tables.get(&stray).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn filters_on_json_and_point_columns() {
    let Some(state) = common::state().await else { return };
    let tables = TableService::new(state);
    let name = common::unique("shapes");
    tables
        .create(
            "u",
            TableDefinition::new(
                &name,
                vec![
                    ColumnDefinition::new("id", "serial").primary_key(),
                    ColumnDefinition::new("pt", "point"),
                    ColumnDefinition::new("j", "json"),
                ],
            ),
        )
        .await
        .unwrap();
    tables.insert_row(&name, &json!({ "pt": "(1,2)", "j": { "a": [1] } })).await.unwrap();
    tables.insert_row(&name, &json!({ "pt": "(3,4)", "j": { "a": [2] } })).await.unwrap();

    let by_point = tables
        .get_data(&name, DataQuery { filter_column: Some("pt".into()), filter_value: Some(json!("(1,2)")), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(by_point.pagination.total_count, 1);
    let by_json = tables
        .get_data(&name, DataQuery { filter_column: Some("j".into()), filter_value: Some(json!({ "a": [2] })), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(by_json.pagination.total_count, 1);
    assert_eq!(by_json.rows[0]["pt"], json!("(3,4)"));

    tables.delete(&name, false).await.unwrap();
}
