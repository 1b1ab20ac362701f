use serde_json::json;
use shared::protocol::DocumentPath;
use storage::Storage;

#[tokio::test]
async fn documents_survive_reopening_the_database_file() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("relay.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));
    let doc = DocumentPath::parse("tierlist").expect("path");

    let storage = Storage::new(&database_url).await.expect("db");
    storage
        .put_document(&doc, &json!({ "unranked": ["Item 1"] }))
        .await
        .expect("put");
    drop(storage);

    assert!(db_path.exists(), "database file should exist: {}", db_path.display());

    let reopened = Storage::new(&database_url).await.expect("reopen");
    let loaded = reopened
        .load_document(&doc)
        .await
        .expect("load")
        .expect("document present");
    assert_eq!(loaded.body, json!({ "unranked": ["Item 1"] }));
    assert_eq!(loaded.revision, 1);
}
