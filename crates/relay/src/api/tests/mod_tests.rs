use super::*;
use serde_json::json;

async fn setup() -> ApiContext {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    ApiContext { storage }
}

#[tokio::test]
async fn current_document_of_empty_path_has_no_value() {
    let ctx = setup().await;
    let path = parse_path("tierlist").expect("path");
    let event = current_document(&ctx, &path).await.expect("current");
    match event {
        DocumentEvent::Changed {
            revision, value, ..
        } => {
            assert_eq!(revision, 0);
            assert!(value.is_none());
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn replace_returns_ack_and_matching_event() {
    let ctx = setup().await;
    let path = parse_path("tierlist").expect("path");
    let (ack, event) = replace_document(&ctx, &path, json!({ "S": [] }))
        .await
        .expect("replace");
    assert_eq!(ack.revision, 1);
    match event {
        DocumentEvent::Changed {
            revision, value, ..
        } => {
            assert_eq!(revision, 1);
            assert_eq!(value, Some(json!({ "S": [] })));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let current = current_document(&ctx, &path).await.expect("current");
    assert!(matches!(current, DocumentEvent::Changed { revision: 1, .. }));
}

#[tokio::test]
async fn removing_missing_document_is_not_found() {
    let ctx = setup().await;
    let path = parse_path("ghost").expect("path");
    let err = remove_document(&ctx, &path).await.expect_err("should fail");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn remove_announces_next_revision_and_current_keeps_it() {
    let ctx = setup().await;
    let path = parse_path("tierlist").expect("path");
    replace_document(&ctx, &path, json!({ "S": [] }))
        .await
        .expect("replace");

    let event = remove_document(&ctx, &path).await.expect("remove");
    assert!(matches!(
        event,
        DocumentEvent::Changed {
            revision: 2,
            value: None,
            ..
        }
    ));
    let current = current_document(&ctx, &path).await.expect("current");
    assert!(matches!(
        current,
        DocumentEvent::Changed {
            revision: 2,
            value: None,
            ..
        }
    ));

    let (ack, _) = replace_document(&ctx, &path, json!({}))
        .await
        .expect("replace after delete");
    assert_eq!(ack.revision, 3);
}

#[test]
fn rejects_paths_with_odd_characters() {
    assert_eq!(
        parse_path("../etc").expect_err("invalid").code,
        ErrorCode::Validation
    );
    assert_eq!(parse_path("/boards/one/").expect("valid").as_str(), "boards/one");
}
