use serde_json::Value;
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{DocumentEvent, DocumentPath, WriteAck},
};
use storage::Storage;
use tracing::info;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub fn documents_route() -> &'static str {
    "/documents/*path"
}

/// Current value of a document as a change event, so a fresh subscriber gets
/// the same shape it will see for every later write.
pub async fn current_document(
    ctx: &ApiContext,
    path: &DocumentPath,
) -> Result<DocumentEvent, ApiError> {
    let stored = ctx.storage.load_document(path).await.map_err(internal)?;
    Ok(match stored {
        Some(doc) => DocumentEvent::Changed {
            path: doc.path,
            revision: doc.revision,
            value: Some(doc.body),
        },
        None => DocumentEvent::Changed {
            path: path.clone(),
            revision: ctx.storage.revision(path).await.map_err(internal)?,
            value: None,
        },
    })
}

pub async fn replace_document(
    ctx: &ApiContext,
    path: &DocumentPath,
    body: Value,
) -> Result<(WriteAck, DocumentEvent), ApiError> {
    let stored = ctx
        .storage
        .put_document(path, &body)
        .await
        .map_err(internal)?;
    info!(%path, revision = stored.revision, "document replaced");

    let ack = WriteAck {
        path: stored.path.clone(),
        revision: stored.revision,
        updated_at: stored.updated_at,
    };
    let event = DocumentEvent::Changed {
        path: stored.path,
        revision: stored.revision,
        value: Some(stored.body),
    };
    Ok((ack, event))
}

pub async fn remove_document(
    ctx: &ApiContext,
    path: &DocumentPath,
) -> Result<DocumentEvent, ApiError> {
    let revision = ctx
        .storage
        .delete_document(path)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, format!("document '{path}' not found")))?;
    info!(%path, revision, "document removed");

    Ok(DocumentEvent::Changed {
        path: path.clone(),
        revision,
        value: None,
    })
}

pub fn parse_path(raw: &str) -> Result<DocumentPath, ApiError> {
    DocumentPath::parse(raw)
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
