//! Document intake and lookup handlers

use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use recordflow_common::{
    auth::{Actor, AuthContext},
    db::{
        load_live_document,
        models::{Category, Document, NewDocument, Urgency},
    },
    errors::{AppError, Result},
    metrics, reference,
    workflow::WorkflowOutcome,
};

struct UploadedFile {
    filename: String,
    content_type: Option<String>,
    bytes: Bytes,
}

#[derive(Default, Validate)]
struct UploadForm {
    #[validate(length(min = 1, max = 300))]
    title: String,

    #[validate(length(max = 5000))]
    description: Option<String>,

    category: Option<String>,

    urgency: Option<String>,

    #[validate(length(max = 20))]
    tags: Vec<String>,

    department_id: Option<String>,

    file: Option<UploadedFile>,
}

fn bad_multipart(e: MultipartError) -> AppError {
    AppError::InvalidFormat {
        message: e.body_text(),
    }
}

fn invalid(field: &str, message: impl Into<String>) -> AppError {
    AppError::Validation {
        message: message.into(),
        field: Some(field.to_string()),
    }
}

/// Media type from the file extension, for clients that send none
fn guess_media_type(filename: &str) -> &'static str {
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        _ => "application/octet-stream",
    }
}

async fn read_form(multipart: &mut Multipart) -> Result<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "upload.bin".to_string());
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                form.file = Some(UploadedFile {
                    filename,
                    content_type,
                    bytes,
                });
            }
            "title" => form.title = field.text().await.map_err(bad_multipart)?.trim().to_string(),
            "description" => {
                let text = field.text().await.map_err(bad_multipart)?;
                form.description = Some(text.trim().to_string()).filter(|d| !d.is_empty());
            }
            "category" => form.category = Some(field.text().await.map_err(bad_multipart)?),
            "urgency" => form.urgency = Some(field.text().await.map_err(bad_multipart)?),
            "tags" => {
                form.tags = field
                    .text()
                    .await
                    .map_err(bad_multipart)?
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
            }
            "department_id" => form.department_id = Some(field.text().await.map_err(bad_multipart)?),
            other => tracing::debug!(field = other, "Ignoring unknown upload field"),
        }
    }

    Ok(form)
}

/// Upload a record and start background analysis
pub async fn upload(
    State(state): State<AppState>,
    auth: AuthContext,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Document>)> {
    let form = read_form(&mut multipart).await?;
    form.validate()?;

    let category = match form.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(raw) => raw
            .parse::<Category>()
            .map_err(|e| invalid("category", e.to_string()))?,
        None => return Err(AppError::MissingField { field: "category".to_string() }),
    };
    let urgency = match form.urgency.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(raw) => raw
            .parse::<Urgency>()
            .map_err(|e| invalid("urgency", e.to_string()))?,
        None => Urgency::Medium,
    };

    let department_id = match form.department_id.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(raw) => Uuid::parse_str(raw).map_err(|_| invalid("department_id", "not a valid id"))?,
        None => return Err(AppError::MissingField { field: "department_id".to_string() }),
    };
    let department = state
        .directory
        .find_active_department(department_id)
        .await?
        .ok_or_else(|| AppError::DepartmentNotFound {
            reference: department_id.to_string(),
        })?;

    let file = form
        .file
        .ok_or_else(|| AppError::MissingField { field: "file".to_string() })?;
    if file.bytes.is_empty() {
        return Err(invalid("file", "uploaded file is empty"));
    }
    let limit = state.config.server.max_upload_bytes;
    if file.bytes.len() > limit {
        return Err(AppError::PayloadTooLarge {
            size: file.bytes.len(),
            limit,
        });
    }

    let media_type = file
        .content_type
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream")
        .unwrap_or_else(|| guess_media_type(&file.filename).to_string());

    let locator = state.files.save(&file.filename, &file.bytes).await?;

    let draft = Document::from_upload(
        NewDocument {
            title: form.title,
            description: form.description,
            uploaded_by: auth.actor.id,
            uploader_name: auth.actor.name.clone(),
            initial_department_id: department.id,
            file_path: locator.clone(),
            original_filename: file.filename,
            media_type: media_type.clone(),
            size_bytes: file.bytes.len() as i64,
            category,
            urgency,
            tags: form.tags,
        },
        String::new(),
    );

    let document = match reference::insert_with_reference(state.documents.as_ref(), draft).await {
        Ok(document) => document,
        Err(e) => {
            if let Err(cleanup) = state.files.delete(&locator).await {
                tracing::warn!(locator = %locator, error = %cleanup, "Failed to remove orphaned upload");
            }
            return Err(e);
        }
    };

    metrics::record_upload(&media_type);
    tracing::info!(
        document_id = %document.id,
        reference = %document.reference_number,
        department = %department.name,
        media_type = %media_type,
        request_id = %auth.request_id,
        "Document uploaded"
    );

    state.orchestrator.spawn(document.id);

    Ok((StatusCode::ACCEPTED, Json(document)))
}

/// Uploader, super administrators, and members of the initial or current
/// department may read a document
pub(crate) fn ensure_can_view(actor: &Actor, document: &Document) -> Result<()> {
    let member = actor
        .department_id
        .map(|d| document.department_id == Some(d) || document.initial_department_id == d)
        .unwrap_or(false);
    actor.require(
        actor.is_super_admin() || document.uploaded_by == actor.id || member,
        "view this document",
    )
}

pub async fn get_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
) -> Result<Json<Document>> {
    let document = load_live_document(state.documents.as_ref(), document_id).await?;
    ensure_can_view(&auth.actor, &document)?;
    Ok(Json(document))
}

pub async fn get_by_reference(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(reference): Path<String>,
) -> Result<Json<Document>> {
    let document = state
        .documents
        .find_document_by_reference(reference.trim())
        .await?
        .filter(|d| !d.is_deleted)
        .ok_or_else(|| AppError::DocumentNotFound { id: reference.clone() })?;
    ensure_can_view(&auth.actor, &document)?;
    Ok(Json(document))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    pub reason: Option<String>,
}

/// Soft delete
pub async fn delete_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<WorkflowOutcome>> {
    let outcome = state
        .workflow
        .soft_delete(document_id, &auth.actor, params.reason)
        .await?;
    Ok(Json(outcome))
}

/// Hard delete a soft-deleted document and its stored file
pub async fn purge_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
) -> Result<StatusCode> {
    let purged = state.workflow.purge(document_id, &auth.actor).await?;

    if let Err(e) = state.files.delete(&purged.file_path).await {
        tracing::warn!(document_id = %document_id, error = %e, "Failed to remove stored file");
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_media_type() {
        assert_eq!(guess_media_type("scan.PDF"), "application/pdf");
        assert_eq!(guess_media_type("photo.jpeg"), "image/jpeg");
        assert_eq!(guess_media_type("notes"), "application/octet-stream");
    }

    #[test]
    fn test_upload_form_validation() {
        let form = UploadForm {
            title: String::new(),
            ..Default::default()
        };
        assert!(form.validate().is_err());

        let form = UploadForm {
            title: "Memo".to_string(),
            tags: vec!["x".to_string(); 21],
            ..Default::default()
        };
        assert!(form.validate().is_err());
    }
}
