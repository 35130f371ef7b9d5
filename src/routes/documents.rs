//! Owner/admin document routes (spec §6): create + upload, invite, status
//! transitions, audit trail, chain verification, and file validation.

use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use futures_util::TryStreamExt;
use serde::Deserialize;

use crate::audit::AuditLogger;
use crate::error::{AppError, AppResult};
use crate::ids::DocumentId;
use crate::routes::extractors::AuthedUser;
use crate::services::document::{NewDocument, SignerDescriptor};
use crate::services::{DocumentService, Validator};
use crate::storage::Storage;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteSignerBody {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub cpf: Option<String>,
    pub qualification: Option<String>,
    pub auth_channels: Vec<crate::model::AuthChannel>,
    pub order: Option<u32>,
}

#[derive(Deserialize)]
pub struct InviteBody {
    pub signers: Vec<InviteSignerBody>,
}

/// Read a multipart field into `(file_name, bytes)`, along with any plain
/// text fields collected along the way.
struct UploadForm {
    title: Option<String>,
    file_name: String,
    mime_type: String,
    bytes: Vec<u8>,
}

async fn read_upload(mut payload: Multipart) -> AppResult<UploadForm> {
    let mut title = None;
    let mut file_name = None;
    let mut mime_type = "application/pdf".to_string();
    let mut bytes = Vec::new();

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| AppError::Validation(format!("multipart: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "documentFile" {
            file_name = field
                .content_disposition()
                .and_then(|cd| cd.get_filename())
                .map(str::to_string);
            if let Some(mime) = field.content_type() {
                mime_type = mime.to_string();
            }
            while let Some(chunk) = field
                .try_next()
                .await
                .map_err(|e| AppError::Validation(format!("multipart: {e}")))?
            {
                bytes.extend_from_slice(&chunk);
            }
        } else if name == "title" {
            let mut buf = Vec::new();
            while let Some(chunk) = field
                .try_next()
                .await
                .map_err(|e| AppError::Validation(format!("multipart: {e}")))?
            {
                buf.extend_from_slice(&chunk);
            }
            title = String::from_utf8(buf).ok();
        }
    }

    if bytes.is_empty() {
        return Err(AppError::Validation("documentFile is required".to_string()));
    }

    Ok(UploadForm {
        title,
        file_name: file_name.unwrap_or_else(|| "document.pdf".to_string()),
        mime_type,
        bytes,
    })
}

/// POST /documents
pub async fn create_document(
    user: AuthedUser,
    service: web::Data<DocumentService>,
    payload: Multipart,
) -> AppResult<HttpResponse> {
    let form = read_upload(payload).await?;
    let file_extension = form
        .file_name
        .rfind('.')
        .map(|dot| form.file_name[dot..].to_string())
        .unwrap_or_else(|| ".pdf".to_string());

    let document = service.create_and_upload(
        NewDocument {
            tenant_id: user.0.tenant_id,
            owner_id: user.0.user_id,
            title: form.title.unwrap_or_else(|| form.file_name.clone()),
            mime_type: form.mime_type,
            deadline_at: None,
            file_extension,
            bytes: form.bytes,
        },
        &form.file_name,
    )?;

    Ok(HttpResponse::Ok().json(document))
}

/// GET /documents
pub async fn list_documents(user: AuthedUser, service: web::Data<DocumentService>) -> AppResult<HttpResponse> {
    let documents = service.list_for_tenant(&user.0.tenant_id.to_string())?;
    Ok(HttpResponse::Ok().json(documents))
}

/// POST /documents/{id}/invite
pub async fn invite_signers(
    user: AuthedUser,
    service: web::Data<DocumentService>,
    path: web::Path<DocumentId>,
    body: web::Json<InviteBody>,
) -> AppResult<HttpResponse> {
    let descriptors = body
        .into_inner()
        .signers
        .into_iter()
        .enumerate()
        .map(|(index, s)| SignerDescriptor {
            name: s.name,
            email: s.email,
            phone: s.phone,
            cpf: s.cpf,
            qualification: s.qualification,
            auth_channels: s.auth_channels,
            order: s.order.unwrap_or(index as u32),
        })
        .collect();

    let signers = service.invite_signers(&path.to_string(), descriptors, user.0.user_id)?;
    Ok(HttpResponse::Ok().json(signers))
}

/// POST /documents/{id}/cancel
pub async fn cancel_document(
    user: AuthedUser,
    service: web::Data<DocumentService>,
    path: web::Path<DocumentId>,
) -> AppResult<HttpResponse> {
    let document = service.cancel(&path.to_string(), user.0.user_id)?;
    Ok(HttpResponse::Ok().json(document))
}

/// POST /documents/{id}/expire
pub async fn expire_document(
    service: web::Data<DocumentService>,
    path: web::Path<DocumentId>,
) -> AppResult<HttpResponse> {
    let document = service.expire(&path.to_string())?;
    Ok(HttpResponse::Ok().json(document))
}

/// GET /documents/{id}/audit
pub async fn document_audit(
    audit: web::Data<AuditLogger>,
    storage: web::Data<Storage>,
    path: web::Path<DocumentId>,
) -> AppResult<HttpResponse> {
    let document_id = path.to_string();
    let signers = storage.list_signers_for_document(&document_id)?;

    let mut rows = audit.list_chain(&document_id)?;
    for signer in &signers {
        rows.extend(audit.list_chain(&signer.id.to_string())?);
    }
    rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    Ok(HttpResponse::Ok().json(rows))
}

/// GET /documents/{id}/verify-chain
pub async fn verify_chain(
    audit: web::Data<AuditLogger>,
    storage: web::Data<Storage>,
    path: web::Path<DocumentId>,
) -> AppResult<HttpResponse> {
    let document_id = path.to_string();
    let document = storage.get_document(&document_id)?.ok_or(AppError::NotFound)?;
    let signer_ids: Vec<String> = storage
        .list_signers_for_document(&document_id)?
        .iter()
        .map(|s| s.id.to_string())
        .collect();

    let report = audit.verify_document(document.tenant_id, &document_id, &signer_ids)?;
    Ok(HttpResponse::Ok().json(report))
}

/// POST /documents/validate-file
pub async fn validate_file(validator: web::Data<Validator>, payload: Multipart) -> AppResult<HttpResponse> {
    let form = read_upload(payload).await?;
    let result = validator.validate(&form.bytes)?;
    Ok(HttpResponse::Ok().json(result))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/documents").route(web::post().to(create_document)).route(web::get().to(list_documents)))
        .service(web::resource("/documents/validate-file").route(web::post().to(validate_file)))
        .service(web::resource("/documents/{id}/invite").route(web::post().to(invite_signers)))
        .service(web::resource("/documents/{id}/cancel").route(web::post().to(cancel_document)))
        .service(web::resource("/documents/{id}/expire").route(web::post().to(expire_document)))
        .service(web::resource("/documents/{id}/audit").route(web::get().to(document_audit)))
        .service(web::resource("/documents/{id}/verify-chain").route(web::get().to(verify_chain)));
}
