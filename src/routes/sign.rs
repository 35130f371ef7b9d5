//! Signer-facing routes, authenticated by the share token in the path
//! (spec §6: `/sign/{token}/...`).

use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::services::SignerService;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResponse {
    signer: crate::model::Signer,
    document: crate::model::Document,
}

/// GET /sign/{token}
pub async fn summary(service: web::Data<SignerService>, path: web::Path<String>) -> AppResult<HttpResponse> {
    let (signer, document) = service.summary(&path)?;
    Ok(HttpResponse::Ok().json(SummaryResponse { signer, document }))
}

#[derive(Deserialize)]
pub struct IdentifyBody {
    pub cpf: Option<String>,
    pub phone: Option<String>,
}

/// POST /sign/{token}/identify
pub async fn identify(
    service: web::Data<SignerService>,
    path: web::Path<String>,
    body: web::Json<IdentifyBody>,
) -> AppResult<HttpResponse> {
    let body = body.into_inner();
    let signer = service.identify(&path, body.cpf, body.phone)?;
    Ok(HttpResponse::Ok().json(signer))
}

/// POST /sign/{token}/otp/start
pub async fn otp_start(service: web::Data<SignerService>, path: web::Path<String>) -> AppResult<HttpResponse> {
    service.otp_start(&path)?;
    Ok(HttpResponse::Ok().finish())
}

#[derive(Deserialize)]
pub struct OtpVerifyBody {
    pub otp: String,
}

/// POST /sign/{token}/otp/verify
pub async fn otp_verify(
    service: web::Data<SignerService>,
    path: web::Path<String>,
    body: web::Json<OtpVerifyBody>,
) -> AppResult<HttpResponse> {
    service.otp_verify(&path, &body.otp)?;
    Ok(HttpResponse::Ok().finish())
}

#[derive(Deserialize)]
pub struct PositionBody {
    pub page: u32,
    pub x: f64,
    pub y: f64,
}

/// POST /sign/{token}/position
pub async fn position(
    service: web::Data<SignerService>,
    path: web::Path<String>,
    body: web::Json<PositionBody>,
) -> AppResult<HttpResponse> {
    let signer = service.place_position(&path, body.page, body.x, body.y)?;
    Ok(HttpResponse::Ok().json(signer))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitBody {
    pub client_fingerprint: String,
    pub signature_image_base64: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CommitResponse {
    short_code: String,
    signature_hash: String,
    is_complete: bool,
}

/// POST /sign/{token}/commit
pub async fn commit(
    service: web::Data<SignerService>,
    path: web::Path<String>,
    body: web::Json<CommitBody>,
) -> AppResult<HttpResponse> {
    let png_bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &body.signature_image_base64)
        .map_err(|e| crate::error::AppError::Validation(format!("invalid signatureImageBase64: {e}")))?;

    let outcome = service.commit(&path, &body.client_fingerprint, &png_bytes)?;
    Ok(HttpResponse::Ok().json(CommitResponse {
        short_code: outcome.short_code,
        signature_hash: outcome.signature_hash,
        is_complete: outcome.is_complete,
    }))
}

/// Wires every signer route except `/otp/verify`, which the server binary
/// mounts separately under its own rate limiter (a brute-force target).
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/sign/{token}").route(web::get().to(summary)))
        .service(web::resource("/sign/{token}/identify").route(web::post().to(identify)))
        .service(web::resource("/sign/{token}/otp/start").route(web::post().to(otp_start)))
        .service(web::resource("/sign/{token}/position").route(web::post().to(position)))
        .service(web::resource("/sign/{token}/commit").route(web::post().to(commit)));
}
