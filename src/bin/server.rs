//! Multi-tenant electronic-signature service.
//!
//! Wires the `redb` store, content-addressed blob store, OTP issuance,
//! hash-chained audit logger, and PDF finalizer into the document/signer/
//! validator services, then serves the HTTP surface (spec §6).

use std::sync::Arc;

use actix_web::{App, HttpServer, middleware, web};
use esign_service::audit::AuditLogger;
use esign_service::blob::BlobStore;
use esign_service::clock::{Clock, SystemClock};
use esign_service::config::Settings;
use esign_service::middleware::{RateLimitConfig, general_limiter, otp_verify_limiter};
use esign_service::notifier::{LoggingNotifier, Notifier};
use esign_service::otp::OtpStore;
use esign_service::rng::{OsRngSource, RngSource};
use esign_service::routes;
use esign_service::session::{SessionResolver, StorageSessionResolver};
use esign_service::storage::Storage;
use esign_service::{DocumentService, SignerService, Validator};
use tracing_actix_web::TracingLogger;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    telemetry_init();

    let settings = Settings::from_env();
    if let Err(message) = settings.validate() {
        tracing::error!("{message}");
        std::process::exit(1);
    }

    let storage = match Storage::open(settings.db_path()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open storage database");
            std::process::exit(1);
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let rng: Arc<dyn RngSource> = Arc::new(OsRngSource);
    let notifier: Arc<dyn Notifier> = Arc::new(LoggingNotifier);
    let audit = Arc::new(AuditLogger::new(storage.clone(), clock.clone(), settings.chain_genesis_prefix().to_string()));
    let blobs = BlobStore::new(settings.blob_root().clone());
    let otp = Arc::new(OtpStore::new(
        storage.clone(),
        clock.clone(),
        rng.clone(),
        settings.bcrypt_cost(),
        settings.otp_ttl(),
    ));
    let session_resolver: Arc<dyn SessionResolver> = Arc::new(StorageSessionResolver::new(storage.clone()));

    let document_service = DocumentService::new(
        storage.clone(),
        audit.clone(),
        blobs.clone(),
        clock.clone(),
        rng.clone(),
        notifier.clone(),
        settings.invite_ttl(),
    );
    let signer_service = SignerService::new(
        storage.clone(),
        audit.clone(),
        blobs.clone(),
        clock.clone(),
        otp.clone(),
        notifier.clone(),
        settings.shortcode_length(),
    );
    let validator = Validator::new(storage.clone());

    let rate_config = RateLimitConfig::from_env();
    tracing::info!(
        otp_verify_per_hour = rate_config.otp_verify_per_hour,
        otp_verify_burst = rate_config.otp_verify_burst,
        "Rate limiting enabled"
    );

    let addr = settings.socket_addr();
    tracing::info!(addr = %addr, "Starting e-signature service");

    let storage_data = web::Data::new(storage);
    let audit_data = web::Data::from(audit);
    let document_service_data = web::Data::new(document_service);
    let signer_service_data = web::Data::new(signer_service);
    let validator_data = web::Data::new(validator);
    let session_resolver_data = web::Data::new(session_resolver);

    HttpServer::new(move || {
        let otp_verify_resource = web::resource("/sign/{token}/otp/verify")
            .wrap(otp_verify_limiter(&rate_config))
            .route(web::post().to(routes::sign::otp_verify));

        App::new()
            .wrap(general_limiter())
            .wrap(TracingLogger::default())
            .wrap(middleware::DefaultHeaders::new().add(("X-Service", "esign-service")))
            .app_data(storage_data.clone())
            .app_data(audit_data.clone())
            .app_data(document_service_data.clone())
            .app_data(signer_service_data.clone())
            .app_data(validator_data.clone())
            .app_data(session_resolver_data.clone())
            .configure(routes::health::configure)
            .configure(routes::documents::configure)
            .service(otp_verify_resource)
            .configure(routes::sign::configure)
    })
    .bind(addr)?
    .run()
    .await
}

fn telemetry_init() {
    esign_service::telemetry::init_tracing();
}
