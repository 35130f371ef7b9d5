//! Integration tests covering the end-to-end signer workflow using the
//! actual service types against temporary file-based storage.
//!
//! Run with: cargo test --test esign_integration

use std::sync::Arc;

use esign_service::audit::{AuditLogger, ChainVerification};
use esign_service::blob::BlobStore;
use esign_service::clock::{Clock, FixedClock};
use esign_service::config::Settings;
use esign_service::hash::sha256_hex;
use esign_service::ids::{TenantId, UserId};
use esign_service::model::{AuthChannel, Document, DocumentStatus, Signer, SignerStatus};
use esign_service::notifier::LoggingNotifier;
use esign_service::otp::OtpStore;
use esign_service::rng::{FixedRng, RngSource};
use esign_service::services::document::{NewDocument, SignerDescriptor};
use esign_service::storage::Storage;
use esign_service::{AppError, DocumentService, SignerService, Validator};
use lopdf::{Dictionary, Document as LoDocument, Object, Stream};
use tempfile::TempDir;

struct Harness {
    storage: Storage,
    document_service: DocumentService,
    signer_service: SignerService,
    validator: Validator,
    clock: Arc<FixedClock>,
    blob_dir: TempDir,
}

fn minimal_pdf_bytes() -> Vec<u8> {
    let mut doc = LoDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(Dictionary::new(), Vec::new()));
    let mut page_dict = Dictionary::new();
    page_dict.set("Type", Object::Name(b"Page".to_vec()));
    page_dict.set("Parent", Object::Reference(pages_id));
    page_dict.set("Contents", Object::Reference(content_id));
    page_dict.set("Resources", Object::Dictionary(Dictionary::new()));
    let page_id = doc.add_object(page_dict);
    let mut pages_dict = Dictionary::new();
    pages_dict.set("Type", Object::Name(b"Pages".to_vec()));
    pages_dict.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
    pages_dict.set("Count", Object::Integer(1));
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
    let mut catalog_dict = Dictionary::new();
    catalog_dict.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog_dict.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(catalog_dict);
    doc.trailer.set("Root", Object::Reference(catalog_id));
    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

fn sample_png() -> Vec<u8> {
    let image = image::RgbImage::from_pixel(8, 8, image::Rgb([5, 6, 7]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn build_harness() -> Harness {
    let db_dir = TempDir::new().unwrap();
    let storage = Storage::open(&db_dir.path().join("esign.redb")).unwrap();
    let blob_dir = TempDir::new().unwrap();
    let blobs = BlobStore::new(blob_dir.path().to_path_buf());

    let clock = Arc::new(FixedClock::new(chrono::Utc::now()));
    let clock_dyn: Arc<dyn Clock> = clock.clone();
    let rng: Arc<dyn RngSource> = Arc::new(FixedRng::new(vec![0x42, 0x13, 0x99, 0x07]));
    let settings = Settings::for_tests();

    let audit = Arc::new(AuditLogger::new(storage.clone(), clock_dyn.clone(), settings.chain_genesis_prefix().to_string()));
    let otp = Arc::new(OtpStore::new(storage.clone(), clock_dyn.clone(), rng.clone(), settings.bcrypt_cost(), settings.otp_ttl()));
    let notifier = Arc::new(LoggingNotifier);

    let document_service = DocumentService::new(
        storage.clone(),
        audit.clone(),
        blobs.clone(),
        clock_dyn.clone(),
        rng.clone(),
        notifier.clone(),
        settings.invite_ttl(),
    );
    let signer_service = SignerService::new(
        storage.clone(),
        audit,
        blobs,
        clock_dyn,
        otp,
        notifier,
        settings.shortcode_length(),
    );
    let validator = Validator::new(storage.clone());

    Harness {
        storage,
        document_service,
        signer_service,
        validator,
        clock,
        blob_dir,
    }
}

fn upload_and_invite(harness: &Harness, signer_count: usize) -> (Document, Vec<Signer>, Vec<String>) {
    let document = harness
        .document_service
        .create_and_upload(
            NewDocument {
                tenant_id: TenantId::new(),
                owner_id: UserId::new(),
                title: "Lease Agreement".to_string(),
                mime_type: "application/pdf".to_string(),
                deadline_at: None,
                file_extension: ".pdf".to_string(),
                bytes: minimal_pdf_bytes(),
            },
            "lease.pdf",
        )
        .unwrap();

    let descriptors: Vec<SignerDescriptor> = (0..signer_count)
        .map(|i| SignerDescriptor {
            name: format!("Signer {i}"),
            email: format!("signer{i}@example.com"),
            phone: None,
            cpf: None,
            qualification: None,
            auth_channels: vec![AuthChannel::Email],
            order: i as u32,
        })
        .collect();

    let signers = harness
        .document_service
        .invite_signers(&document.id.to_string(), descriptors, document.owner_id)
        .unwrap();

    // Extract plaintext tokens by rebuilding them out of storage is not
    // possible (only the hash is persisted); instead mint known tokens
    // directly against storage, mirroring what `invite_signers` would have
    // notified out-of-band.
    let mut tokens = Vec::with_capacity(signers.len());
    for signer in &signers {
        let token = format!("share-token-{}", signer.id);
        harness
            .storage
            .put_share_token(&esign_service::model::ShareToken {
                document_id: document.id,
                signer_id: signer.id,
                token_hash: sha256_hex(token.as_bytes()),
                expires_at: harness.clock.now() + chrono::Duration::days(1),
                consumed_at: None,
            })
            .unwrap();
        tokens.push(token);
    }

    (document, signers, tokens)
}

/// S1: single signer completes the full state machine and the document
/// ends up `SIGNED` with a certificate.
#[test]
fn s1_single_signer_happy_path() {
    let harness = build_harness();
    let (document, _signers, tokens) = upload_and_invite(&harness, 1);
    let token = &tokens[0];

    let (signer, _doc) = harness.signer_service.summary(token).unwrap();
    assert_eq!(signer.status, SignerStatus::Viewed);

    harness.signer_service.otp_start(token).unwrap();
    assert!(harness.signer_service.otp_verify(token, "000000").is_err());

    let outcome = harness.signer_service.commit(token, "fingerprint-a", &sample_png()).unwrap();
    assert!(outcome.is_complete);

    let final_document = harness.storage.get_document(&document.id.to_string()).unwrap().unwrap();
    assert_eq!(final_document.status, DocumentStatus::Signed);
    assert!(harness.storage.get_certificate(&document.id.to_string()).unwrap().is_some());
}

/// S2: two signers commit sequentially; exactly one call reports
/// `is_complete` and the document finalizes only once.
#[test]
fn s2_two_signer_commits_finalize_exactly_once() {
    let harness = build_harness();
    let (document, _signers, tokens) = upload_and_invite(&harness, 2);

    let first = harness.signer_service.commit(&tokens[0], "fp0", &sample_png()).unwrap();
    assert!(!first.is_complete);
    let mid = harness.storage.get_document(&document.id.to_string()).unwrap().unwrap();
    assert_eq!(mid.status, DocumentStatus::PartiallySigned);

    let second = harness.signer_service.commit(&tokens[1], "fp1", &sample_png()).unwrap();
    assert!(second.is_complete);

    let final_document = harness.storage.get_document(&document.id.to_string()).unwrap().unwrap();
    assert_eq!(final_document.status, DocumentStatus::Signed);
}

/// S3: a chain that verifies cleanly stops verifying once a row is
/// tampered with directly in storage.
#[test]
fn s3_tamper_detection_via_direct_mutation() {
    let harness = build_harness();
    let (_document, signers, tokens) = upload_and_invite(&harness, 1);
    harness.signer_service.commit(&tokens[0], "fp0", &sample_png()).unwrap();

    let audit = AuditLogger::new(harness.storage.clone(), Arc::new(FixedClock::new(harness.clock.now())), "genesis_block_".to_string());
    let before = audit.verify_chain(&signers[0].id.to_string()).unwrap();
    assert!(before.is_valid());

    let mut rows = harness.storage.list_audit_chain(&signers[0].id.to_string()).unwrap();
    let mut tampered = rows.remove(0);
    tampered.payload_json = serde_json::json!({"tampered": true});
    harness.storage.overwrite_audit_row(&tampered).unwrap();

    let after = audit.verify_chain(&signers[0].id.to_string()).unwrap();
    assert!(!after.is_valid());
    assert!(matches!(after, ChainVerification::Broken { .. }));
}

/// S4: a verified OTP code cannot be replayed.
#[test]
fn s4_otp_cannot_be_replayed() {
    let harness = build_harness();
    let (_document, _signers, tokens) = upload_and_invite(&harness, 1);
    let token = &tokens[0];

    // Mint a known code through a standalone `OtpStore` against the same
    // storage, since `SignerService::otp_start` only hands the plaintext to
    // the notifier, never back to the caller.
    let settings = Settings::for_tests();
    let otp_clock: Arc<dyn Clock> = Arc::new(FixedClock::new(harness.clock.now()));
    let otp_rng: Arc<dyn RngSource> = Arc::new(FixedRng::new(vec![0x55, 0x66]));
    let otp = OtpStore::new(harness.storage.clone(), otp_clock, otp_rng, settings.bcrypt_cost(), settings.otp_ttl());
    let issued = otp
        .issue(&[("signer0@example.com".to_string(), AuthChannel::Email)])
        .unwrap();
    let (_, code) = &issued[0];

    harness.signer_service.otp_verify(token, code).unwrap();
    let replay = harness.signer_service.otp_verify(token, code);
    assert!(matches!(replay, Err(AppError::OtpWrong)));
}

/// S5: the validator distinguishes known content from unknown content.
#[test]
fn s5_validator_positive_and_negative() {
    let harness = build_harness();
    let (document, signers, tokens) = upload_and_invite(&harness, 1);
    harness.signer_service.commit(&tokens[0], "fp0", &sample_png()).unwrap();

    let signed_document = harness.storage.get_document(&document.id.to_string()).unwrap().unwrap();
    let signed_bytes = std::fs::read(harness.blob_dir.path().join(&signed_document.storage_key)).unwrap();

    let positive = harness.validator.validate(&signed_bytes).unwrap();
    assert!(positive.valid);
    let report = positive.document.unwrap();
    assert_eq!(report.signers.len(), signers.len());

    let negative = harness.validator.validate(b"not a real document").unwrap();
    assert!(!negative.valid);
}

/// S6: once a document is cancelled, a signer can no longer commit against
/// it (cancellation is terminal and share tokens stop resolving).
#[test]
fn s6_commit_fails_after_cancel() {
    let harness = build_harness();
    let (document, _signers, tokens) = upload_and_invite(&harness, 1);

    harness.document_service.cancel(&document.id.to_string(), document.owner_id).unwrap();

    let result = harness.signer_service.commit(&tokens[0], "fp0", &sample_png());
    assert!(result.is_err());
}
