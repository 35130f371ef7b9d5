// Crate-level lint configuration
// Allow noisy pedantic/cargo lints that aren't worth fixing individually
#![allow(clippy::multiple_crate_versions)] // Transitive deps, can't easily fix
#![allow(clippy::missing_errors_doc)] // Would require extensive doc changes
#![allow(clippy::missing_panics_doc)] // Would require extensive doc changes
#![allow(clippy::must_use_candidate)] // Too many false positives for internal APIs
#![allow(clippy::module_name_repetitions)] // Acceptable for clarity (e.g., DocumentService in services::document)
#![allow(clippy::doc_markdown)] // Too strict about backticks in docs
#![allow(clippy::missing_const_for_fn)] // Often debatable, runtime doesn't benefit

//! Multi-tenant electronic-signature service.
//!
//! A document owner uploads a PDF, invites one or more signers, each signer
//! authenticates via a one-time code, draws a signature, and the system
//! produces a finalized PDF bearing visual signature stamps together with a
//! tamper-evident, hash-chained audit trail.
//!
//! ## Architecture
//!
//! - `storage` — the `redb`-backed embedded store; every public operation
//!   runs inside a single write transaction.
//! - `audit` — the hash-chained, append-only event log and its verifier.
//! - `blob` — content-addressed filesystem storage for PDFs and signature
//!   PNGs.
//! - `otp` — short-lived challenge codes for signer authentication.
//! - `pdf` — embeds visual signature stamps into the original PDF.
//! - `services` — the public operations: document lifecycle, signer state
//!   machine, content-addressed validator.
//! - `session` / `notifier` — thin capability traits standing in for the
//!   externally collaborating login and messaging systems.
//!
//! ## Concurrency model
//!
//! `redb` allows exactly one write transaction at a time. Every state
//! change opens and commits exactly one write transaction, which is what
//! makes the signer-commit race in `services::signer::SignerService::commit`
//! safe without additional locking: whichever commit's transaction runs
//! second observes the other's `SIGNED` status already persisted.

pub mod audit;
pub mod blob;
pub mod clock;
pub mod config;
pub mod error;
pub mod hash;
pub mod ids;
pub mod middleware;
pub mod model;
pub mod notifier;
pub mod otp;
pub mod pdf;
pub mod rng;
pub mod routes;
pub mod services;
pub mod session;
pub mod storage;
pub mod telemetry;

pub use config::Settings;
pub use error::{AppError, AppResult};
pub use services::{DocumentService, SignerService, Validator};
