//! Storage layer for the e-signature service.
//!
//! Uses ReDB for embedded key-value storage with ACID transactions. A
//! single process-wide database holds every table; tenant isolation is
//! enforced at the service layer, not by separate database files.

pub mod redb;

pub use self::redb::Storage;
