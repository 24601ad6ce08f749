//! Checksum handling for downloaded archive files.
//!
//! - [`store`] - companion naming, digest computation and checksum parsing
//! - [`prevalidate`] - cheap structural checks that purge broken checksum files
//! - [`verifier`] - parallel digest comparison with verified markers

mod error;
pub mod prevalidate;
pub mod store;
pub mod verifier;

pub use error::ChecksumError;
pub use prevalidate::{ChecksumDefect, PreValidation, ValidatedFile, partition, validate_and_cleanup};
pub use store::{
    CHECKSUM_SUFFIX, VERIFIED_SUFFIX, checksum_path, compute_digest, is_companion,
    purge_with_companions, read_digest, verified_marker_path,
};
pub use verifier::{
    ChecksumVerifier, VerifyFailure, VerifyProgressCallback, VerifyReport, default_worker_count,
};
