//! xtrust-lib: X.509 certificate path building and trust verification.
//!
//! Given a presented certificate, the intermediates that accompanied it and a
//! pool of trust anchors, decides whether a valid signing chain exists from
//! the presented certificate to an anchor. Only the certificates handed to
//! the verifier are considered; missing issuers are never fetched.

mod certificate;
mod fields;
mod oid;
mod util;
pub mod verify;

pub use certificate::{parse_pem_bundle, Certificate};
pub use fields::{DistinguishedName, KeyUsage};
pub use verify::{
    find_system_ca_bundle, validate_chain, verify, verify_with_options, CertPool,
    ChainCertInfo, FailureReason, PathBuilder, SearchStatus, VerificationFailure,
    VerificationReport, VerifiedChain, VerifyOptions,
};

/// Errors returned by xtrust-lib for malformed input or unreadable
/// configuration. Trust decisions are reported through
/// [`VerificationFailure`] instead.
#[derive(Debug, thiserror::Error)]
pub enum XtrustError {
    #[error("Failed to parse certificate: {0}")]
    ParseError(String),

    #[error("Invalid PEM format: {0}")]
    PemError(String),

    #[error("Invalid DER format: {0}")]
    DerError(String),

    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Verification error: {0}")]
    VerifyError(String),
}
