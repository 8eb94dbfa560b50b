//! Trust-decision failures.

use serde::Serialize;

/// Why a certificate could not be chained to a trust anchor.
///
/// Variants are mutually exclusive; a failed verification reports exactly
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, thiserror::Error)]
pub enum FailureReason {
    /// No structural issuer linkage from the leaf reaches any anchor using
    /// only the supplied certificates.
    #[error("unable to find a path to a trust anchor")]
    NoPathFound,

    /// The verification time is after a certificate's `notAfter`.
    #[error("certificate has expired")]
    Expired,

    /// The verification time is before a certificate's `notBefore`.
    #[error("certificate is not yet valid")]
    NotYetValid,

    /// The issuer's public key does not verify the child's signature.
    #[error("certificate signature verification failed")]
    InvalidSignature,

    /// A certificate acting as issuer lacks `cA` or `keyCertSign`.
    #[error("issuer is not a certificate authority")]
    NotACertificateAuthority,

    /// A `pathLenConstraint` admits fewer intermediate CAs than the chain has.
    #[error("path length constraint exceeded")]
    PathLengthExceeded,

    /// The chain does not end at a member of the anchor pool.
    #[error("chain does not terminate at a trusted anchor")]
    UntrustedAnchor,
}

/// A failed verification: the reason plus where in the chain it occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{reason}: {detail}")]
pub struct VerificationFailure {
    pub reason: FailureReason,
    /// Chain position of the offending certificate (0 = leaf), when the
    /// failure is tied to one.
    pub depth: Option<usize>,
    /// One-line subject of the offending certificate.
    pub subject: Option<String>,
    /// Human-readable explanation.
    pub detail: String,
}

impl VerificationFailure {
    pub(crate) fn new(reason: FailureReason, detail: impl Into<String>) -> Self {
        VerificationFailure {
            reason,
            depth: None,
            subject: None,
            detail: detail.into(),
        }
    }

    pub(crate) fn at(
        reason: FailureReason,
        depth: usize,
        subject: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        VerificationFailure {
            reason,
            depth: Some(depth),
            subject: Some(subject.into()),
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_combines_reason_and_detail() {
        let failure = VerificationFailure::at(
            FailureReason::Expired,
            1,
            "CN = Intermediate",
            "certificate at depth 1 (CN = Intermediate) has expired",
        );
        assert_eq!(
            failure.to_string(),
            "certificate has expired: certificate at depth 1 (CN = Intermediate) has expired"
        );
        assert_eq!(failure.depth, Some(1));
    }

    #[test]
    fn reasons_serialize_by_name() {
        let json = serde_json::to_string(&FailureReason::PathLengthExceeded).unwrap_or_default();
        assert_eq!(json, "\"PathLengthExceeded\"");
    }
}
