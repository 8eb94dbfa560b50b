//! Per-chain validation checks.
//!
//! A candidate chain `[leaf, .., anchor]` is walked from the leaf toward the
//! anchor. Each certificate is checked for temporal validity; each one past
//! the leaf is also checked in its role as issuer of the certificate below
//! it (signature linkage, CA capability, path length).

use super::error::{FailureReason, VerificationFailure};
use super::CertPool;
use crate::certificate::Certificate;
use crate::fields::KeyUsage;

/// A rejected candidate: the failure and how many chain elements passed
/// every check before it.
#[derive(Debug, Clone)]
pub(crate) struct Rejection {
    pub failure: VerificationFailure,
    pub progress: usize,
}

impl Rejection {
    fn new(progress: usize, failure: VerificationFailure) -> Self {
        Rejection { failure, progress }
    }
}

/// Validation parameters for one verification call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CheckContext {
    pub now_ts: i64,
    pub check_time: bool,
}

/// Run every check on `chain`, stopping at the first failure.
pub(crate) fn check_chain(
    chain: &[&Certificate],
    anchors: &CertPool,
    ctx: CheckContext,
) -> Result<(), Rejection> {
    check_trust_anchor(chain, anchors)?;

    for (depth, cert) in chain.iter().enumerate() {
        if ctx.check_time {
            check_time_validity(cert, depth, ctx.now_ts).map_err(|f| Rejection::new(depth, f))?;
        }

        // The certificate below this one, if any, is the one it issued.
        let Some(child) = depth.checked_sub(1).and_then(|i| chain.get(i)) else {
            continue;
        };
        check_signature(child, cert, depth).map_err(|f| Rejection::new(depth, f))?;
        check_issuer_capability(cert, depth).map_err(|f| Rejection::new(depth, f))?;
        check_path_length(chain, depth).map_err(|f| Rejection::new(depth, f))?;
    }

    Ok(())
}

/// The last element must be a member of the anchor pool.
fn check_trust_anchor(chain: &[&Certificate], anchors: &CertPool) -> Result<(), Rejection> {
    match chain.last() {
        Some(last) if anchors.contains(last) => Ok(()),
        Some(last) => {
            let depth = chain.len() - 1;
            let subject = last.subject().to_oneline();
            Err(Rejection::new(
                0,
                VerificationFailure::at(
                    FailureReason::UntrustedAnchor,
                    depth,
                    subject.clone(),
                    format!(
                        "certificate at depth {} ({}) is not in the trust anchor pool",
                        depth, subject
                    ),
                ),
            ))
        }
        None => Err(Rejection::new(
            0,
            VerificationFailure::new(FailureReason::UntrustedAnchor, "empty certificate chain"),
        )),
    }
}

/// The verification instant must lie within `[notBefore, notAfter]`.
fn check_time_validity(
    cert: &Certificate,
    depth: usize,
    now_ts: i64,
) -> Result<(), VerificationFailure> {
    let subject = cert.subject().to_oneline();
    if now_ts < cert.not_before() {
        return Err(VerificationFailure::at(
            FailureReason::NotYetValid,
            depth,
            subject.clone(),
            format!("certificate at depth {} ({}) is not yet valid", depth, subject),
        ));
    }
    if now_ts > cert.not_after() {
        return Err(VerificationFailure::at(
            FailureReason::Expired,
            depth,
            subject.clone(),
            format!("certificate at depth {} ({}) has expired", depth, subject),
        ));
    }
    Ok(())
}

/// `issuer`'s key must verify `child`'s signature.
fn check_signature(
    child: &Certificate,
    issuer: &Certificate,
    depth: usize,
) -> Result<(), VerificationFailure> {
    child.verify_signed_by(issuer).map_err(|e| {
        let subject = issuer.subject().to_oneline();
        VerificationFailure::at(
            FailureReason::InvalidSignature,
            depth,
            subject.clone(),
            format!(
                "signature verification failed ({} -> {}): {}",
                child.subject(),
                subject,
                e
            ),
        )
    })
}

/// A certificate used as issuer must be a CA permitted to sign
/// certificates. An absent Key Usage extension places no restriction.
fn check_issuer_capability(issuer: &Certificate, depth: usize) -> Result<(), VerificationFailure> {
    let subject = issuer.subject().to_oneline();
    if !issuer.is_ca() {
        return Err(VerificationFailure::at(
            FailureReason::NotACertificateAuthority,
            depth,
            subject.clone(),
            format!(
                "certificate at depth {} ({}) is not a CA but is used as issuer",
                depth, subject
            ),
        ));
    }
    if let Some(ku) = issuer.key_usage() {
        if !ku.contains(KeyUsage::KEY_CERT_SIGN) {
            return Err(VerificationFailure::at(
                FailureReason::NotACertificateAuthority,
                depth,
                subject.clone(),
                format!(
                    "certificate at depth {} ({}) is a CA but Key Usage does not \
                     include keyCertSign",
                    depth, subject
                ),
            ));
        }
    }
    Ok(())
}

/// An issuer with `pathLenConstraint = k` admits at most `k` CA
/// certificates between itself and the leaf.
fn check_path_length(chain: &[&Certificate], depth: usize) -> Result<(), VerificationFailure> {
    let Some(issuer) = chain.get(depth) else {
        return Ok(());
    };
    let Some(pathlen) = issuer.path_len_constraint() else {
        return Ok(());
    };
    let intermediates_below = chain
        .get(1..depth)
        .map_or(0, |between| between.iter().filter(|c| c.is_ca()).count());
    if intermediates_below > pathlen as usize {
        let subject = issuer.subject().to_oneline();
        return Err(VerificationFailure::at(
            FailureReason::PathLengthExceeded,
            depth,
            subject.clone(),
            format!(
                "certificate at depth {} ({}) path length constraint violated \
                 (pathlen={}, intermediates below={})",
                depth, subject, pathlen, intermediates_below
            ),
        ));
    }
    Ok(())
}
