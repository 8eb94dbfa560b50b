//! Certificate chain verification against a pool of trust anchors.
//!
//! [`verify`] is the single entry point the rest of the system depends on:
//! it builds candidate chains from the leaf through the supplied
//! intermediates to the supplied anchors ([`PathBuilder`]), validates each
//! candidate in discovery order, and returns the first chain that passes.
//!
//! Verification is synchronous and side-effect free. Pools are borrowed
//! immutably for the duration of a call, so one anchor pool can serve many
//! concurrent verifications.

mod chain;
mod checks;
mod error;
mod pool;

use crate::certificate::Certificate;
use crate::util;
use crate::XtrustError;
use serde::Serialize;
use std::ops::ControlFlow;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

pub use chain::{PathBuilder, SearchStatus, DEFAULT_MAX_PATH_STEPS};
pub(crate) use chain::MAX_CHAIN_DEPTH;
pub use error::{FailureReason, VerificationFailure};
pub use pool::{find_system_ca_bundle, CertPool};

use checks::{check_chain, CheckContext, Rejection};

/// Default number of candidate chains validated before giving up.
pub const DEFAULT_MAX_CANDIDATES: usize = 1024;

/// Options controlling verification behavior.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Verify at a specific Unix timestamp instead of the current time.
    /// Matches OpenSSL's `-attime` flag. Pin this for reproducible results.
    pub at_time: Option<i64>,
    /// Whether to check certificate validity dates.
    /// Set to `false` to skip time checks (useful for testing expired certs).
    pub check_time: bool,
    /// Maximum number of certificates in a chain, leaf and anchor included.
    /// Defaults to 32; never exceeds the number of distinct supplied
    /// certificates plus one.
    pub verify_depth: Option<usize>,
    /// Maximum number of complete candidate chains to validate.
    pub max_candidates: usize,
    /// Maximum number of issuer edges path discovery may follow. This is
    /// what bounds the search over a pool of many certificates sharing a
    /// subject, most of whose orderings never reach an anchor.
    pub max_path_steps: usize,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            at_time: None,
            check_time: true,
            verify_depth: None,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            max_path_steps: DEFAULT_MAX_PATH_STEPS,
        }
    }
}

impl VerifyOptions {
    /// Default options with the verification time pinned.
    pub fn at(at_time: i64) -> Self {
        Self {
            at_time: Some(at_time),
            ..Self::default()
        }
    }

    fn now_ts(&self) -> i64 {
        self.at_time.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as i64
        })
    }
}

/// A chain that passed validation, ordered leaf first, anchor last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedChain {
    certs: Vec<Certificate>,
}

impl VerifiedChain {
    /// Certificates from leaf (index 0) to anchor.
    pub fn certs(&self) -> &[Certificate] {
        &self.certs
    }

    pub fn leaf(&self) -> Option<&Certificate> {
        self.certs.first()
    }

    /// The trust anchor the chain terminates at.
    pub fn anchor(&self) -> Option<&Certificate> {
        self.certs.last()
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Certificate> {
        self.certs.iter()
    }

}

impl<'a> IntoIterator for &'a VerifiedChain {
    type Item = &'a Certificate;
    type IntoIter = std::slice::Iter<'a, Certificate>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Verify `leaf` against `anchors` at the Unix time `at_time`.
///
/// `intermediates` are the certificates presented alongside the leaf; they
/// are untrusted and only serve as links. Neither the anchors nor any other
/// certificate is ever added to the intermediate pool.
pub fn verify(
    leaf: &Certificate,
    intermediates: &[Certificate],
    anchors: &CertPool,
    at_time: i64,
) -> Result<VerifiedChain, VerificationFailure> {
    verify_with_options(leaf, intermediates, anchors, &VerifyOptions::at(at_time))
}

/// Verify with configurable options.
///
/// Like [`verify`], but accepts [`VerifyOptions`] to control the time
/// source, depth limit and search budget.
pub fn verify_with_options(
    leaf: &Certificate,
    intermediates: &[Certificate],
    anchors: &CertPool,
    options: &VerifyOptions,
) -> Result<VerifiedChain, VerificationFailure> {
    let intermediate_pool = CertPool::from_certs(intermediates.iter().cloned());
    let ctx = CheckContext {
        now_ts: options.now_ts(),
        check_time: options.check_time,
    };
    let builder = PathBuilder::new(&intermediate_pool, anchors)
        .with_max_depth(options.verify_depth.unwrap_or(MAX_CHAIN_DEPTH))
        .with_max_steps(options.max_path_steps);

    debug!(
        leaf = %leaf.subject(),
        intermediates = intermediate_pool.len(),
        anchors = anchors.len(),
        at_time = ctx.now_ts,
        max_depth = builder.max_depth(),
        "verifying certificate"
    );

    let mut candidates = 0usize;
    let mut best: Option<Rejection> = None;
    let mut accepted: Option<VerifiedChain> = None;

    let status = builder.for_each_path(leaf, |chain| {
        candidates += 1;
        match check_chain(chain, anchors, ctx) {
            Ok(()) => {
                debug!(length = chain.len(), candidates, "candidate chain accepted");
                accepted = Some(VerifiedChain {
                    certs: chain.iter().map(|c| (*c).clone()).collect(),
                });
                return ControlFlow::Break(());
            }
            Err(rejection) => {
                debug!(
                    length = chain.len(),
                    progress = rejection.progress,
                    reason = ?rejection.failure.reason,
                    detail = %rejection.failure.detail,
                    "candidate chain rejected"
                );
                // Strictly greater: ties go to the earlier candidate.
                if best
                    .as_ref()
                    .map_or(true, |b| rejection.progress > b.progress)
                {
                    best = Some(rejection);
                }
            }
        }
        if candidates >= options.max_candidates {
            debug!(candidates, "candidate budget exhausted");
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });

    if let Some(chain) = accepted {
        return Ok(chain);
    }
    let failure = match best {
        Some(rejection) => rejection.failure,
        None => VerificationFailure::at(
            FailureReason::NoPathFound,
            0,
            leaf.subject().to_oneline(),
            if status == SearchStatus::BudgetExhausted {
                format!(
                    "path search budget exhausted before reaching a trust anchor for {}",
                    leaf.subject()
                )
            } else {
                format!(
                    "unable to get local issuer certificate for {} (issuer: {})",
                    leaf.subject(),
                    leaf.issuer()
                )
            },
        ),
    };
    debug!(reason = ?failure.reason, candidates, ?status, "verification failed");
    Err(failure)
}

/// Validate one explicit chain `[leaf, .., anchor]` without path building.
///
/// Fails with [`FailureReason::UntrustedAnchor`] when the last element is
/// not in `anchors`.
pub fn validate_chain(
    chain: &[&Certificate],
    anchors: &CertPool,
    options: &VerifyOptions,
) -> Result<(), VerificationFailure> {
    let ctx = CheckContext {
        now_ts: options.now_ts(),
        check_time: options.check_time,
    };
    check_chain(chain, anchors, ctx).map_err(|r| r.failure)
}

/// Serializable summary of a verification outcome, for display and JSON.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    /// Whether a trusted chain was found.
    pub is_valid: bool,
    /// The verified chain (leaf to anchor), or just the leaf on failure.
    pub chain: Vec<ChainCertInfo>,
    /// The failure, when `is_valid` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<VerificationFailure>,
}

/// Information about a certificate in a report.
#[derive(Debug, Clone, Serialize)]
pub struct ChainCertInfo {
    /// Position in chain (0 = leaf).
    pub depth: usize,
    /// Subject distinguished name.
    pub subject: String,
    /// Issuer distinguished name.
    pub issuer: String,
    /// Short human-readable name derived from CN, O, or OU.
    pub short_name: String,
    /// Serial number as colon-separated hex.
    pub serial: String,
    /// Validity start, ISO 8601.
    pub not_before: String,
    /// Validity end, ISO 8601.
    pub not_after: String,
    /// Signature algorithm name.
    pub signature_algorithm: String,
    /// Subject Key Identifier, lowercase hex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_key_id: Option<String>,
    /// SHA-256 fingerprint, colon-separated hex.
    pub fingerprint: String,
}

impl ChainCertInfo {
    fn new(depth: usize, cert: &Certificate) -> Self {
        ChainCertInfo {
            depth,
            subject: cert.subject().to_oneline(),
            issuer: cert.issuer().to_oneline(),
            short_name: cert.short_name(),
            serial: cert.serial_hex().to_string(),
            not_before: util::format_timestamp(cert.not_before()),
            not_after: util::format_timestamp(cert.not_after()),
            signature_algorithm: cert.signature_algorithm().to_string(),
            subject_key_id: cert.subject_key_id().map(hex::encode),
            fingerprint: cert.fingerprint_hex(),
        }
    }
}

impl VerificationReport {
    /// Summarize the result of verifying `leaf`.
    pub fn new(leaf: &Certificate, result: &Result<VerifiedChain, VerificationFailure>) -> Self {
        match result {
            Ok(chain) => VerificationReport {
                is_valid: true,
                chain: chain
                    .iter()
                    .enumerate()
                    .map(|(depth, cert)| ChainCertInfo::new(depth, cert))
                    .collect(),
                error: None,
            },
            Err(failure) => VerificationReport {
                is_valid: false,
                chain: vec![ChainCertInfo::new(0, leaf)],
                error: Some(failure.clone()),
            },
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, XtrustError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl std::fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Format: [short_name], [serial], [OK/FAIL], [optional reason]
        if let Some(leaf) = self.chain.first() {
            write!(f, "{}, {}, ", leaf.short_name, leaf.serial)?;
        }
        if self.is_valid {
            write!(f, "OK")?;
        } else {
            write!(f, "FAIL")?;
            if let Some(ref failure) = self.error {
                write!(f, ", {}", failure)?;
            }
        }
        Ok(())
    }
}
