//! Indexed certificate collections.
//!
//! A [`CertPool`] plays one of two roles during verification: the anchor
//! pool (trusted, terminal) or the intermediate pool (untrusted links that
//! must themselves chain to an anchor). The pool itself carries no trust
//! semantics; the role is decided by which argument it is passed as.

use crate::certificate::{pem_certificate_blocks, Certificate};
use crate::XtrustError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Bundle files shipped by common distributions, most specific first.
const SYSTEM_BUNDLE_FILES: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt",
    "/etc/pki/tls/certs/ca-bundle.crt",
    "/etc/ssl/ca-bundle.pem",
    "/etc/ssl/cert.pem",
];

/// Hashed certificate directories (`c_rehash` layout).
const SYSTEM_CERT_DIRS: &[&str] = &["/etc/ssl/certs"];

/// A place a system trust store may live.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TrustSource {
    Bundle(PathBuf),
    Directory(PathBuf),
}

/// Candidate trust sources in lookup order: explicit environment
/// overrides, then what `openssl-probe` reports, then the distribution
/// defaults. Bundles are always tried before directories.
fn trust_sources(
    env_file: Option<String>,
    env_dir: Option<String>,
    probed: &openssl_probe::ProbeResult,
) -> Vec<TrustSource> {
    let bundles = env_file
        .map(PathBuf::from)
        .into_iter()
        .chain(probed.cert_file.clone())
        .chain(SYSTEM_BUNDLE_FILES.iter().map(PathBuf::from))
        .map(TrustSource::Bundle);
    let dirs = env_dir
        .map(PathBuf::from)
        .into_iter()
        .chain(probed.cert_dir.clone())
        .chain(SYSTEM_CERT_DIRS.iter().map(PathBuf::from))
        .map(TrustSource::Directory);
    bundles.chain(dirs).collect()
}

fn system_trust_sources() -> Vec<TrustSource> {
    trust_sources(
        std::env::var("SSL_CERT_FILE").ok(),
        std::env::var("SSL_CERT_DIR").ok(),
        &openssl_probe::probe(),
    )
}

/// Directory entries worth reading as anchors: PEM-ish extensions, or the
/// `<hash>.<digit>` names that `c_rehash` creates.
fn is_anchor_file_name(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| match ext.as_bytes() {
            [digit] => digit.is_ascii_digit(),
            _ => matches!(ext, "pem" | "crt" | "cer"),
        })
}

fn io_error_at(path: &Path, e: std::io::Error) -> XtrustError {
    XtrustError::Io(std::io::Error::new(
        e.kind(),
        format!("{}: {}", path.display(), e),
    ))
}

/// A set of certificates indexed by subject name.
///
/// Insertion is idempotent on identical DER bytes. Lookups take `&self` and
/// insertion takes `&mut self`, so a pool shared between threads (behind an
/// `Arc`) is read-only for as long as any verification borrows it. A host
/// that wants to mutate a pool while verifications are in flight must wrap
/// it in its own reader/writer lock.
#[derive(Clone, Default)]
pub struct CertPool {
    certs: Vec<Certificate>,
    /// Raw DER subject name -> indices into `certs`, in insertion order.
    by_subject: HashMap<Vec<u8>, Vec<usize>>,
    /// SHA-256 fingerprint -> index into `certs`.
    by_fingerprint: HashMap<[u8; 32], usize>,
}

impl std::fmt::Debug for CertPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertPool")
            .field("count", &self.certs.len())
            .finish()
    }
}

impl CertPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool from already parsed certificates.
    pub fn from_certs<I>(certs: I) -> Self
    where
        I: IntoIterator<Item = Certificate>,
    {
        let mut pool = CertPool::new();
        for cert in certs {
            pool.insert(cert);
        }
        pool
    }

    /// Load the system trust store from the first source that yields at
    /// least one certificate. See [`find_system_ca_bundle`] for the
    /// environment variables honored.
    pub fn system() -> Result<Self, XtrustError> {
        for source in system_trust_sources() {
            let mut pool = CertPool::new();
            let loaded = match &source {
                TrustSource::Bundle(path) if path.is_file() => pool.add_pem_file(path),
                TrustSource::Directory(path) if path.is_dir() => pool.add_pem_directory(path),
                _ => continue,
            };
            match loaded {
                Ok(0) => debug!(?source, "trust source has no certificates"),
                Ok(added) => {
                    debug!(?source, added, "loaded system trust store");
                    return Ok(pool);
                }
                Err(e) => debug!(?source, error = %e, "skipping unreadable trust source"),
            }
        }
        Err(XtrustError::VerifyError(
            "no system trust store found".into(),
        ))
    }

    /// Create a pool from a PEM bundle (e.g., a CA certificates file).
    pub fn from_pem(pem_data: &[u8]) -> Result<Self, XtrustError> {
        let mut pool = CertPool::new();
        pool.add_pem_bundle(pem_data)?;
        Ok(pool)
    }

    /// Create a pool from a PEM bundle file.
    pub fn from_pem_file(path: &Path) -> Result<Self, XtrustError> {
        let mut pool = CertPool::new();
        pool.add_pem_file(path)?;
        Ok(pool)
    }

    /// Add a certificate. Returns `false` if a certificate with identical
    /// DER bytes was already present.
    pub fn insert(&mut self, cert: Certificate) -> bool {
        if self.by_fingerprint.contains_key(cert.fingerprint()) {
            return false;
        }
        let idx = self.certs.len();
        self.by_fingerprint.insert(*cert.fingerprint(), idx);
        self.by_subject
            .entry(cert.subject_raw().to_vec())
            .or_default()
            .push(idx);
        self.certs.push(cert);
        true
    }

    /// Add all certificates from a PEM bundle. Returns the number of
    /// certificates actually added (skipping those that fail to parse
    /// and exact duplicates).
    pub fn add_pem_bundle(&mut self, pem_data: &[u8]) -> Result<usize, XtrustError> {
        let blocks = pem_certificate_blocks(pem_data)?;
        let mut added = 0;
        for der in blocks {
            match Certificate::from_der(&der) {
                Ok(cert) => {
                    if self.insert(cert) {
                        added += 1;
                    }
                }
                Err(e) => debug!(error = %e, "skipping unparsable bundle entry"),
            }
        }
        Ok(added)
    }

    /// Add every certificate from the PEM bundle at `path`.
    pub fn add_pem_file(&mut self, path: &Path) -> Result<usize, XtrustError> {
        let data = std::fs::read(path).map_err(|e| io_error_at(path, e))?;
        self.add_pem_bundle(&data)
    }

    /// Add the certificates of every anchor file in `dir` (the `-CApath`
    /// layout). Files that cannot be read or hold no certificate are
    /// skipped. Returns the number of certificates added.
    pub fn add_pem_directory(&mut self, dir: &Path) -> Result<usize, XtrustError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| io_error_at(dir, e))? {
            let path = entry.map_err(|e| io_error_at(dir, e))?.path();
            if path.is_file() && is_anchor_file_name(&path) {
                paths.push(path);
            }
        }
        // Directory order is filesystem-dependent; insertion order is not.
        paths.sort();

        let mut added = 0;
        for path in &paths {
            match self.add_pem_file(path) {
                Ok(n) => added += n,
                Err(e) => debug!(path = %path.display(), error = %e, "skipping anchor file"),
            }
        }
        Ok(added)
    }

    /// Every member whose subject equals `cert`'s issuer name.
    ///
    /// Members whose Subject Key Identifier equals `cert`'s Authority Key
    /// Identifier come first, then members where either identifier is
    /// missing, then members whose identifiers disagree. Insertion order is
    /// kept within each rank. Matching is structural only; signatures are
    /// not checked here.
    pub fn issuers_of(&self, cert: &Certificate) -> Vec<&Certificate> {
        let mut found: Vec<&Certificate> = self
            .by_subject
            .get(cert.issuer_raw())
            .into_iter()
            .flatten()
            .filter_map(|&idx| self.certs.get(idx))
            .collect();
        found.sort_by_key(|candidate| key_id_rank(cert, candidate));
        found
    }

    /// The member that stands for `cert`: either the identical certificate,
    /// or one with the same subject name and public key.
    pub fn find_equivalent(&self, cert: &Certificate) -> Option<&Certificate> {
        if let Some(&idx) = self.by_fingerprint.get(cert.fingerprint()) {
            return self.certs.get(idx);
        }
        self.by_subject
            .get(cert.subject_raw())
            .into_iter()
            .flatten()
            .filter_map(|&idx| self.certs.get(idx))
            .find(|member| member.same_subject_and_key(cert))
    }

    /// Whether `cert` (or an equivalent, see [`find_equivalent`]) is a
    /// member.
    ///
    /// [`find_equivalent`]: CertPool::find_equivalent
    pub fn contains(&self, cert: &Certificate) -> bool {
        self.find_equivalent(cert).is_some()
    }

    /// Whether a certificate with exactly these DER bytes is a member.
    pub fn contains_exact(&self, cert: &Certificate) -> bool {
        self.by_fingerprint.contains_key(cert.fingerprint())
    }

    /// Members in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Certificate> {
        self.certs.iter()
    }

    /// Number of certificates in the pool.
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }
}

impl<'a> IntoIterator for &'a CertPool {
    type Item = &'a Certificate;
    type IntoIter = std::slice::Iter<'a, Certificate>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Certificate> for CertPool {
    fn from_iter<I: IntoIterator<Item = Certificate>>(iter: I) -> Self {
        CertPool::from_certs(iter)
    }
}

/// 0 = AKI matches SKI, 1 = undecidable, 2 = identifiers disagree.
pub(crate) fn key_id_rank(child: &Certificate, candidate: &Certificate) -> u8 {
    match (child.authority_key_id(), candidate.subject_key_id()) {
        (Some(aki), Some(ski)) if aki == ski => 0,
        (Some(_), Some(_)) => 2,
        _ => 1,
    }
}

/// Path of the first existing system CA bundle file.
///
/// `SSL_CERT_FILE` wins, then the file `openssl-probe` reports, then the
/// usual distribution locations.
pub fn find_system_ca_bundle() -> Option<PathBuf> {
    system_trust_sources()
        .into_iter()
        .find_map(|source| match source {
            TrustSource::Bundle(path) if path.is_file() => Some(path),
            _ => None,
        })
}
