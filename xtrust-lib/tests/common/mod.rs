//! In-process test PKI built with rcgen.
//!
//! Every certificate gets a fixed validity window (2024-01-01 to
//! 2030-12-31) so tests can pin the verification time with [`now`].

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use rcgen::{
    BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, KeyUsagePurpose, SerialNumber,
};
use xtrust_lib::Certificate;

/// Unix timestamp of midnight UTC on the given date.
pub fn ts(year: i32, month: u8, day: u8) -> i64 {
    rcgen::date_time_ymd(year, month, day).unix_timestamp()
}

/// A verification time inside every fixture's validity window.
pub fn now() -> i64 {
    ts(2026, 6, 1)
}

/// A certificate together with the key that can issue under it.
pub struct Issued {
    pub params: CertificateParams,
    pub key: KeyPair,
    pub cert: rcgen::Certificate,
    pub parsed: Certificate,
}

impl Issued {
    pub fn pem(&self) -> String {
        self.cert.pem()
    }
}

fn base_params(cn: &str) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).expect("CertificateParams");
    params.distinguished_name.push(DnType::CommonName, cn);
    params.not_before = rcgen::date_time_ymd(2024, 1, 1);
    params.not_after = rcgen::date_time_ymd(2030, 12, 31);
    params.use_authority_key_identifier_extension = true;
    params
}

/// CA parameters with `keyCertSign`, mirroring
/// `basicConstraints = critical, CA:true[, pathlen:N]`.
pub fn ca_params(cn: &str, path_len: Option<u8>) -> CertificateParams {
    let mut params = base_params(cn);
    params.is_ca = match path_len {
        Some(n) => IsCa::Ca(BasicConstraints::Constrained(n)),
        None => IsCa::Ca(BasicConstraints::Unconstrained),
    };
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
    ];
    params
}

/// End-entity parameters (`CA:false`, digitalSignature).
pub fn leaf_params(cn: &str) -> CertificateParams {
    let mut params = base_params(cn);
    params.is_ca = IsCa::ExplicitNoCa;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params
}

fn new_key() -> KeyPair {
    KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).expect("key pair")
}

fn parse(cert: &rcgen::Certificate) -> Certificate {
    Certificate::from_der(cert.der()).expect("parse generated certificate")
}

pub fn self_signed(params: CertificateParams) -> Issued {
    let key = new_key();
    let cert = params.clone().self_signed(&key).expect("self-signed cert");
    let parsed = parse(&cert);
    Issued {
        params,
        key,
        cert,
        parsed,
    }
}

pub fn issue(params: CertificateParams, issuer: &Issued) -> Issued {
    let key = new_key();
    let cert = params
        .clone()
        .signed_by(&key, &issuer.cert, &issuer.key)
        .expect("issued cert");
    let parsed = parse(&cert);
    Issued {
        params,
        key,
        cert,
        parsed,
    }
}

/// Another certificate for `subject`'s name and key, signed by `issuer`
/// (cross-signing, or re-issuing when `issuer` is `subject`).
pub fn cross_sign(subject: &Issued, issuer: &Issued, serial: u64) -> Certificate {
    let mut params = subject.params.clone();
    params.serial_number = Some(SerialNumber::from(serial));
    let cert = params
        .signed_by(&subject.key, &issuer.cert, &issuer.key)
        .expect("cross-signed cert");
    parse(&cert)
}

/// Re-issue a self-signed certificate with the same name and key.
pub fn reissue(subject: &Issued, serial: u64) -> Certificate {
    let mut params = subject.params.clone();
    params.serial_number = Some(SerialNumber::from(serial));
    let cert = params.self_signed(&subject.key).expect("re-issued cert");
    parse(&cert)
}

/// Root CA -> intermediate CA (pathlen 0) -> server leaf, the shape the
/// original `openssl` fixture scripts produce.
pub struct Pki {
    pub root: Issued,
    pub intermediate: Issued,
    pub leaf: Issued,
}

impl Pki {
    pub fn new() -> Self {
        let root = self_signed(ca_params("Test Root CA", None));
        let intermediate = issue(ca_params("Test Intermediate CA", Some(0)), &root);
        let leaf = issue(leaf_params("local.localhost"), &intermediate);
        Pki {
            root,
            intermediate,
            leaf,
        }
    }
}

/// Build an anchor pool from parsed certificates.
pub fn pool(certs: &[&Certificate]) -> xtrust_lib::CertPool {
    certs.iter().map(|c| (*c).clone()).collect()
}
