#![no_main]

use libfuzzer_sys::fuzz_target;
use xtrust_lib::{verify, CertPool, Certificate, PathBuilder, VerificationReport};

fuzz_target!(|data: &[u8]| {
    // Parsing and verification must never panic, regardless of input.
    if let Ok(cert) = Certificate::parse(data) {
        let _ = cert.subject().to_oneline();
        let _ = cert.issuer().to_oneline();
        let _ = cert.serial_hex();
        let _ = cert.short_name();
        let _ = cert.key_usage().map(|ku| ku.names());
        let _ = cert.is_self_issued();

        // Trust the certificate itself, then also present it as an
        // intermediate: self-consistency and cycle handling on garbage.
        let anchors: CertPool = std::iter::once(cert.clone()).collect();
        let result = verify(&cert, std::slice::from_ref(&cert), &anchors, 0);
        let _ = VerificationReport::new(&cert, &result).to_json();

        let empty = CertPool::new();
        let _ = PathBuilder::new(&anchors, &empty).paths(&cert);
    }
});
