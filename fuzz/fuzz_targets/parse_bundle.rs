#![no_main]

use libfuzzer_sys::fuzz_target;
use xtrust_lib::{parse_pem_bundle, verify, CertPool};

fuzz_target!(|data: &[u8]| {
    // Bundle loading skips bad entries; strict parsing reports them.
    let mut pool = CertPool::new();
    let _ = pool.add_pem_bundle(data);

    if let Ok(certs) = parse_pem_bundle(data) {
        if let Some((leaf, rest)) = certs.split_first() {
            let _ = verify(leaf, rest, &pool, 1_700_000_000);
        }
    }
});
