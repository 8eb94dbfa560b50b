//! Differential tests against `openssl verify`.
//!
//! Each case writes its certificates into a temporary directory and checks
//! that OpenSSL and the engine agree on accept/reject. Skipped when the
//! `openssl` binary is not available.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing
)]

mod common;

use common::{ca_params, issue, leaf_params, now, pool, self_signed, ts, Issued, Pki};
use std::path::Path;
use std::process::Command;
use xtrust_lib::verify;

fn openssl_available() -> bool {
    Command::new("openssl")
        .arg("version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn write_bundle(dir: &Path, name: &str, certs: &[&Issued]) -> String {
    let path = dir.join(name);
    let pem: String = certs.iter().map(|c| c.pem()).collect();
    std::fs::write(&path, pem).unwrap();
    path.to_string_lossy().into_owned()
}

/// Run `openssl verify` and report whether it accepted the leaf.
fn openssl_accepts(
    leaf: &Issued,
    intermediates: &[&Issued],
    anchors: &[&Issued],
    at_time: i64,
) -> bool {
    let dir = tempfile::tempdir().unwrap();
    let ca_file = write_bundle(dir.path(), "ca.pem", anchors);
    let leaf_file = write_bundle(dir.path(), "leaf.pem", &[leaf]);

    let mut cmd = Command::new("openssl");
    cmd.arg("verify")
        .arg("-attime")
        .arg(at_time.to_string())
        .arg("-partial_chain")
        .arg("-CAfile")
        .arg(&ca_file);
    if !intermediates.is_empty() {
        let untrusted = write_bundle(dir.path(), "untrusted.pem", intermediates);
        cmd.arg("-untrusted").arg(untrusted);
    }
    cmd.arg(&leaf_file);

    let output = cmd.output().unwrap();
    output.status.success()
}

fn engine_accepts(
    leaf: &Issued,
    intermediates: &[&Issued],
    anchors: &[&Issued],
    at_time: i64,
) -> bool {
    let presented: Vec<_> = intermediates.iter().map(|c| c.parsed.clone()).collect();
    let anchor_refs: Vec<_> = anchors.iter().map(|c| &c.parsed).collect();
    verify(&leaf.parsed, &presented, &pool(&anchor_refs), at_time).is_ok()
}

struct Case<'a> {
    name: &'a str,
    leaf: &'a Issued,
    intermediates: Vec<&'a Issued>,
    anchors: Vec<&'a Issued>,
    at_time: i64,
    expect_ok: bool,
}

#[test]
fn engine_agrees_with_openssl() {
    if !openssl_available() {
        eprintln!("Skipping: openssl not found on PATH");
        return;
    }

    let pki = Pki::new();
    let strict_root = self_signed(ca_params("Strict Root", Some(0)));
    let strict_intermediate = issue(ca_params("Under Strict Root", None), &strict_root);
    let strict_leaf = issue(leaf_params("strict.example"), &strict_intermediate);
    let ee = issue(leaf_params("not-a-ca.example"), &pki.root);
    let ee_child = issue(leaf_params("victim.example"), &ee);
    let impostor = self_signed(ca_params("Test Intermediate CA", None));

    let cases = [
        Case {
            name: "root as leaf",
            leaf: &pki.root,
            intermediates: vec![],
            anchors: vec![&pki.root],
            at_time: now(),
            expect_ok: true,
        },
        Case {
            name: "intermediate as leaf",
            leaf: &pki.intermediate,
            intermediates: vec![],
            anchors: vec![&pki.root],
            at_time: now(),
            expect_ok: true,
        },
        Case {
            name: "missing intermediate",
            leaf: &pki.leaf,
            intermediates: vec![],
            anchors: vec![&pki.root],
            at_time: now(),
            expect_ok: false,
        },
        Case {
            name: "presented intermediate",
            leaf: &pki.leaf,
            intermediates: vec![&pki.intermediate],
            anchors: vec![&pki.root],
            at_time: now(),
            expect_ok: true,
        },
        Case {
            name: "trusted intermediate without root",
            leaf: &pki.leaf,
            intermediates: vec![&pki.intermediate],
            anchors: vec![&pki.intermediate],
            at_time: now(),
            expect_ok: true,
        },
        Case {
            name: "not yet valid",
            leaf: &pki.leaf,
            intermediates: vec![&pki.intermediate],
            anchors: vec![&pki.root],
            at_time: ts(2023, 6, 1),
            expect_ok: false,
        },
        Case {
            name: "expired",
            leaf: &pki.leaf,
            intermediates: vec![&pki.intermediate],
            anchors: vec![&pki.root],
            at_time: ts(2031, 6, 1),
            expect_ok: false,
        },
        Case {
            name: "pathlen 0 root above intermediate",
            leaf: &strict_leaf,
            intermediates: vec![&strict_intermediate],
            anchors: vec![&strict_root],
            at_time: now(),
            expect_ok: false,
        },
        Case {
            name: "end entity as issuer",
            leaf: &ee_child,
            intermediates: vec![&ee],
            anchors: vec![&pki.root],
            at_time: now(),
            expect_ok: false,
        },
        Case {
            name: "same-name impostor anchor",
            leaf: &pki.leaf,
            intermediates: vec![],
            anchors: vec![&impostor],
            at_time: now(),
            expect_ok: false,
        },
    ];

    for case in &cases {
        let engine = engine_accepts(case.leaf, &case.intermediates, &case.anchors, case.at_time);
        let openssl = openssl_accepts(case.leaf, &case.intermediates, &case.anchors, case.at_time);
        assert_eq!(engine, case.expect_ok, "{}: engine", case.name);
        assert_eq!(engine, openssl, "{}: engine disagrees with openssl", case.name);
    }
}
