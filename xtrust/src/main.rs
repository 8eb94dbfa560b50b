//! xtrust: Command-line tool for verifying X.509 certificate chains.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use xtrust_lib::verify::{DEFAULT_MAX_CANDIDATES, DEFAULT_MAX_PATH_STEPS};
use xtrust_lib::{
    CertPool, Certificate, PathBuilder, VerificationFailure, VerificationReport, VerifiedChain,
    VerifyOptions,
};

#[derive(Parser)]
#[command(
    name = "xtrust",
    about = "Decide whether an X.509 certificate chains to a trusted anchor",
    long_about = "xtrust builds candidate chains from a presented certificate through\n\
                  the intermediates supplied with it to a pool of trust anchors, and\n\
                  reports the first chain that validates. Only the certificates you\n\
                  provide are considered; missing issuers are never fetched.\n\n\
                  Input is PEM or DER, auto-detected. Commands read from stdin when no\n\
                  file is given.",
    after_help = "EXAMPLES:\n\
                  \n  xtrust verify chain.pem\
                  \n  xtrust verify --CAfile ca.pem --untrusted int.pem leaf.pem\
                  \n  xtrust verify --CAfile int.pem leaf.pem\
                  \n  xtrust verify --attime 1767225600 --json chain.pem\
                  \n  xtrust paths --CAfile ca.pem chain.pem\
                  \n  cat chain.pem | xtrust verify"
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Where trust anchors and untrusted intermediates come from.
#[derive(clap::Args)]
struct PoolArgs {
    /// PEM file containing trusted CA certificates (default: system trust store)
    #[arg(long = "CAfile", visible_alias = "ca-file", value_name = "FILE")]
    ca_file: Option<PathBuf>,
    /// Directory of trusted CA certificates in PEM format
    #[arg(long = "CApath", visible_alias = "ca-path", value_name = "DIR")]
    ca_path: Option<PathBuf>,
    /// PEM file with untrusted intermediate certificates
    #[arg(long, value_name = "FILE")]
    untrusted: Option<PathBuf>,
    /// Maximum chain length, leaf and anchor included
    #[arg(long, value_name = "N")]
    verify_depth: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a certificate against a trust store (exit 0 = valid, 2 = fail)
    #[command(
        after_help = "FILE is a PEM bundle with the presented certificate first, followed\n\
                      by the intermediates it was presented with. A trusted intermediate\n\
                      is a sufficient anchor; the root need not be present.\n\
                      \nEXAMPLES:\n\
                      \n  xtrust verify chain.pem\
                      \n  xtrust verify --CAfile ca.pem --untrusted int.pem leaf.pem\
                      \n  xtrust verify --show-chain --CAfile ca.pem chain.pem\
                      \n  xtrust verify --failures-only -r certs/"
    )]
    Verify {
        /// PEM/DER file or directory of certificate chains.
        /// Reads from stdin if omitted.
        file: Option<PathBuf>,
        #[command(flatten)]
        pools: PoolArgs,
        /// Verify at a specific Unix timestamp instead of current time
        #[arg(long, value_name = "EPOCH")]
        attime: Option<i64>,
        /// Skip validity date checks
        #[arg(long)]
        no_check_time: bool,
        /// Maximum number of candidate chains to validate
        #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_CANDIDATES)]
        max_candidates: usize,
        /// Maximum number of issuer edges the path search may explore
        #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_PATH_STEPS)]
        max_path_steps: usize,
        /// Display subject and issuer for each certificate in the verified chain
        #[arg(long)]
        show_chain: bool,
        /// Print the verified chain as PEM, leaf first
        #[arg(long)]
        show_chain_pem: bool,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
        /// Only print failures (directory mode)
        #[arg(long)]
        failures_only: bool,
        /// Recurse into subdirectories (directory mode)
        #[arg(short, long)]
        recurse: bool,
    },
    /// List candidate chains without validating them
    Paths {
        /// PEM/DER file; reads from stdin if omitted
        file: Option<PathBuf>,
        #[command(flatten)]
        pools: PoolArgs,
    },
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

const MAX_INPUT_BYTES: u64 = 10 * 1024 * 1024;

fn read_input(file: Option<&PathBuf>) -> Result<Vec<u8>> {
    match file {
        Some(path) => read_file(path),
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .take(MAX_INPUT_BYTES)
                .read_to_end(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat file: {}", path.display()))?;
    if meta.len() > MAX_INPUT_BYTES {
        anyhow::bail!(
            "File too large ({} bytes, max {} bytes): {}",
            meta.len(),
            MAX_INPUT_BYTES,
            path.display()
        );
    }
    std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))
}

fn looks_like_pem(input: &[u8]) -> bool {
    input.windows(11).any(|w| w == b"-----BEGIN ")
}

/// Split input into the presented certificate and the intermediates that
/// follow it.
fn split_input(input: &[u8]) -> Result<(Certificate, Vec<Certificate>)> {
    let mut certs = if looks_like_pem(input) {
        xtrust_lib::parse_pem_bundle(input)?
    } else {
        vec![Certificate::from_der(input)?]
    };
    if certs.is_empty() {
        anyhow::bail!("No certificates found in input");
    }
    let leaf = certs.remove(0);
    Ok((leaf, certs))
}

/// Build the anchor pool from `--CAfile`/`--CApath`, else the system store.
fn load_anchors(pools: &PoolArgs) -> Result<CertPool> {
    let mut anchors = match (&pools.ca_file, &pools.ca_path) {
        (Some(file), _) => CertPool::from_pem_file(file)?,
        (None, Some(_)) => CertPool::new(),
        (None, None) => CertPool::system().context("Failed to load system trust store")?,
    };
    if let Some(dir) = &pools.ca_path {
        anchors.add_pem_directory(dir)?;
    }
    if anchors.is_empty() {
        anyhow::bail!("Trust anchor pool is empty");
    }
    tracing::debug!(anchors = anchors.len(), "loaded trust anchors");
    Ok(anchors)
}

fn load_untrusted(pools: &PoolArgs) -> Result<Vec<Certificate>> {
    match &pools.untrusted {
        Some(path) => Ok(xtrust_lib::parse_pem_bundle(&read_file(path)?)
            .with_context(|| format!("Failed to parse untrusted file: {}", path.display()))?),
        None => Ok(Vec::new()),
    }
}

/// Check if a path has a certificate file extension (.pem, .der, .crt, .cer).
fn is_cert_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("pem") || ext.eq_ignore_ascii_case("der")
            || ext.eq_ignore_ascii_case("crt") || ext.eq_ignore_ascii_case("cer")
    )
}

/// Find all certificate files in a directory, sorted.
fn find_cert_files(dir: &Path, recurse: bool) -> Vec<PathBuf> {
    let walker = if recurse {
        walkdir::WalkDir::new(dir)
    } else {
        walkdir::WalkDir::new(dir).max_depth(1)
    };
    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_cert_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// A single result from batch processing.
struct BatchResult {
    path: String,
    pass: bool,
    detail: String,
}

/// Process certificate files in parallel, printing `filename: result`.
///
/// Returns the number of failures.
fn run_batch<F>(files: &[PathBuf], failures_only: bool, op: F) -> usize
where
    F: Fn(&Path) -> BatchResult + Sync,
{
    let results: Vec<BatchResult> = files.par_iter().map(|f| op(f)).collect();

    let mut failures = 0;
    for r in &results {
        if !r.pass {
            failures += 1;
        }
        if failures_only && r.pass {
            continue;
        }
        if r.pass {
            println!("{}: {}", r.path, r.detail);
        } else {
            eprintln!("{}: {}", r.path, r.detail);
        }
    }
    failures
}

type Outcome = (Certificate, Result<VerifiedChain, VerificationFailure>);

fn verify_input(
    input: &[u8],
    untrusted: &[Certificate],
    anchors: &CertPool,
    options: &VerifyOptions,
) -> Result<Outcome> {
    let (leaf, mut intermediates) = split_input(input)?;
    intermediates.extend(untrusted.iter().cloned());
    let result = xtrust_lib::verify_with_options(&leaf, &intermediates, anchors, options);
    Ok((leaf, result))
}

/// Print a single-file verification result.
fn print_verify_result(
    label: &str,
    outcome: &Outcome,
    json: bool,
    show_chain: bool,
    show_chain_pem: bool,
) -> Result<()> {
    let (leaf, result) = outcome;
    let report = VerificationReport::new(leaf, result);
    if json {
        println!("{}", report.to_json()?);
    } else if report.is_valid {
        println!("{}: {}", label, report);
        if show_chain {
            for info in &report.chain {
                println!(
                    "depth {}: subject = {}, issuer = {}",
                    info.depth, info.subject, info.issuer
                );
            }
        }
    } else {
        eprintln!("{}: {}", label, report);
    }
    if show_chain_pem {
        if let Ok(chain) = result {
            for cert in chain {
                print!("{}", cert.to_pem());
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Verify {
            file,
            pools,
            attime,
            no_check_time,
            max_candidates,
            max_path_steps,
            show_chain,
            show_chain_pem,
            json,
            failures_only,
            recurse,
        } => {
            let anchors = load_anchors(pools)?;
            let untrusted = load_untrusted(pools)?;
            let options = VerifyOptions {
                at_time: *attime,
                check_time: !no_check_time,
                verify_depth: pools.verify_depth,
                max_candidates: *max_candidates,
                max_path_steps: *max_path_steps,
            };

            // Directory mode: verify all cert files in parallel
            if let Some(path) = file {
                if path.is_dir() {
                    let files = find_cert_files(path, *recurse);
                    if files.is_empty() {
                        anyhow::bail!(
                            "No certificate files (.pem, .der, .crt, .cer) found in {}",
                            path.display()
                        );
                    }
                    let failures = run_batch(&files, *failures_only, |f| {
                        let label = f.display().to_string();
                        let outcome = read_file(f)
                            .and_then(|data| verify_input(&data, &untrusted, &anchors, &options));
                        match outcome {
                            Ok((leaf, result)) => {
                                let report = VerificationReport::new(&leaf, &result);
                                BatchResult {
                                    path: label,
                                    pass: report.is_valid,
                                    detail: report.to_string(),
                                }
                            }
                            Err(e) => BatchResult {
                                path: label,
                                pass: false,
                                detail: format!("FAIL ({:#})", e),
                            },
                        }
                    });
                    if failures > 0 {
                        std::process::exit(2);
                    }
                    return Ok(());
                }
            }

            // Single file mode
            let input = read_input(file.as_ref())?;
            let label = file
                .as_ref()
                .map_or("stdin".to_string(), |f| f.display().to_string());
            let outcome = verify_input(&input, &untrusted, &anchors, &options)?;
            print_verify_result(&label, &outcome, *json, *show_chain, *show_chain_pem)?;
            if outcome.1.is_err() {
                std::process::exit(2);
            }
        }
        Commands::Paths { file, pools } => {
            let anchors = load_anchors(pools)?;
            let input = read_input(file.as_ref())?;
            let (leaf, mut intermediates) = split_input(&input)?;
            intermediates.extend(load_untrusted(pools)?);
            let intermediate_pool = CertPool::from_certs(intermediates);

            let mut builder = PathBuilder::new(&intermediate_pool, &anchors);
            if let Some(depth) = pools.verify_depth {
                builder = builder.with_max_depth(depth);
            }
            let paths = builder.paths(&leaf);
            if paths.is_empty() {
                eprintln!("no candidate chains for {}", leaf.subject());
                std::process::exit(2);
            }
            for (i, path) in paths.iter().enumerate() {
                let names: Vec<String> = path.iter().map(|c| c.short_name()).collect();
                println!("path {}: {}", i, names.join(" -> "));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn generated_chain() -> (String, String) {
        let mut root_params = rcgen::CertificateParams::new(Vec::<String>::new()).unwrap();
        root_params
            .distinguished_name
            .push(rcgen::DnType::CommonName, "CLI Root");
        root_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let root_key = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
        let root = root_params.self_signed(&root_key).unwrap();

        let leaf_params = rcgen::CertificateParams::new(vec!["cli.example".to_string()]).unwrap();
        let leaf_key = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
        let leaf = leaf_params.signed_by(&leaf_key, &root, &root_key).unwrap();
        (root.pem(), leaf.pem())
    }

    // ---- input splitting ----

    #[test]
    fn split_input_takes_first_certificate_as_leaf() {
        let (root, leaf) = generated_chain();
        let bundle = format!("{}{}", leaf, root);
        let (presented, rest) = split_input(bundle.as_bytes()).unwrap();
        assert_eq!(rest.len(), 1);
        assert!(!presented.is_ca());
        assert!(rest[0].is_self_issued());
    }

    #[test]
    fn split_input_rejects_garbage() {
        assert!(split_input(b"definitely not a certificate").is_err());
        assert!(split_input(b"").is_err());
    }

    #[test]
    fn pem_detection() {
        assert!(looks_like_pem(b"junk\n-----BEGIN CERTIFICATE-----\n"));
        assert!(!looks_like_pem(&[0x30, 0x82, 0x01, 0x0a]));
    }

    // ---- anchors and verification ----

    #[test]
    fn ca_file_anchors_verify_presented_leaf() {
        let (root, leaf) = generated_chain();
        let dir = tempfile::tempdir().unwrap();
        let ca = dir.path().join("ca.pem");
        std::fs::write(&ca, &root).unwrap();

        let pools = PoolArgs {
            ca_file: Some(ca),
            ca_path: None,
            untrusted: None,
            verify_depth: None,
        };
        let anchors = load_anchors(&pools).unwrap();
        assert_eq!(anchors.len(), 1);

        let (_, result) =
            verify_input(leaf.as_bytes(), &[], &anchors, &VerifyOptions::default()).unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn ca_path_without_certificates_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pools = PoolArgs {
            ca_file: None,
            ca_path: Some(dir.path().to_path_buf()),
            untrusted: None,
            verify_depth: None,
        };
        assert!(load_anchors(&pools).is_err());
    }

    #[test]
    fn oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let big = dir.path().join("big.pem");
        let file = std::fs::File::create(&big).unwrap();
        file.set_len(MAX_INPUT_BYTES + 1).unwrap();
        let err = read_file(&big).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    // ---- is_cert_file tests ----

    #[test]
    fn is_cert_file_accepts_known_extensions() {
        assert!(is_cert_file(Path::new("cert.pem")));
        assert!(is_cert_file(Path::new("cert.der")));
        assert!(is_cert_file(Path::new("cert.crt")));
        assert!(is_cert_file(Path::new("cert.cer")));
    }

    #[test]
    fn is_cert_file_case_insensitive() {
        assert!(is_cert_file(Path::new("cert.PEM")));
        assert!(is_cert_file(Path::new("cert.DER")));
    }

    #[test]
    fn is_cert_file_rejects_non_cert() {
        assert!(!is_cert_file(Path::new("cert.txt")));
        assert!(!is_cert_file(Path::new("cert.key")));
        assert!(!is_cert_file(Path::new("README.md")));
        assert!(!is_cert_file(Path::new("cert")));
    }

    // ---- find_cert_files tests ----

    #[test]
    fn find_cert_files_sorted_and_flat() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.pem"), "").unwrap();
        std::fs::write(dir.path().join("a.crt"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.der"), "").unwrap();

        let flat = find_cert_files(dir.path(), false);
        let names: Vec<_> = flat
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.crt", "b.pem"]);

        let deep = find_cert_files(dir.path(), true);
        assert_eq!(deep.len(), 3);
    }

    #[test]
    fn find_cert_files_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_cert_files(dir.path(), false).is_empty());
    }
}
