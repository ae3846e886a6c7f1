//! causeway-ctl — thin CLI wrapping the client library (spec.md §6).
//!
//! Usage:
//!   causeway-ctl <config_file> upload <path>
//!   causeway-ctl <config_file> download <filename> <output>
//!   causeway-ctl verify <a> <b>

use std::path::Path;

use anyhow::{bail, Context, Result};
use causeway_client::Client;
use causeway_core::chunk;
use causeway_core::config::ClusterConfig;
use causeway_core::digest::{root_digest, HexDigest};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let exit_code = match run(&args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

fn run(args: &[String]) -> Result<i32> {
    if args.first().map(String::as_str) == Some("verify") {
        let [_, a, b] = args else {
            bail!(usage());
        };
        return run_verify(a, b);
    }

    let [config_path, command, rest @ ..] = args else {
        bail!(usage());
    };
    let config = ClusterConfig::load(config_path)
        .with_context(|| format!("loading cluster config {config_path:?}"))?;
    let client = Client::from_config(&config)?;

    match command.as_str() {
        "upload" => {
            let [path] = rest else {
                bail!(usage());
            };
            run_upload(&client, path)?;
            Ok(0)
        }
        "download" => {
            let [filename, output] = rest else {
                bail!(usage());
            };
            run_download(&client, filename, output)?;
            Ok(0)
        }
        other => bail!("unknown command {other:?}\n{}", usage()),
    }
}

fn run_upload(client: &Client, path: &str) -> Result<()> {
    let cid = client.upload(path).with_context(|| format!("uploading {path:?}"))?;
    println!("{cid}");
    Ok(())
}

fn run_download(client: &Client, filename: &str, output: &str) -> Result<()> {
    client
        .download(filename, output)
        .with_context(|| format!("downloading {filename:?} to {output:?}"))?;
    println!("Verifying integrity...");
    let cid = compute_cid(output).with_context(|| format!("recomputing CID for {output:?}"))?;
    println!("Integrity CID: {cid}");
    Ok(())
}

fn run_verify(a: &str, b: &str) -> Result<i32> {
    println!("Computing CID for original file...");
    let cid_a = compute_cid(a).with_context(|| format!("reading {a:?}"))?;
    println!("Computing CID for reconstructed file...");
    let cid_b = compute_cid(b).with_context(|| format!("reading {b:?}"))?;

    println!("\n--- Results ---\nOriginal CID:      {cid_a}\nReconstructed CID: {cid_b}");
    if cid_a == cid_b {
        println!("\nVERIFIED: Files are identical");
        Ok(0)
    } else {
        println!("\nMISMATCH: Files differ");
        Ok(1)
    }
}

/// Recompute a file's CID the same way upload computes it: split, hash
/// each chunk, hash the concatenated hex digests (spec.md §4.6).
fn compute_cid(path: impl AsRef<Path>) -> Result<HexDigest> {
    let data = std::fs::read(path.as_ref())
        .with_context(|| format!("reading {:?}", path.as_ref()))?;
    let chunks = chunk::split(&data)?;
    Ok(root_digest(chunks.iter().map(|c| &c.digest)))
}

fn usage() -> String {
    "Usage:\n  causeway-ctl <config_file> upload <path>\n  causeway-ctl <config_file> download <filename> <output>\n  causeway-ctl verify <a> <b>".to_string()
}
