//! keygen: create a watcher key file.
//!
//! Prints the WID and public key, and writes the full keypair as JSON.
//! Keep the file private: it holds the secret key.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use warden_crypto::KeyPair;

#[derive(Parser, Debug)]
#[command(name = "keygen", about = "Generate a Dilithium2 watcher key file")]
struct Args {
    /// Where to write the key file.
    #[arg(long, default_value = "watcher-key.json")]
    out: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    force: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.out.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", args.out.display());
    }
    let kp = KeyPair::generate();
    let json = serde_json::to_string_pretty(&kp).context("serializing keypair")?;
    std::fs::write(&args.out, json).with_context(|| format!("writing {}", args.out.display()))?;

    println!("WID:        {}", kp.wid);
    println!("Public key: {}", hex::encode(&kp.public_key));
    println!("Key file:   {}", args.out.display());
    Ok(())
}
