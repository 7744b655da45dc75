mod context;

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use sealpost_core::{Certificate, ReceivePipeline, SendPipeline};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::context::Context;

#[derive(Parser, Debug)]
#[command(name = "sealpost", author, version, about = "Certificate-based secure mail", long_about = None)]
struct Cli {
    /// Path to config.json (default: $SEALPOST_HOME/config.json or the platform data dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Seal a message for a recipient and emit the envelope
    Send {
        /// Recipient address, e.g. bob@example.org
        address: String,
        /// Message body
        #[arg(short, long, conflicts_with = "file")]
        message: Option<String>,
        /// Read the message body from a file
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Write the envelope here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Verify and decrypt an envelope ("-" reads stdin)
    Receive { file: PathBuf },
    /// Show the cached certificates
    List {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ctx = Context::load(cli.config.as_deref())?;
    let outcome = match cli.command {
        Commands::Send {
            address,
            message,
            file,
            output,
        } => send(&ctx, &address, message, file.as_deref(), output.as_deref()),
        Commands::Receive { file } => receive(&ctx, &file),
        Commands::List { json } => list(&ctx, json),
    };

    // Certificates resolved before a failure stay cached.
    finish(outcome, || ctx.persist())
}

/// The command's own error wins; a failed save after it is only logged.
fn finish(outcome: Result<()>, persist: impl FnOnce() -> Result<()>) -> Result<()> {
    match outcome {
        Ok(()) => persist(),
        Err(e) => {
            if let Err(persist_err) = persist() {
                warn!(error = %format!("{persist_err:#}"), "certificate index not saved");
            }
            Err(e)
        }
    }
}

fn send(
    ctx: &Context,
    address: &str,
    message: Option<String>,
    file: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let creds = ctx.credentials()?;
    let body = match (message, file) {
        (Some(message), _) => message.into_bytes(),
        (None, Some(path)) => {
            fs::read(path).with_context(|| format!("reading message {}", path.display()))?
        }
        (None, None) => test_message(creds.account.address()).into_bytes(),
    };

    let pipeline = SendPipeline::new(&ctx.provider, &ctx.store, &creds.trust_anchor, &creds.account);
    let wire = pipeline
        .send(address, &body)
        .with_context(|| format!("sending to {address}"))?;

    match output {
        Some(path) => {
            fs::write(path, &wire).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "envelope written");
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&wire)?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}

fn test_message(sender: &str) -> String {
    format!(
        "This email is intended for testing purposes only. This email is sent from {sender}. \
         The current timestamp is: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.6f")
    )
}

fn receive(ctx: &Context, file: &Path) -> Result<()> {
    let raw = if file == Path::new("-") {
        let mut raw = Vec::new();
        io::stdin().read_to_end(&mut raw)?;
        raw
    } else {
        fs::read(file).with_context(|| format!("reading envelope {}", file.display()))?
    };

    let creds = ctx.credentials()?;
    let pipeline =
        ReceivePipeline::new(&ctx.provider, &ctx.store, &creds.trust_anchor, &creds.account);
    let message = pipeline.receive(&raw).context("receiving message")?;

    info!(
        from = %message.from,
        email = %message.certificate_email,
        to = %message.to,
        "message accepted"
    );
    let mut stdout = io::stdout().lock();
    stdout.write_all(&message.body)?;
    stdout.flush()?;
    Ok(())
}

fn list(ctx: &Context, json: bool) -> Result<()> {
    let listing = ctx.store.list();

    if json {
        let entries: Vec<serde_json::Value> = listing
            .iter()
            .map(|record| {
                let certificate = Certificate::load(&record.certificate_path).ok();
                serde_json::json!({
                    "identity": record.identity.as_str(),
                    "path": record.certificate_path.display().to_string(),
                    "certificate": certificate.map(|c| summary_json(&c)),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!(
        "{} certificate(s) cached in {}",
        listing.len(),
        ctx.index_path().display()
    );
    for record in &listing {
        println!("{} {}", record.identity, record.certificate_path.display());
        match Certificate::load(&record.certificate_path) {
            Ok(cert) => {
                println!("    subject:     {}", cert.subject);
                println!("    email:       {}", cert.email);
                println!("    issuer:      {}", cert.issuer);
                println!("    not before:  {}", cert.not_before.to_rfc3339());
                println!("    not after:   {}", cert.not_after.to_rfc3339());
                if let Ok(fp) = cert.fingerprint() {
                    println!("    fingerprint: {fp}");
                }
            }
            Err(e) => println!("    unreadable: {e}"),
        }
    }
    Ok(())
}

fn summary_json(cert: &Certificate) -> serde_json::Value {
    serde_json::json!({
        "subject": cert.subject,
        "email": cert.email,
        "issuer": cert.issuer,
        "not_before": cert.not_before.to_rfc3339(),
        "not_after": cert.not_after.to_rfc3339(),
        "fingerprint": cert.fingerprint().ok(),
    })
}
