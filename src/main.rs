use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use dx_share::buffer::{MemoryBuffer, TextBuffer};
use dx_share::config::{ShareConfig, DEFAULT_CONFIG_PATH};
use dx_share::fingerprint::{self, Encoding};
use dx_share::script::{self, ChangeScript};
use dx_share::Fingerprint;
use dx_share::sync::{remote, DocumentId, DocumentSession, SessionActor, SessionEvent};

#[derive(Parser)]
#[command(name = "dx-share")]
#[command(
    about = "Single-writer document sharing: fingerprints, change scripts and a WebSocket relay",
    version
)]
struct Cli {
    /// Config file (TOML)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the WebSocket relay
    Relay {
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Print the fingerprint of a file
    Fingerprint {
        file: PathBuf,

        /// Encoding label, defaults to the configured one
        #[arg(short, long)]
        encoding: Option<String>,
    },

    /// Print the change script turning OLD into NEW
    Diff {
        old: PathBuf,
        new: PathBuf,

        /// Print the operations as JSON instead of the wire encoding
        #[arg(long)]
        json: bool,
    },

    /// Apply an encoded change script to a file
    Patch {
        file: PathBuf,
        script: PathBuf,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Follow a shared document through a relay, mirroring it into FILE
    Join {
        file: PathBuf,

        /// Relay base url, e.g. ws://localhost:3000
        #[arg(long, value_name = "URL")]
        relay: String,

        /// Document id, defaults to the file name
        #[arg(long)]
        document: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ShareConfig::load(&cli.config)?;

    match cli.command {
        Commands::Relay { port, bind } => {
            let bind = bind.unwrap_or_else(|| config.relay.bind.clone());
            let port = port.unwrap_or(config.relay.port);
            println!(
                "{}",
                format!("🌐 Starting relay on {}:{}...", bind, port)
                    .cyan()
                    .bold()
            );
            dx_share::server::start(&bind, port).await?;
        }

        Commands::Fingerprint { file, encoding } => {
            let encoding = match encoding {
                Some(label) => Encoding::from_label(&label)?,
                None => config.encoding()?,
            };
            let fp = fingerprint_file(&file, encoding)?;
            println!("{}  {}", fp.to_string().bright_yellow(), file.display());
        }

        Commands::Diff { old, new, json } => {
            let script = script::diff(&read_text(&old)?, &read_text(&new)?);
            print!("{}", render_script(&script, json)?);
            if !json {
                eprintln!(
                    "{} {} operations (+{} -{} lines)",
                    "✓".green(),
                    script.len(),
                    script.inserted_lines(),
                    script.deleted_lines()
                );
            }
        }

        Commands::Patch {
            file,
            script: script_path,
            output,
        } => {
            let (script, patched) = patch_file(&file, &script_path, output.as_deref())?;
            match output {
                Some(out) => {
                    println!(
                        "{} Applied {} operations to {}",
                        "✓".green(),
                        script.len(),
                        out.display().to_string().bright_white()
                    );
                }
                None => print!("{patched}"),
            }
        }

        Commands::Join {
            file,
            relay,
            document,
        } => {
            join(&config, file, &relay, document).await?;
        }
    }

    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn fingerprint_file(path: &Path, encoding: Encoding) -> Result<Fingerprint> {
    Ok(fingerprint::compute(&read_text(path)?, encoding)?)
}

/// Wire encoding, or pretty JSON with a trailing newline.
fn render_script(script: &ChangeScript, json: bool) -> Result<String> {
    if json {
        Ok(format!("{}\n", serde_json::to_string_pretty(script)?))
    } else {
        Ok(script::encode(script))
    }
}

/// Decode the script at `script_path` and apply it to the text of `file`.
/// The result is written to `output` when given; `file` is never modified.
fn patch_file(
    file: &Path,
    script_path: &Path,
    output: Option<&Path>,
) -> Result<(ChangeScript, String)> {
    let raw =
        std::fs::read(script_path).with_context(|| format!("reading {}", script_path.display()))?;
    let script = script::decode(&raw)?;
    let patched = script.apply_to_text(&read_text(file)?)?;
    if let Some(out) = output {
        std::fs::write(out, &patched).with_context(|| format!("writing {}", out.display()))?;
    }
    Ok((script, patched))
}

async fn join(config: &ShareConfig, file: PathBuf, relay: &str, document: Option<String>) -> Result<()> {
    let document_id = match document {
        Some(id) => DocumentId::from(id),
        None => DocumentId::from(
            file.file_name()
                .and_then(|name| name.to_str())
                .context("file has no usable name")?,
        ),
    };
    let text = if file.exists() { read_text(&file)? } else { String::new() };

    let session = DocumentSession::new(document_id.clone(), config.encoding()?);
    tracing::info!(document = %document_id, encoding = %session.encoding(), "joining");
    let (handle, outbound) =
        SessionActor::spawn(session, MemoryBuffer::new(&text), config.actor_settings());
    let mut events = handle.subscribe();

    let url = remote::room_url(relay, &document_id)?;
    let connection = remote::connect_peer(url.as_str(), handle.clone(), outbound).await?;
    println!(
        "{} Following {} via {}",
        "↔".bright_blue(),
        document_id.to_string().bright_yellow(),
        url.to_string().bright_white()
    );

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    println!("  {} {:?}", "•".bright_blue(), event);
                    if matches!(
                        event,
                        SessionEvent::RemoteEditApplied { .. } | SessionEvent::Resynced { .. }
                    ) {
                        let text = handle.text().await?;
                        tokio::fs::write(&file, text)
                            .await
                            .with_context(|| format!("writing {}", file.display()))?;
                    }
                    if matches!(event, SessionEvent::SessionReset { .. }) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    connection.abort();
    let buffer = handle.shutdown().await?;
    tracing::info!(document = %document_id, bytes = buffer.len_bytes(), "stopped following");
    Ok(())
}
