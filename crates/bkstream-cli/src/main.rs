//! bkstream: encrypted backup stream tool
//!
//! Commands:
//!   keygen                      - print a random backup key and backup id
//!   encrypt <plaintext> <out>   - plaintext fixture -> encrypted stream
//!   decrypt <encrypted> <out>   - encrypted stream -> plaintext fixture
//!   inspect <encrypted>         - authenticate and summarise a stream
//!   config show                 - display the effective configuration
//!
//! Keys are base64 and come from --key / --backup-id or the
//! BKSTREAM_BACKUP_KEY / BKSTREAM_BACKUP_ID environment variables.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;
use zeroize::Zeroizing;

use bkstream_backup::{
    EncryptedBackupReader, EncryptedBackupWriter, FileSource, PlainTextBackupReader,
    PlainTextBackupWriter,
};
use bkstream_core::{BackupHeader, BackupStreamConfig};
use bkstream_crypto::{BackupId, BackupKey};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "bkstream", version, about = "Encrypted backup stream tool")]
struct Cli {
    /// Path to bkstream.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "BKSTREAM_CONFIG",
        default_value = "bkstream.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "BKSTREAM_LOG")]
    log: Option<String>,

    /// Log format (json, text); overrides [log] format
    #[arg(long, env = "BKSTREAM_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a random backup key and backup id
    Keygen,

    /// Encrypt a plaintext fixture into a backup stream
    Encrypt {
        /// Plaintext fixture to read
        plaintext: PathBuf,
        /// Encrypted stream to write
        out: PathBuf,
        #[command(flatten)]
        keys: KeyArgs,
    },

    /// Decrypt a backup stream into a plaintext fixture
    Decrypt {
        /// Encrypted stream to read
        encrypted: PathBuf,
        /// Plaintext fixture to write
        out: PathBuf,
        #[command(flatten)]
        keys: KeyArgs,
    },

    /// Authenticate a backup stream and print its header and frame stats
    Inspect {
        encrypted: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        keys: KeyArgs,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
}

#[derive(Args, Debug)]
struct KeyArgs {
    /// 32-byte backup key, base64
    #[arg(long, env = "BKSTREAM_BACKUP_KEY", hide_env_values = true)]
    key: String,

    /// 16-byte backup id, base64
    #[arg(long, env = "BKSTREAM_BACKUP_ID")]
    backup_id: String,
}

impl KeyArgs {
    fn resolve(&self) -> Result<(BackupKey, BackupId)> {
        let key_bytes = Zeroizing::new(decode_base64(&self.key, "--key")?);
        let key = BackupKey::from_slice(&key_bytes).context("invalid backup key")?;
        let id_bytes = decode_base64(&self.backup_id, "--backup-id")?;
        let backup_id = BackupId::from_slice(&id_bytes).context("invalid backup id")?;
        Ok((key, backup_id))
    }
}

fn decode_base64(value: &str, what: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value.trim())
        .with_context(|| format!("{what} is not valid base64"))
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = BackupStreamConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = match cli.log_format.clone() {
        Some(format) => format,
        None => LogFormat::from_str(&config.log.format, true)
            .map_err(|e| anyhow::anyhow!("invalid log.format in config: {e}"))?,
    };
    init_logging(&level, &format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "bkstream starting"
    );

    match cli.command {
        Commands::Keygen => cmd_keygen(),
        Commands::Encrypt {
            plaintext,
            out,
            keys,
        } => {
            let (key, backup_id) = keys.resolve()?;
            let mac = encrypt_fixture(&plaintext, &out, &key, &backup_id, &config)?;
            println!("{}", BASE64.encode(mac));
            Ok(())
        }
        Commands::Decrypt {
            encrypted,
            out,
            keys,
        } => {
            let (key, backup_id) = keys.resolve()?;
            let frames = decrypt_to_fixture(&encrypted, &out, &key, &backup_id, &config)?;
            println!("{frames} frames written to {}", out.display());
            Ok(())
        }
        Commands::Inspect {
            encrypted,
            json,
            keys,
        } => {
            let (key, backup_id) = keys.resolve()?;
            let report = inspect(&encrypted, &key, &backup_id, &config)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("serializing report")?
                );
            } else {
                print_report(&report);
            }
            Ok(())
        }
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Progress display ───────────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
        )?
        .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    Ok(pb)
}

fn make_spinner(prefix: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")?);
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    Ok(pb)
}

/// Authenticate and open `path`, with a spinner while the MAC pass runs.
fn open_encrypted(
    path: &Path,
    key: &BackupKey,
    backup_id: &BackupId,
    config: &BackupStreamConfig,
) -> Result<EncryptedBackupReader<BufReader<File>>> {
    let source = FileSource::new(path);
    let total_len = source
        .len()
        .with_context(|| format!("reading size of {}", path.display()))?;

    let spinner = make_spinner("verify")?;
    spinner.set_message(path.display().to_string());
    let reader =
        EncryptedBackupReader::open_with_config(key, backup_id, &source, total_len, &config.reader)
            .with_context(|| format!("opening {}", path.display()));
    spinner.finish_and_clear();
    reader
}

// ── `bkstream keygen` ─────────────────────────────────────────────────────────

fn cmd_keygen() -> Result<()> {
    let key = BackupKey::generate();
    let backup_id = BackupId::generate();
    println!("BKSTREAM_BACKUP_KEY={}", BASE64.encode(key.as_bytes()));
    println!("BKSTREAM_BACKUP_ID={}", BASE64.encode(backup_id.as_bytes()));
    Ok(())
}

// ── `bkstream encrypt` / `bkstream decrypt` ───────────────────────────────────

/// Re-encode a plaintext fixture as an encrypted stream; returns the MAC.
fn encrypt_fixture(
    plaintext: &Path,
    out: &Path,
    key: &BackupKey,
    backup_id: &BackupId,
    config: &BackupStreamConfig,
) -> Result<[u8; 32]> {
    let input = File::open(plaintext)
        .with_context(|| format!("opening plaintext {}", plaintext.display()))?;
    let reader =
        PlainTextBackupReader::open_with_truncation(BufReader::new(input), config.reader.truncation)
            .with_context(|| format!("reading header of {}", plaintext.display()))?;

    let output = File::create(out).with_context(|| format!("creating {}", out.display()))?;
    let mut writer =
        EncryptedBackupWriter::open_with_config(key, backup_id, BufWriter::new(output), config)?;

    if let Some(header) = reader.header() {
        writer.write_header(header)?;
    }
    for frame in reader {
        let frame = frame.with_context(|| format!("reading {}", plaintext.display()))?;
        writer.write_frame(&frame)?;
    }
    let mac = writer
        .close()
        .with_context(|| format!("finishing {}", out.display()))?;

    info!(
        frames = writer.frames_written(),
        out = %out.display(),
        "plaintext fixture encrypted"
    );
    Ok(mac)
}

/// Decrypt a stream into a plaintext fixture; returns the number of frames.
fn decrypt_to_fixture(
    encrypted: &Path,
    out: &Path,
    key: &BackupKey,
    backup_id: &BackupId,
    config: &BackupStreamConfig,
) -> Result<u64> {
    let mut reader = open_encrypted(encrypted, key, backup_id, config)?;
    let output = File::create(out).with_context(|| format!("creating {}", out.display()))?;
    let mut writer = PlainTextBackupWriter::new(BufWriter::new(output));

    if let Some(header) = reader.header() {
        writer.write_header(header)?;
    }

    let pb = make_progress_bar(reader.stream_length(), "decrypt")?;
    pb.set_position(reader.bytes_read());
    while reader.has_next() {
        let frame = reader
            .next_frame()
            .with_context(|| format!("reading {}", encrypted.display()))?;
        writer.write_frame(&frame)?;
        pb.set_position(reader.bytes_read());
    }
    pb.finish_and_clear();

    let frames = writer.frames_written();
    writer.into_inner()?;
    Ok(frames)
}

// ── `bkstream inspect` ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct HeaderReport {
    version: u64,
    backup_time_ms: u64,
    current_app_version: String,
    first_app_version: String,
    media_root_backup_key_len: usize,
}

impl From<&BackupHeader> for HeaderReport {
    fn from(header: &BackupHeader) -> Self {
        Self {
            version: header.version,
            backup_time_ms: header.backup_time_ms,
            current_app_version: header.current_app_version.clone(),
            first_app_version: header.first_app_version.clone(),
            media_root_backup_key_len: header.media_root_backup_key.len(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct InspectReport {
    path: String,
    stream_length: u64,
    header: Option<HeaderReport>,
    frames: u64,
    empty_frames: u64,
    payload_bytes: u64,
    largest_frame: u64,
}

fn inspect(
    path: &Path,
    key: &BackupKey,
    backup_id: &BackupId,
    config: &BackupStreamConfig,
) -> Result<InspectReport> {
    let mut reader = open_encrypted(path, key, backup_id, config)?;
    let mut report = InspectReport {
        path: path.display().to_string(),
        stream_length: reader.stream_length(),
        header: reader.header().map(HeaderReport::from),
        ..InspectReport::default()
    };

    let pb = make_progress_bar(reader.stream_length(), "inspect")?;
    pb.set_position(reader.bytes_read());
    while reader.has_next() {
        let frame = reader
            .next_frame()
            .with_context(|| format!("reading {}", path.display()))?;
        let len = frame.len() as u64;
        report.frames += 1;
        report.payload_bytes += len;
        report.largest_frame = report.largest_frame.max(len);
        if len == 0 {
            report.empty_frames += 1;
        }
        pb.set_position(reader.bytes_read());
    }
    pb.finish_and_clear();
    Ok(report)
}

fn print_report(report: &InspectReport) {
    println!("stream:         {}", report.path);
    println!("length:         {} bytes", report.stream_length);
    match &report.header {
        Some(h) => {
            println!("header version: {}", h.version);
            println!("backup time:    {} ms", h.backup_time_ms);
            println!("app version:    {} (first {})", h.current_app_version, h.first_app_version);
            println!("media key:      {} bytes", h.media_root_backup_key_len);
        }
        None => println!("header:         (none)"),
    }
    println!(
        "frames:         {} ({} empty, largest {} bytes)",
        report.frames, report.empty_frames, report.largest_frame
    );
    println!("payload:        {} bytes", report.payload_bytes);
}

// ── `bkstream config show` ────────────────────────────────────────────────────

fn cmd_config_show(config: &BackupStreamConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
