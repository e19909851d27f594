//! Command-line entry point.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (default on first run).
//! 3. Create the tokio runtime.
//! 4. Open the artifact store and restore published profiles.
//! 5. Run the requested subcommand.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use voice_clone::{
    audio::{read_wav, write_wav, CpalDevice},
    config::AppConfig,
    pipeline::{CloneRequest, PipelineOrchestrator},
    storage::FileStore,
    text::language,
};

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Train voice profiles from short samples and speak text in them.
#[derive(Parser, Debug)]
#[command(name = "voice-clone")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to the per-user config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a sample from the default microphone and train a profile
    Record {
        /// Display name for the new profile
        #[arg(short, long)]
        name: String,

        /// Maximum recording length in seconds (Ctrl-C stops early)
        #[arg(short, long, default_value_t = 30.0)]
        seconds: f32,

        /// Language of the sample
        #[arg(short, long, default_value = "en")]
        language: String,
    },
    /// Train a profile from one or more WAV files, used in order
    Upload {
        /// 16-bit PCM WAV files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Display name for the new profile
        #[arg(short, long)]
        name: String,

        /// Language of the sample
        #[arg(short, long, default_value = "en")]
        language: String,
    },
    /// Synthesize text in a profile's voice
    Clone {
        /// Text to speak
        #[arg(short, long, required_unless_present = "file")]
        text: Option<String>,

        /// Read the text from a file instead
        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Profile id
        #[arg(short, long)]
        profile: String,

        /// Language code, or "auto"
        #[arg(short, long, default_value = language::AUTO)]
        language: String,

        /// Speaking-rate multiplier (0.25 to 4.0)
        #[arg(long, default_value_t = 1.0)]
        speed: f32,

        /// Pitch multiplier (0.25 to 4.0)
        #[arg(long, default_value_t = 1.0)]
        pitch: f32,

        /// neutral, happy, sad, angry or calm
        #[arg(short, long, default_value = "neutral")]
        emotion: String,

        /// Output WAV file path
        #[arg(short, long, default_value = "output.wav")]
        out: PathBuf,
    },
    /// List published profiles
    List,
    /// Delete a profile and its artifacts
    Delete {
        /// Profile id
        id: String,
    },
    /// List supported languages
    Languages,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn record(
    orchestrator: Arc<PipelineOrchestrator>,
    name: &str,
    seconds: f32,
    language: &str,
) -> anyhow::Result<()> {
    let bound = Duration::try_from_secs_f32(seconds)
        .with_context(|| format!("invalid recording length: {seconds}"))?;

    // Live meter on stderr.
    let mut levels = orchestrator.level_updates();
    let meter = tokio::spawn(async move {
        while levels.changed().await.is_ok() {
            let level = *levels.borrow_and_update();
            let bars = (level.volume * 40.0).round().clamp(0.0, 40.0) as usize;
            eprint!("\r{:5.1}s [{:<40}]", level.elapsed_secs, "#".repeat(bars));
            let _ = std::io::stderr().flush();
        }
    });

    let stopper = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                orchestrator.cancel_capture();
            }
        })
    };

    eprintln!("Recording up to {seconds:.0}s, press Ctrl-C to stop.");
    let result = orchestrator.create_profile(name, bound, language).await;
    stopper.abort();
    meter.abort();
    eprintln!();

    let profile = result?;
    println!("{}\t{}\t{}", profile.id, profile.name, profile.language);
    Ok(())
}

async fn upload(
    orchestrator: &PipelineOrchestrator,
    files: &[PathBuf],
    name: &str,
    language: &str,
) -> anyhow::Result<()> {
    let takes = files
        .iter()
        .map(|path| read_wav(path).with_context(|| format!("reading {}", path.display())))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let profile = orchestrator
        .upload_profile_segments(takes, name, language)
        .await?;
    println!("{}\t{}\t{}", profile.id, profile.name, profile.language);
    Ok(())
}

fn list(orchestrator: &PipelineOrchestrator) {
    let profiles = orchestrator.list_profiles();
    if profiles.is_empty() {
        println!("No voice profiles yet.");
        return;
    }
    for p in profiles {
        println!(
            "{}\t{}\t{}\t{:.1}s\t{}",
            p.id,
            p.name,
            p.language,
            p.source_duration_secs,
            p.created_at.format("%Y-%m-%d %H:%M")
        );
    }
}

fn read_text(text: Option<String>, file: Option<&Path>) -> anyhow::Result<String> {
    match (text, file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display())),
        (None, None) => bail!("either --text or --file is required"),
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // 2. Configuration
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load().unwrap_or_else(|e| {
            log::warn!("Failed to load config ({e}); using defaults");
            AppConfig::default()
        }),
    };

    if let Command::Languages = cli.command {
        for info in language::all() {
            println!("{}\t{}\t{}\t{}", info.code, info.name, info.locale, info.script);
        }
        return Ok(());
    }

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(async move {
        // 4. Store + registry
        let store_dir = config.storage.resolve_dir();
        log::info!("artifact store: {}", store_dir.display());
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            config,
            Arc::new(FileStore::new(store_dir)),
            Arc::new(CpalDevice::new()),
        ));
        orchestrator.restore().await?;

        // 5. Subcommand
        match cli.command {
            Command::Record {
                name,
                seconds,
                language,
            } => record(orchestrator, &name, seconds, &language).await,
            Command::Upload {
                files,
                name,
                language,
            } => upload(&orchestrator, &files, &name, &language).await,
            Command::Clone {
                text,
                file,
                profile,
                language,
                speed,
                pitch,
                emotion,
                out,
            } => {
                let request = CloneRequest {
                    text: read_text(text, file.as_deref())?,
                    profile_id: profile,
                    language,
                    speed,
                    pitch,
                    emotion,
                };
                let speech = orchestrator.clone_voice(request).await?;
                write_wav(&out, &speech)?;
                println!("{} ({:.1}s)", out.display(), speech.duration_secs());
                Ok(())
            }
            Command::List => {
                list(&orchestrator);
                Ok(())
            }
            Command::Delete { id } => {
                orchestrator.delete_profile(&id).await?;
                println!("deleted {id}");
                Ok(())
            }
            Command::Languages => Ok(()),
        }
    })
}
