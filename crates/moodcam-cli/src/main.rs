use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use moodcam_core::advice::NoAdvice;
use moodcam_core::{
    AdviceService, FacingMode, FileStorage, Mood, Severity, SymptomEntry, SymptomLog,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod advice_client;
mod capability_client;
mod config;
#[cfg(test)]
mod test_server;
mod watch;

use advice_client::HttpAdviceClient;

#[derive(Parser)]
#[command(name = "moodcam", about = "Emotion detection and symptom journal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the camera and print the dominant emotion
    Watch {
        /// V4L2 device for the front camera
        #[arg(long, env = "MOODCAM_CAMERA_DEVICE", default_value = "/dev/video0")]
        device: String,
        /// V4L2 device for the rear camera
        #[arg(long)]
        environment_device: Option<String>,
        #[arg(long, value_enum, default_value_t = Facing::User)]
        facing: Facing,
        /// Detection capability server
        #[arg(long, env = "MOODCAM_CAPABILITY_URL", default_value = "http://127.0.0.1:8081")]
        capability_url: String,
        /// Where the capability loads its models from
        #[arg(long, default_value = moodcam_core::session::DEFAULT_MODEL_URL)]
        model_url: String,
        #[arg(long, default_value_t = 720)]
        width: u32,
        #[arg(long, default_value_t = 560)]
        height: u32,
        /// Save the last overlay frame (PNG) on exit
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },
    /// List V4L2 capture devices
    Devices,
    /// Symptom and mood journal
    Log {
        /// Journal directory
        #[arg(long, env = "MOODCAM_DATA_DIR", global = true)]
        data_dir: Option<PathBuf>,
        #[command(subcommand)]
        action: LogAction,
    },
}

#[derive(Subcommand)]
enum LogAction {
    /// Record an entry and wait briefly for AI advice
    Add {
        /// What you feel
        note: String,
        #[arg(short, long, default_value_t = Mood::Neutral)]
        emotion: Mood,
        #[arg(short, long, default_value_t = Severity::Mild)]
        severity: Severity,
        /// Advice proxy root
        #[arg(long, env = "MOODCAM_ADVICE_URL", default_value = "http://127.0.0.1:3000")]
        advice_url: String,
        /// Skip the advice request
        #[arg(long)]
        no_advice: bool,
        /// Seconds to wait for advice before exiting
        #[arg(long, default_value_t = 30)]
        wait: u64,
    },
    /// Show entries, newest first
    List,
    /// Delete every entry
    Clear,
}

#[derive(Clone, Copy, ValueEnum)]
enum Facing {
    User,
    Environment,
}

impl From<Facing> for FacingMode {
    fn from(f: Facing) -> Self {
        match f {
            Facing::User => FacingMode::User,
            Facing::Environment => FacingMode::Environment,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            device,
            environment_device,
            facing,
            capability_url,
            model_url,
            width,
            height,
            snapshot,
            duration,
        } => {
            watch::run(watch::WatchOptions {
                capability_url,
                model_url,
                camera_device: device,
                environment_device,
                facing_mode: facing.into(),
                width,
                height,
                snapshot,
                duration: duration.map(Duration::from_secs),
            })
            .await?;
        }
        Commands::Devices => {
            let devices = moodcam_hw::Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
        Commands::Log { data_dir, action } => {
            let data_dir = data_dir.unwrap_or_else(config::default_data_dir);
            run_log(data_dir, action).await?;
        }
    }

    Ok(())
}

async fn run_log(data_dir: PathBuf, action: LogAction) -> Result<()> {
    let storage = Arc::new(FileStorage::new(&data_dir));

    match action {
        LogAction::Add {
            note,
            emotion,
            severity,
            advice_url,
            no_advice,
            wait,
        } => {
            let advisor: Arc<dyn AdviceService> = if no_advice {
                Arc::new(NoAdvice)
            } else {
                Arc::new(HttpAdviceClient::new(&advice_url, Duration::from_secs(wait.max(1)))?)
            };
            let log = SymptomLog::load(storage, advisor);
            let Some(entry) = log
                .add_entry(&note, emotion, severity)
                .await
                .context("failed to save entry")?
            else {
                println!("Nothing recorded: the note is empty");
                return Ok(());
            };
            println!("Recorded entry {}", entry.id);

            if !no_advice {
                if tokio::time::timeout(Duration::from_secs(wait), log.settle())
                    .await
                    .is_err()
                {
                    tracing::warn!(wait, "gave up waiting for advice");
                }
                if let Some(saved) = log.entries().into_iter().find(|e| e.id == entry.id) {
                    print_entry(&saved);
                }
            }
        }
        LogAction::List => {
            let log = SymptomLog::load(storage, Arc::new(NoAdvice));
            if log.is_empty() {
                println!("No entries in {}", data_dir.display());
            }
            for entry in log.entries() {
                print_entry(&entry);
            }
        }
        LogAction::Clear => {
            let log = SymptomLog::load(storage, Arc::new(NoAdvice));
            let count = log.len();
            log.clear_all().context("failed to clear journal")?;
            println!("Removed {count} entries");
        }
    }

    Ok(())
}

fn print_entry(entry: &SymptomEntry) {
    let local = entry.time.with_timezone(&chrono::Local);
    println!(
        "[{}] {} / {}  {}",
        local.format("%Y-%m-%d %H:%M"),
        entry.emotion,
        entry.severity,
        entry.note
    );
    if let Some(advice) = &entry.advice {
        println!("    advice: {advice}");
    }
}
