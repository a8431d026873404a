// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{info, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use subburn::app_config::{self, Config};
use subburn::app_controller::{load_style, Controller};
use subburn::export::{ExportParams, OutputFormat, Resolution, VideoCodec};

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render a caption preview artifact through the render service
    Preview {
        /// SRT caption file
        #[arg(value_name = "CAPTIONS")]
        captions: PathBuf,

        /// Style descriptor JSON file (defaults to the built-in style)
        #[arg(short, long)]
        style: Option<PathBuf>,

        /// Output file for the preview artifact
        #[arg(short, long, default_value = "preview.ass")]
        out: PathBuf,

        /// Skip the preview cache and re-render
        #[arg(short, long)]
        force: bool,
    },

    /// Burn captions into one or more projects and download the results
    Export {
        /// Project identifiers to export
        #[arg(value_name = "PROJECT_ID", required = true)]
        project_ids: Vec<String>,

        /// Output resolution (720p, 1080p, 1440p, 4k)
        #[arg(short, long, default_value = "1080p")]
        resolution: Resolution,

        /// Video codec (h264, h265, vp9)
        #[arg(long, default_value = "h264")]
        codec: VideoCodec,

        /// Target bitrate, e.g. 8M or 2500k
        #[arg(short, long, default_value = "8M")]
        bitrate: String,

        /// Output frame rate (defaults to the source)
        #[arg(long)]
        fps: Option<u32>,

        /// Container format (mp4, webm, mov)
        #[arg(long, default_value = "mp4")]
        format: OutputFormat,

        /// Style descriptor JSON file overriding the projects' styles
        #[arg(short, long)]
        style: Option<PathBuf>,

        /// Directory for downloaded exports
        #[arg(short, long)]
        download_dir: Option<PathBuf>,
    },

    /// Show the state of an export batch
    Status {
        /// Batch identifier
        batch_id: String,
    },

    /// Generate shell completions for subburn
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// subburn - caption preview and burn-in export client
///
/// Talks to a caption render/export service to preview caption styles and to
/// burn captions into videos in batches.
#[derive(Parser, Debug)]
#[command(name = "subburn")]
#[command(version)]
#[command(about = "Caption style preview and batch burn-in export")]
#[command(long_about = "subburn renders caption style previews and drives batch exports that burn captions into video.

EXAMPLES:
    subburn preview talk.srt -s style.json            # Render a preview artifact
    subburn export proj-1 proj-2 -r 4k -b 20M          # Export two projects in 4K
    subburn status 5f0c2d7e                            # Show a batch's progress
    subburn completions bash > subburn.bash            # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. If the config file doesn't
    exist, a default one will be created automatically.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json", global = true)]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {:<5} {}\x1B[0m",
                Self::color_for_level(record.level()),
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn level_filter(level: &app_config::LogLevel) -> LevelFilter {
    match level {
        app_config::LogLevel::Error => LevelFilter::Error,
        app_config::LogLevel::Warn => LevelFilter::Warn,
        app_config::LogLevel::Info => LevelFilter::Info,
        app_config::LogLevel::Debug => LevelFilter::Debug,
        app_config::LogLevel::Trace => LevelFilter::Trace,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // The logger accepts everything; the effective level is set below
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(shell, &mut cmd, "subburn", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = Config::load_or_create(Path::new(&cli.config_path))?;
    if let Some(log_level) = cli.log_level {
        config.log_level = log_level.into();
    }
    log::set_max_level(level_filter(&config.log_level));

    config.validate().context("Configuration validation failed")?;
    let controller = Controller::with_config(config)?;

    match cli.command {
        Commands::Preview { captions, style, out, force } => {
            controller.preview(&captions, style.as_deref(), &out, force).await?;
        }
        Commands::Export {
            project_ids,
            resolution,
            codec,
            bitrate,
            fps,
            format,
            style,
            download_dir,
        } => {
            let style = style.as_deref().map(load_style).transpose()?;
            let params = ExportParams {
                resolution,
                codec,
                bitrate,
                fps,
                format,
                style,
            };

            let interrupt = CancellationToken::new();
            let on_ctrl_c = interrupt.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_ctrl_c.cancel();
                }
            });

            let batch = controller.export(project_ids, params, download_dir, interrupt).await?;
            info!("Export finished with status {}", batch.status);
        }
        Commands::Status { batch_id } => {
            let batch = controller.status(&batch_id).await?;
            println!(
                "Batch {}: {} ({:.0}%)",
                batch.id, batch.status, batch.total_progress
            );
            for job in &batch.jobs {
                println!(
                    "  {:<24} {:<10} {:>5.1}%{}",
                    job.project_id,
                    job.status.to_string(),
                    job.progress,
                    job.error.as_deref().map(|e| format!("  {}", e)).unwrap_or_default()
                );
            }
        }
        Commands::Completions { .. } => unreachable!("handled before loading the configuration"),
    }

    Ok(())
}
