//! Dualcap CLI: record screen and camera together, then merge them.
//!
//! Usage:
//!   dualcap record [OPTIONS]                 Record until Ctrl+C, then merge
//!   dualcap merge <SCREEN> <CAMERA>          Merge two recordings into one PIP video
//!   dualcap extract-audio <SOURCE>           Export a recording's audio track
//!   dualcap info <PATH>...                   Show stream time ranges
//!   dualcap check                            Check system capabilities

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use dualcap_common::config::{config_file_path, AppConfig};
use dualcap_session_model::{OverlayCorner, OverlaySpec, QualityPreset, SizePolicy};

mod commands;

#[derive(Parser)]
#[command(
    name = "dualcap",
    about = "Screen and camera recording with picture-in-picture merge",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the configured overlay.
#[derive(Args, Clone, Copy)]
struct OverlayArgs {
    /// Camera corner: top-left, top-right, bottom-left, bottom-right
    #[arg(long)]
    corner: Option<OverlayCorner>,

    /// Camera size policy: auto, 1:1, 4:3, 16:9
    #[arg(long)]
    size: Option<SizePolicy>,

    /// Inset of the camera from the screen edge, in pixels
    #[arg(long)]
    margin: Option<u32>,
}

impl OverlayArgs {
    fn apply(self, base: OverlaySpec) -> OverlaySpec {
        OverlaySpec {
            position: self.corner.unwrap_or(base.position),
            size_policy: self.size.unwrap_or(base.size_policy),
            margin: self.margin.unwrap_or(base.margin),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Record screen (and camera) until Ctrl+C
    Record {
        /// Recordings directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Quality: standard, high, ultra, max (or 720p, 1080p, 1440p, 4k)
        #[arg(short, long)]
        quality: Option<QualityPreset>,

        /// Record the screen only
        #[arg(long, conflicts_with = "camera")]
        no_camera: bool,

        /// Record the camera even if disabled in the config
        #[arg(long)]
        camera: bool,

        /// Disable microphone capture
        #[arg(long)]
        no_mic: bool,

        /// Also record the microphone into the camera file
        #[arg(long)]
        camera_audio: bool,

        /// Use software test sources instead of real devices
        #[arg(long)]
        synthetic: bool,

        /// Skip merge and audio export after stopping
        #[arg(long)]
        no_finalize: bool,

        #[command(flatten)]
        overlay: OverlayArgs,
    },

    /// Merge a screen and a camera recording
    Merge {
        screen: PathBuf,
        camera: PathBuf,

        /// Output file (defaults to merged_video.mov next to the screen recording)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Export quality
        #[arg(short, long)]
        quality: Option<QualityPreset>,

        #[command(flatten)]
        overlay: OverlayArgs,
    },

    /// Export the first audio track of a recording
    ExtractAudio {
        source: PathBuf,

        /// Output file (defaults to session_audio.m4a next to the source)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show stream time ranges of recordings
    Info {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Check system capabilities
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(config_file_path);
    let config = AppConfig::load_from(&config_path);

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    dualcap_common::logging::init_logging(&logging);
    tracing::debug!(config = %config_path.display(), "Configuration loaded");

    match cli.command {
        Commands::Record {
            output,
            quality,
            no_camera,
            camera,
            no_mic,
            camera_audio,
            synthetic,
            no_finalize,
            overlay,
        } => {
            let mut config = config;
            if let Some(dir) = output {
                config.recordings_dir = dir;
            }
            if let Some(quality) = quality {
                config.recording.quality = quality;
            }
            if no_camera {
                config.recording.camera_enabled = false;
            } else if camera {
                config.recording.camera_enabled = true;
            }
            if no_mic {
                config.recording.mic_enabled = false;
            }
            config.recording.camera_audio |= camera_audio;
            config.overlay = overlay.apply(config.overlay);

            commands::record::run(config, synthetic, !no_finalize).await
        }
        Commands::Merge {
            screen,
            camera,
            output,
            quality,
            overlay,
        } => {
            let mut export = config.export.clone();
            if let Some(quality) = quality {
                export.quality = quality;
            }
            commands::merge::run(screen, camera, output, overlay.apply(config.overlay), &export).await
        }
        Commands::ExtractAudio { source, output } => {
            commands::extract_audio::run(source, output, config.export.audio_bitrate_kbps).await
        }
        Commands::Info { paths, json } => commands::info::run(paths, json).await,
        Commands::Check => commands::check::run().await,
    }
}
