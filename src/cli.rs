use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by `run` and `batch`
#[derive(ClapArgs, Debug, Clone)]
pub struct VoiceOptions {
    /// Reference recording of the voice to speak with
    #[arg(short, long)]
    pub reference: PathBuf,

    /// Target language code
    #[arg(short, long)]
    pub target_lang: String,

    /// Source language code, or "auto" to use the detected language
    #[arg(short, long, default_value = "auto")]
    pub source_lang: String,

    /// Keep the extracted audio instead of deleting it
    #[arg(long)]
    pub keep_temp: bool,

    /// Write the JSON result report to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Re-voice a single video file
    Run {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Output audio file (defaults to <video stem>_<target>.wav next to the video)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        voice: VoiceOptions,
    },

    /// Re-voice every video in a directory, or every request in a manifest
    Batch {
        /// Input directory containing video files
        #[arg(short, long, conflicts_with = "manifest", required_unless_present = "manifest")]
        input_dir: Option<PathBuf>,

        /// JSON file holding an array of requests
        #[arg(short, long)]
        manifest: Option<PathBuf>,

        /// Output directory for generated audio
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Number of videos processed at once (overrides the config file)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Reference recording of the voice to speak with
        #[arg(short, long, required_unless_present = "manifest")]
        reference: Option<PathBuf>,

        /// Target language code
        #[arg(short, long, required_unless_present = "manifest")]
        target_lang: Option<String>,

        /// Source language code, or "auto" to use the detected language
        #[arg(short, long, default_value = "auto")]
        source_lang: String,

        /// Keep the extracted audio instead of deleting it
        #[arg(long)]
        keep_temp: bool,

        /// Write the JSON batch report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Check that every configured engine can be reached
    Check,

    /// Write the default configuration to a file
    InitConfig {
        /// Destination file
        #[arg(short, long, default_value = "revoice.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
