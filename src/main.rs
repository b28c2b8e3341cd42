//! Revoice - Video to Voice Pipeline
//!
//! Command line entry point: runs one video or a batch of videos through
//! extraction, transcription, translation and voice synthesis.

use anyhow::{Result, bail};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{Level, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use revoice::batch::{self, BatchDefaults, BatchReport, BatchRunner};
use revoice::cli::{Args, Commands};
use revoice::config::Config;
use revoice::engine::Engines;
use revoice::language;
use revoice::workflow::{CancelFlag, Workflow, WorkflowRequest, WorkflowResult, WorkflowSettings};

const DEFAULT_CONFIG_FILE: &str = "revoice.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = setup_logging(args.verbose)?;
    info!("Starting Revoice - Video to Voice Pipeline");

    // Handled before loading so a broken config file can be replaced
    if let Commands::InitConfig { path, force } = &args.command {
        Config::write_default(path, *force)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new(DEFAULT_CONFIG_FILE).exists() {
                info!("Found {} in current directory, loading...", DEFAULT_CONFIG_FILE);
                Config::from_file(DEFAULT_CONFIG_FILE)?
            } else {
                Config::default()
            }
        }
    };

    match args.command {
        // written above, before the config is loaded
        Commands::InitConfig { .. } => {}
        Commands::Check => {
            let engines = Engines::from_config(&config)?;
            let mut unavailable = 0;
            for (stage, outcome) in engines.check_availability().await {
                match outcome {
                    Ok(version) => println!("{:<18} ok       {}", stage.label(), version),
                    Err(e) => {
                        unavailable += 1;
                        println!("{:<18} missing  {}", stage.label(), e);
                    }
                }
            }
            if unavailable > 0 {
                bail!("{} engine(s) unavailable", unavailable);
            }
        }
        Commands::Run { input, output, voice } => {
            let output = output.unwrap_or_else(|| default_output_path(&input, &voice.target_lang));
            let request = WorkflowRequest::new(&input, &voice.reference, &voice.target_lang, output)
                .with_source_language(&voice.source_lang)
                .with_cleanup(!voice.keep_temp);

            let workflow = Workflow::new(Engines::from_config(&config)?, WorkflowSettings::from_config(&config))
                .with_cancel_flag(cancel_on_ctrl_c());
            let result = workflow.run_workflow(&request).await;

            print_result(&request, &result);
            if let Some(report) = &voice.report {
                write_report(report, &result)?;
            }
            if !result.success {
                bail!("{}", result.error.as_deref().unwrap_or("Workflow failed"));
            }
        }
        Commands::Batch {
            input_dir,
            manifest,
            output_dir,
            concurrency,
            reference,
            target_lang,
            source_lang,
            keep_temp,
            report,
        } => {
            let requests = match (&manifest, &input_dir, reference, target_lang) {
                (Some(manifest), _, _, _) => batch::load_manifest(manifest)?,
                (None, Some(input_dir), Some(reference), Some(target_language)) => {
                    let defaults = BatchDefaults {
                        reference_audio_path: reference,
                        target_language,
                        source_language: source_lang,
                        cleanup_temp_files: !keep_temp,
                    };
                    batch::discover_requests(input_dir, output_dir.as_deref(), &defaults)?
                }
                _ => bail!("batch needs --manifest, or --input-dir with --reference and --target-lang"),
            };

            if let Some(concurrency) = concurrency {
                config.workflow.batch_concurrency = concurrency;
            }

            let runner = BatchRunner::from_config(Engines::from_config(&config)?, &config)
                .with_cancel_flag(cancel_on_ctrl_c())
                .with_progress(true);

            let results = runner.run_batch(&requests).await;
            for (request, result) in requests.iter().zip(&results) {
                print_result(request, result);
            }

            let summary = BatchReport::new(results);
            println!(
                "\nProcessed {} videos: {} succeeded, {} failed, {} translated",
                summary.total, summary.succeeded, summary.failed, summary.translated
            );
            if let Some(report) = &report {
                write_report(report, &summary)?;
            }
            if summary.failed > 0 {
                bail!("{} of {} videos failed", summary.failed, summary.total);
            }
        }
    }

    info!("Revoice finished");
    Ok(())
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<WorkerGuard> {
    let log_dir = std::env::current_dir()?.join(".revoice").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotated file, flushed by the returned guard
    let file_appender = rolling::daily(&log_dir, "revoice.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("revoice.log").display()
    );
    Ok(guard)
}

/// Cancel the workflow between stages on the first Ctrl-C
fn cancel_on_ctrl_c() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current stage");
            flag.cancel();
        }
    });
    cancel
}

fn default_output_path(video: &Path, target_language: &str) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    video.with_file_name(format!("{}_{}.wav", stem, language::normalize(target_language)))
}

fn print_result(request: &WorkflowRequest, result: &WorkflowResult) {
    let name = request.video_path.display();
    if result.success {
        let translated = if result.was_translated {
            format!(
                "translated {} -> {}",
                language::language_code_to_name(result.detected_language.as_deref().unwrap_or("auto")),
                language::language_code_to_name(&result.target_language)
            )
        } else {
            "not translated".to_string()
        };
        println!(
            "OK    {} -> {} ({})",
            name,
            result
                .final_output_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            translated
        );
    } else {
        let stage = result.failed_stage.map(|s| s.label()).unwrap_or("unknown stage");
        let hint = if result.retryable { " (retryable)" } else { "" };
        println!(
            "FAIL  {} at {}{}: {}",
            name,
            stage,
            hint,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
}

fn write_report<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    info!("Report written to {}", path.display());
    Ok(())
}
