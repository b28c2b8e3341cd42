use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio;
use crate::config::Config;
use crate::engine::Engines;
use crate::error::{Result, RevoiceError};
use crate::language;
use crate::transcribe::{Transcription, TranscriptionSegment, UNKNOWN_LANGUAGE};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Validation,
    AudioExtraction,
    Transcription,
    Translation,
    Synthesis,
}

impl StageName {
    pub fn label(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::AudioExtraction => "audio extraction",
            Self::Transcription => "transcription",
            Self::Translation => "translation",
            Self::Synthesis => "synthesis",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn default_source_language() -> String {
    language::AUTO.to_string()
}

fn default_cleanup() -> bool {
    true
}

/// One video to re-voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub video_path: PathBuf,
    pub reference_audio_path: PathBuf,
    pub target_language: String,
    /// Language code or `"auto"`
    #[serde(default = "default_source_language")]
    pub source_language: String,
    pub output_path: PathBuf,
    #[serde(default = "default_cleanup")]
    pub cleanup_temp_files: bool,
}

impl WorkflowRequest {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>, R: Into<PathBuf>>(
        video_path: P,
        reference_audio_path: Q,
        target_language: &str,
        output_path: R,
    ) -> Self {
        Self {
            video_path: video_path.into(),
            reference_audio_path: reference_audio_path.into(),
            target_language: target_language.to_string(),
            source_language: default_source_language(),
            output_path: output_path.into(),
            cleanup_temp_files: true,
        }
    }

    pub fn with_source_language(mut self, source_language: &str) -> Self {
        self.source_language = source_language.to_string();
        self
    }

    pub fn with_cleanup(mut self, cleanup_temp_files: bool) -> Self {
        self.cleanup_temp_files = cleanup_temp_files;
        self
    }

    /// Check inputs before any stage runs; creates the output directory.
    pub async fn validate(&self) -> Result<()> {
        require_file(&self.video_path, "Video file")?;
        require_file(&self.reference_audio_path, "Reference audio")?;

        if language::is_auto(&self.target_language) {
            return Err(RevoiceError::Validation(
                "Target language must be an explicit language code".to_string(),
            ));
        }

        if self.output_path.file_name().is_none() || self.output_path.is_dir() {
            return Err(RevoiceError::Validation(format!(
                "Output path is not a file path: {}",
                self.output_path.display()
            )));
        }

        if self.output_path == self.video_path || self.output_path == self.reference_audio_path {
            return Err(RevoiceError::Validation(format!(
                "Output path would overwrite an input: {}",
                self.output_path.display()
            )));
        }

        if let Some(parent) = self.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                RevoiceError::Validation(format!(
                    "Cannot create output directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        Ok(())
    }
}

fn require_file(path: &Path, what: &str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(RevoiceError::Validation(format!("{} not found: {}", what, path.display())))
    }
}

/// Stage-specific payload of a `StageResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageData {
    None,
    AudioExtraction {
        audio_path: PathBuf,
        sample_rate: u32,
        channels: u16,
        file_size: u64,
        duration_secs: Option<f64>,
        /// The caller owns the file after the run
        retained: bool,
    },
    Transcription {
        text: String,
        detected_language: String,
        segments: Vec<TranscriptionSegment>,
        confidence: Option<f64>,
    },
    Translation {
        original: String,
        translated: String,
        source_language: String,
        target_language: String,
        confidence: Option<f64>,
    },
    Skipped {
        reason: String,
    },
    Synthesis {
        output_path: PathBuf,
        file_size: u64,
        text_chars: usize,
    },
}

/// Outcome of one stage. Created once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: StageName,
    pub success: bool,
    pub skipped: bool,
    pub data: StageData,
    pub error: Option<String>,
    pub elapsed_secs: f64,
}

impl StageResult {
    fn succeeded(stage: StageName, data: StageData, elapsed: Duration) -> Self {
        Self {
            stage,
            success: true,
            skipped: false,
            data,
            error: None,
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }

    fn failed(stage: StageName, err: &RevoiceError, elapsed: Duration) -> Self {
        Self {
            stage,
            success: false,
            skipped: false,
            data: StageData::None,
            error: Some(err.to_string()),
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }

    fn skipped(stage: StageName, reason: String) -> Self {
        Self {
            stage,
            success: true,
            skipped: true,
            data: StageData::Skipped { reason },
            error: None,
            elapsed_secs: 0.0,
        }
    }
}

/// Everything a caller learns about a run, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub run_id: Uuid,
    pub success: bool,
    pub final_output_path: Option<PathBuf>,
    pub original_text: Option<String>,
    pub final_text: Option<String>,
    pub was_translated: bool,
    pub detected_language: Option<String>,
    pub target_language: String,
    pub error: Option<String>,
    pub failed_stage: Option<StageName>,
    pub retryable: bool,
    pub steps: BTreeMap<StageName, StageResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowResult {
    fn new(run_id: Uuid, request: &WorkflowRequest) -> Self {
        Self {
            run_id,
            success: false,
            final_output_path: None,
            original_text: None,
            final_text: None,
            was_translated: false,
            detected_language: None,
            target_language: request.target_language.clone(),
            error: None,
            failed_stage: None,
            retryable: false,
            steps: BTreeMap::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Result for a run that never got to report for itself.
    pub fn aborted(request: &WorkflowRequest, message: String) -> Self {
        let mut result = Self::new(Uuid::new_v4(), request);
        result.error = Some(message);
        result.finished_at = Some(Utc::now());
        result
    }

    pub fn step(&self, stage: StageName) -> Option<&StageResult> {
        self.steps.get(&stage)
    }

    /// Extracted audio left on disk for the caller, if any.
    pub fn retained_audio_path(&self) -> Option<&Path> {
        match self.step(StageName::AudioExtraction).map(|s| &s.data) {
            Some(StageData::AudioExtraction { audio_path, retained: true, .. }) => Some(audio_path),
            _ => None,
        }
    }
}

/// Whether the transcript has to go through the translator, decided once
/// from the request and the transcription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationPlan {
    pub needs_translation: bool,
    /// Source language handed to the translator; `"auto"` when unknown
    pub source_language: String,
}

impl TranslationPlan {
    pub fn decide(request: &WorkflowRequest, transcription: &Transcription) -> Self {
        let source = if language::is_auto(&request.source_language) {
            transcription.detected_language.as_str()
        } else {
            request.source_language.as_str()
        };

        let source_language = if language::is_auto(source) || source == UNKNOWN_LANGUAGE {
            language::AUTO.to_string()
        } else {
            source.to_string()
        };

        Self {
            needs_translation: !language::same_language(&source_language, &request.target_language),
            source_language,
        }
    }
}

/// Workflow states; the order of the non-terminal states is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Validating,
    Extracting,
    Transcribing,
    Translating,
    Synthesizing,
    Finalizing,
    Succeeded,
    Failed(StageName),
}

impl WorkflowState {
    /// Stage entered by this state, for states that call an adapter.
    pub fn stage(self) -> Option<StageName> {
        match self {
            Self::Extracting => Some(StageName::AudioExtraction),
            Self::Transcribing => Some(StageName::Transcription),
            Self::Translating => Some(StageName::Translation),
            Self::Synthesizing => Some(StageName::Synthesis),
            _ => None,
        }
    }
}

/// Cooperative cancellation, checked between stages only.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run-independent knobs of the workflow.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub temp_dir: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    pub extraction_timeout: Option<Duration>,
    pub transcription_timeout: Option<Duration>,
    pub translation_timeout: Option<Duration>,
    pub synthesis_timeout: Option<Duration>,
}

impl WorkflowSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            temp_dir: config.workflow.temp_dir.clone(),
            sample_rate: config.media.sample_rate,
            channels: config.media.channels,
            extraction_timeout: config.workflow.extraction_timeout(),
            transcription_timeout: config.workflow.transcription_timeout(),
            translation_timeout: config.workflow.translation_timeout(),
            synthesis_timeout: config.workflow.synthesis_timeout(),
        }
    }

    fn timeout_for(&self, stage: StageName) -> Option<Duration> {
        match stage {
            StageName::Validation => None,
            StageName::AudioExtraction => self.extraction_timeout,
            StageName::Transcription => self.transcription_timeout,
            StageName::Translation => self.translation_timeout,
            StageName::Synthesis => self.synthesis_timeout,
        }
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Extracted audio owned by a single run.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file; a file that was never written is not an error.
    pub async fn remove(self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Hand the file over to the caller.
    pub fn keep(self) -> PathBuf {
        self.path
    }
}

/// Mutable state of one run, dropped when the run ends.
struct Run<'a> {
    request: &'a WorkflowRequest,
    result: WorkflowResult,
    artifact: Option<TempArtifact>,
    transcription: Option<Transcription>,
    final_text: Option<String>,
    /// Language `final_text` is written in
    speech_language: Option<String>,
    started: Instant,
}

impl<'a> Run<'a> {
    fn new(request: &'a WorkflowRequest) -> Self {
        Self {
            request,
            result: WorkflowResult::new(Uuid::new_v4(), request),
            artifact: None,
            transcription: None,
            final_text: None,
            speech_language: None,
            started: Instant::now(),
        }
    }

    fn record(&mut self, stage_result: StageResult) {
        self.result.steps.insert(stage_result.stage, stage_result);
    }

    fn fail(&mut self, stage: StageName, err: RevoiceError) -> WorkflowState {
        error!(run_id = %self.result.run_id, "Workflow failed at {}: {}", stage, err);
        self.result.retryable = err.is_retryable();
        self.result.error = Some(err.to_string());
        self.result.failed_stage = Some(stage);
        WorkflowState::Failed(stage)
    }

    fn fail_stage(&mut self, stage: StageName, err: RevoiceError, elapsed: Duration) -> WorkflowState {
        self.record(StageResult::failed(stage, &err, elapsed));
        self.fail(stage, err)
    }
}

/// Sequences extraction, transcription, translation and synthesis for one
/// request at a time.
#[derive(Clone)]
pub struct Workflow {
    engines: Engines,
    settings: WorkflowSettings,
    cancel: CancelFlag,
}

impl Workflow {
    pub fn new(engines: Engines, settings: WorkflowSettings) -> Self {
        Self {
            engines,
            settings,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn engines(&self) -> &Engines {
        &self.engines
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    /// Run one request to completion. Never fails: the result carries the outcome.
    pub async fn run_workflow(&self, request: &WorkflowRequest) -> WorkflowResult {
        let mut run = Run::new(request);
        info!(
            run_id = %run.result.run_id,
            "Starting workflow: {} -> {} ({} -> {})",
            request.video_path.display(),
            request.output_path.display(),
            request.source_language,
            request.target_language
        );

        let mut state = WorkflowState::Validating;
        loop {
            state = match state {
                WorkflowState::Succeeded | WorkflowState::Failed(_) => break,
                active => match active.stage() {
                    Some(stage) if self.cancel.is_cancelled() => {
                        run.fail(stage, RevoiceError::Cancelled(stage))
                    }
                    _ => self.advance(active, &mut run).await,
                },
            };
        }

        // failed runs still own their artifact
        self.release_artifact(&mut run).await;

        run.result.finished_at = Some(Utc::now());
        match state {
            WorkflowState::Succeeded => info!(
                run_id = %run.result.run_id,
                "Workflow completed in {:.1}s: {}",
                run.started.elapsed().as_secs_f64(),
                request.output_path.display()
            ),
            _ => warn!(
                run_id = %run.result.run_id,
                "Workflow ended without output after {:.1}s",
                run.started.elapsed().as_secs_f64()
            ),
        }
        run.result
    }

    async fn advance(&self, state: WorkflowState, run: &mut Run<'_>) -> WorkflowState {
        match state {
            WorkflowState::Validating => self.validate(run).await,
            WorkflowState::Extracting => self.extract(run).await,
            WorkflowState::Transcribing => self.transcribe(run).await,
            WorkflowState::Translating => self.translate(run).await,
            WorkflowState::Synthesizing => self.synthesize(run).await,
            WorkflowState::Finalizing => self.finalize(run).await,
            WorkflowState::Succeeded | WorkflowState::Failed(_) => state,
        }
    }

    async fn validate(&self, run: &mut Run<'_>) -> WorkflowState {
        match run.request.validate().await {
            Ok(()) => WorkflowState::Extracting,
            Err(e) => run.fail(StageName::Validation, e.into_stage(StageName::Validation)),
        }
    }

    async fn extract(&self, run: &mut Run<'_>) -> WorkflowState {
        let stage = StageName::AudioExtraction;
        let request = run.request;

        if let Err(e) = fs::create_dir_all(&self.settings.temp_dir).await {
            let err = RevoiceError::Extraction(format!(
                "Cannot create temp directory {}: {}",
                self.settings.temp_dir.display(),
                e
            ));
            return run.fail_stage(stage, err, Duration::ZERO);
        }

        let stem = request
            .video_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        let audio_path = self
            .settings
            .temp_dir
            .join(format!("{}_{}.wav", stem, run.result.run_id.simple()));
        run.artifact = Some(TempArtifact::new(audio_path.clone()));

        let extractor = self.engines.extractor.clone();
        let source = request.video_path.clone();
        let dest = audio_path.clone();
        let (sample_rate, channels) = (self.settings.sample_rate, self.settings.channels);

        let (outcome, elapsed) = self
            .run_stage(stage, async move {
                extractor.extract_audio(&source, &dest, sample_rate, channels).await
            })
            .await;

        if let Err(e) = outcome {
            return run.fail_stage(stage, e, elapsed);
        }

        let file_size = match fs::metadata(&audio_path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => {
                let err = RevoiceError::Extraction(format!(
                    "Extractor reported success but wrote no file at {}",
                    audio_path.display()
                ));
                return run.fail_stage(stage, err, elapsed);
            }
        };
        let duration_secs = audio::probe_wav(&audio_path).ok().map(|info| info.duration_secs);

        run.record(StageResult::succeeded(
            stage,
            StageData::AudioExtraction {
                audio_path,
                sample_rate,
                channels,
                file_size,
                duration_secs,
                retained: !request.cleanup_temp_files,
            },
            elapsed,
        ));
        WorkflowState::Transcribing
    }

    async fn transcribe(&self, run: &mut Run<'_>) -> WorkflowState {
        let stage = StageName::Transcription;
        let Some(audio_path) = run.artifact.as_ref().map(|a| a.path().to_path_buf()) else {
            return run.fail(stage, RevoiceError::Transcription("No extracted audio to transcribe".to_string()));
        };

        let transcriber = self.engines.transcriber.clone();
        let hint = run.request.source_language.clone();

        let (outcome, elapsed) = self
            .run_stage(stage, async move { transcriber.transcribe(&audio_path, &hint).await })
            .await;

        let transcription = match outcome {
            Ok(transcription) => transcription,
            Err(e) => return run.fail_stage(stage, e, elapsed),
        };

        info!(
            "Transcribed {} chars, detected language {}",
            transcription.text.chars().count(),
            transcription.detected_language
        );

        run.record(StageResult::succeeded(
            stage,
            StageData::Transcription {
                text: transcription.text.clone(),
                detected_language: transcription.detected_language.clone(),
                segments: transcription.segments.clone(),
                confidence: transcription.confidence,
            },
            elapsed,
        ));
        run.result.original_text = Some(transcription.text.clone());
        run.result.detected_language = Some(transcription.detected_language.clone());
        run.transcription = Some(transcription);
        WorkflowState::Translating
    }

    async fn translate(&self, run: &mut Run<'_>) -> WorkflowState {
        let stage = StageName::Translation;
        let Some(transcription) = run.transcription.as_ref() else {
            return run.fail(stage, RevoiceError::Translation("No transcription to translate".to_string()));
        };

        let plan = TranslationPlan::decide(run.request, transcription);
        let original = transcription.text.clone();
        let target = run.request.target_language.clone();

        if !plan.needs_translation {
            info!("No translation needed: source {} matches target {}", plan.source_language, target);
            run.record(StageResult::skipped(
                stage,
                format!("source language {} matches target {}", plan.source_language, target),
            ));
            run.final_text = Some(original);
            run.speech_language = Some(target);
            return WorkflowState::Synthesizing;
        }

        let translator = self.engines.translator.clone();
        let (text, source, to) = (original.clone(), plan.source_language.clone(), target.clone());

        let (outcome, elapsed) = self
            .run_stage(stage, async move { translator.translate(&text, &source, &to).await })
            .await;

        let outcome = outcome.and_then(|translation| {
            if translation.translated_text.trim().is_empty() {
                Err(RevoiceError::Translation("Empty translation received".to_string()))
            } else {
                Ok(translation)
            }
        });

        match outcome {
            Ok(translation) => {
                run.result.was_translated = translation.translated_text.trim() != original.trim();
                if run.result.detected_language.as_deref().is_none_or(|l| l == UNKNOWN_LANGUAGE)
                    && !language::is_auto(&translation.detected_source_language)
                {
                    run.result.detected_language = Some(translation.detected_source_language.clone());
                }

                run.record(StageResult::succeeded(
                    stage,
                    StageData::Translation {
                        original,
                        translated: translation.translated_text.clone(),
                        source_language: translation.detected_source_language,
                        target_language: target.clone(),
                        confidence: translation.confidence,
                    },
                    elapsed,
                ));
                run.final_text = Some(translation.translated_text);
                run.speech_language = Some(target);
            }
            Err(e) => {
                // translation is an enhancement: speak the original text instead
                warn!("Translation failed, continuing with original text: {}", e);
                run.record(StageResult::failed(stage, &e, elapsed));
                run.result.was_translated = false;
                run.final_text = Some(original);
                run.speech_language = Some(if language::is_auto(&plan.source_language) {
                    target
                } else {
                    plan.source_language
                });
            }
        }
        WorkflowState::Synthesizing
    }

    async fn synthesize(&self, run: &mut Run<'_>) -> WorkflowState {
        let stage = StageName::Synthesis;
        let Some(final_text) = run.final_text.clone() else {
            return run.fail(stage, RevoiceError::Synthesis("No text to synthesize".to_string()));
        };
        run.result.final_text = Some(final_text.clone());

        let request = run.request;
        let output_path = request.output_path.clone();
        let staging_path = staging_path(&output_path, run.result.run_id);
        let language = run
            .speech_language
            .clone()
            .unwrap_or_else(|| request.target_language.clone());

        let synthesizer = self.engines.synthesizer.clone();
        let reference = request.reference_audio_path.clone();
        let dest = staging_path.clone();
        let text = final_text.clone();

        let (outcome, elapsed) = self
            .run_stage(stage, async move {
                synthesizer.synthesize(&text, &language, &reference, &dest).await
            })
            .await;

        let outcome = match outcome {
            Ok(()) if !staging_path.is_file() => Err(RevoiceError::Synthesis(
                "Synthesizer reported success but wrote no file".to_string(),
            )),
            Ok(()) => fs::rename(&staging_path, &output_path).await.map_err(|e| {
                RevoiceError::Synthesis(format!("Cannot move output into {}: {}", output_path.display(), e))
            }),
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            if let Err(cleanup) = fs::remove_file(&staging_path).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove partial output {}: {}", staging_path.display(), cleanup);
                }
            }
            return run.fail_stage(stage, e, elapsed);
        }

        let file_size = fs::metadata(&output_path).await.map(|m| m.len()).unwrap_or(0);
        run.record(StageResult::succeeded(
            stage,
            StageData::Synthesis {
                output_path: output_path.clone(),
                file_size,
                text_chars: final_text.chars().count(),
            },
            elapsed,
        ));
        run.result.final_output_path = Some(output_path);
        WorkflowState::Finalizing
    }

    async fn finalize(&self, run: &mut Run<'_>) -> WorkflowState {
        self.release_artifact(run).await;
        run.result.success = true;
        WorkflowState::Succeeded
    }

    /// Delete the run's extracted audio, or hand it to the caller.
    ///
    /// Deletion is best-effort and never changes the outcome of the run.
    async fn release_artifact(&self, run: &mut Run<'_>) {
        let Some(artifact) = run.artifact.take() else {
            return;
        };

        if run.request.cleanup_temp_files {
            let path = artifact.path().to_path_buf();
            match artifact.remove().await {
                Ok(()) => debug!("Removed temporary audio {}", path.display()),
                Err(e) => warn!("Failed to remove temporary audio {}: {}", path.display(), e),
            }
        } else {
            let path = artifact.keep();
            info!("Keeping extracted audio at {}", path.display());
        }
    }

    /// Run one adapter call on its own task, bounded by the stage timeout.
    ///
    /// A timed-out task is aborted, which drops the adapter future and kills
    /// any child process it spawned. Errors outside the stage's kind and
    /// panics are reclassified into the stage's kind.
    async fn run_stage<T, F>(&self, stage: StageName, future: F) -> (Result<T>, Duration)
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let started = Instant::now();
        info!("Stage {} started", stage);

        let mut handle = tokio::spawn(future);
        let joined = match self.settings.timeout_for(stage) {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    let _ = handle.await;
                    let err = RevoiceError::for_stage(
                        stage,
                        format!("timed out after {:.1}s", limit.as_secs_f64()),
                    );
                    return (Err(err), started.elapsed());
                }
            },
            None => (&mut handle).await,
        };

        let outcome = match joined {
            Ok(result) => result.map_err(|e| e.into_stage(stage)),
            Err(join_error) => Err(RevoiceError::for_stage(
                stage,
                format!("unexpected engine failure: {}", join_error),
            )),
        };

        let elapsed = started.elapsed();
        debug!("Stage {} finished in {:.2}s", stage, elapsed.as_secs_f64());
        (outcome, elapsed)
    }
}

/// Run-unique file next to `output` that synthesis writes before the final rename.
fn staging_path(output: &Path, run_id: Uuid) -> PathBuf {
    let file_name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.wav".to_string());
    output.with_file_name(format!(".{}.{}", run_id.simple(), file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tests::write_silence;
    use crate::media::MockMediaExtractor;
    use crate::synthesis::{MockVoiceSynthesizer, VoiceSynthesizer};
    use crate::transcribe::{MockTranscriber, Transcriber};
    use crate::translate::{MockTranslator, Translation};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        video: PathBuf,
        reference: PathBuf,
        temp_dir: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let video = dir.path().join("clip.mp4");
            std::fs::write(&video, b"not really a video").unwrap();
            let reference = dir.path().join("ref.wav");
            write_silence(&reference, 16000, 4.0);
            let temp_dir = dir.path().join("tmp");
            Self { dir, video, reference, temp_dir }
        }

        fn request(&self) -> WorkflowRequest {
            WorkflowRequest::new(&self.video, &self.reference, "fr", self.dir.path().join("out").join("out.wav"))
        }

        fn settings(&self) -> WorkflowSettings {
            WorkflowSettings {
                temp_dir: self.temp_dir.clone(),
                ..WorkflowSettings::default()
            }
        }

        fn temp_files(&self) -> Vec<PathBuf> {
            match std::fs::read_dir(&self.temp_dir) {
                Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
                Err(_) => Vec::new(),
            }
        }
    }

    fn transcription(text: &str, language: &str) -> Transcription {
        Transcription {
            text: text.to_string(),
            detected_language: language.to_string(),
            segments: vec![TranscriptionSegment { start: 0.0, end: 1.0, text: text.to_string() }],
            confidence: Some(0.9),
        }
    }

    fn working_extractor() -> MockMediaExtractor {
        let mut extractor = MockMediaExtractor::new();
        extractor.expect_extract_audio().returning(|_, dest, sample_rate, _| {
            write_silence(dest, sample_rate, 0.5);
            Ok(())
        });
        extractor
    }

    fn transcriber_returning(text: &'static str, language: &'static str) -> MockTranscriber {
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .returning(move |_, _| Ok(transcription(text, language)));
        transcriber
    }

    fn translator_returning(text: &'static str) -> MockTranslator {
        let mut translator = MockTranslator::new();
        translator.expect_translate().returning(move |_, source, _| {
            Ok(Translation {
                translated_text: text.to_string(),
                detected_source_language: source.to_string(),
                confidence: Some(0.8),
            })
        });
        translator
    }

    fn working_synthesizer() -> MockVoiceSynthesizer {
        let mut synthesizer = MockVoiceSynthesizer::new();
        synthesizer.expect_synthesize().returning(|_, _, _, dest| {
            std::fs::write(dest, b"RIFF fake speech").unwrap();
            Ok(())
        });
        synthesizer
    }

    fn workflow(
        fixture: &Fixture,
        extractor: MockMediaExtractor,
        transcriber: MockTranscriber,
        translator: MockTranslator,
        synthesizer: impl VoiceSynthesizer + 'static,
    ) -> Workflow {
        let engines = Engines::new(
            Arc::new(extractor),
            Arc::new(transcriber),
            Arc::new(translator),
            Arc::new(synthesizer),
        );
        Workflow::new(engines, fixture.settings())
    }

    #[tokio::test]
    async fn full_run_translates_and_speaks() {
        let fx = Fixture::new();
        let wf = workflow(
            &fx,
            working_extractor(),
            transcriber_returning("Hello there", "en"),
            translator_returning("Bonjour"),
            working_synthesizer(),
        );
        let request = fx.request();

        let result = wf.run_workflow(&request).await;

        assert!(result.success, "{:?}", result.error);
        assert!(result.was_translated);
        assert_eq!(result.detected_language.as_deref(), Some("en"));
        assert_eq!(result.original_text.as_deref(), Some("Hello there"));
        assert_eq!(result.final_text.as_deref(), Some("Bonjour"));
        assert_eq!(result.final_output_path.as_deref(), Some(request.output_path.as_path()));
        assert!(request.output_path.is_file());
        assert_eq!(result.error, None);

        for stage in [
            StageName::AudioExtraction,
            StageName::Transcription,
            StageName::Translation,
            StageName::Synthesis,
        ] {
            let step = result.step(stage).unwrap();
            assert!(step.success && !step.skipped, "{} not successful", stage);
        }
        assert!(fx.temp_files().is_empty());
    }

    #[tokio::test]
    async fn matching_language_skips_translation() {
        let fx = Fixture::new();
        let mut translator = MockTranslator::new();
        translator.expect_translate().never();
        let mut synthesizer = MockVoiceSynthesizer::new();
        synthesizer
            .expect_synthesize()
            .withf(|text, language, _, _| text == "Bonjour à tous" && language == "fr")
            .returning(|_, _, _, dest| {
                std::fs::write(dest, b"speech").unwrap();
                Ok(())
            });

        let wf = workflow(&fx, working_extractor(), transcriber_returning("Bonjour à tous", "fr"), translator, synthesizer);
        let result = wf.run_workflow(&fx.request()).await;

        assert!(result.success);
        assert!(!result.was_translated);
        let step = result.step(StageName::Translation).unwrap();
        assert!(step.skipped);
        assert_eq!(result.final_text, result.original_text);
    }

    #[tokio::test]
    async fn explicit_source_language_drives_the_decision() {
        let fx = Fixture::new();
        let mut translator = MockTranslator::new();
        translator.expect_translate().never();
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .withf(|_, hint| hint == "fr")
            .returning(|_, _| Ok(transcription("Salut", "unknown")));

        let wf = workflow(&fx, working_extractor(), transcriber, translator, working_synthesizer());
        let result = wf.run_workflow(&fx.request().with_source_language("fr")).await;

        assert!(result.success);
        assert!(result.step(StageName::Translation).unwrap().skipped);
    }

    #[tokio::test]
    async fn translation_failure_falls_back_to_original_text() {
        let fx = Fixture::new();
        let mut translator = MockTranslator::new();
        translator
            .expect_translate()
            .returning(|_, _, _| Err(RevoiceError::Translation("connection refused".into())));
        let mut synthesizer = MockVoiceSynthesizer::new();
        synthesizer
            .expect_synthesize()
            .withf(|text, language, _, _| text == "Hello there" && language == "en")
            .returning(|_, _, _, dest| {
                std::fs::write(dest, b"speech").unwrap();
                Ok(())
            });

        let wf = workflow(&fx, working_extractor(), transcriber_returning("Hello there", "en"), translator, synthesizer);
        let result = wf.run_workflow(&fx.request()).await;

        assert!(result.success);
        assert!(!result.was_translated);
        assert_eq!(result.final_text, result.original_text);
        let step = result.step(StageName::Translation).unwrap();
        assert!(!step.success);
        assert!(step.error.as_deref().unwrap().contains("connection refused"));
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn empty_translation_is_a_soft_failure() {
        let fx = Fixture::new();
        let wf = workflow(
            &fx,
            working_extractor(),
            transcriber_returning("Hello there", "en"),
            translator_returning("   "),
            working_synthesizer(),
        );

        let result = wf.run_workflow(&fx.request()).await;

        assert!(result.success);
        assert!(!result.was_translated);
        assert_eq!(result.final_text.as_deref(), Some("Hello there"));
        assert!(!result.step(StageName::Translation).unwrap().success);
    }

    #[tokio::test]
    async fn unchanged_translation_is_not_counted_as_translated() {
        let fx = Fixture::new();
        let wf = workflow(
            &fx,
            working_extractor(),
            transcriber_returning("OK", "en"),
            translator_returning("OK"),
            working_synthesizer(),
        );

        let result = wf.run_workflow(&fx.request()).await;

        assert!(result.success);
        assert!(!result.was_translated);
        assert!(result.step(StageName::Translation).unwrap().success);
    }

    #[tokio::test]
    async fn extraction_failure_stops_the_pipeline() {
        let fx = Fixture::new();
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_extract_audio()
            .returning(|_, _, _, _| Err(RevoiceError::Extraction("no audio stream".into())));
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().never();
        let mut translator = MockTranslator::new();
        translator.expect_translate().never();
        let mut synthesizer = MockVoiceSynthesizer::new();
        synthesizer.expect_synthesize().never();

        let wf = workflow(&fx, extractor, transcriber, translator, synthesizer);
        let result = wf.run_workflow(&fx.request()).await;

        assert!(!result.success);
        assert_eq!(result.failed_stage, Some(StageName::AudioExtraction));
        assert!(result.error.as_deref().unwrap().contains("Audio extraction"));
        assert!(!result.retryable);
        assert!(!result.step(StageName::AudioExtraction).unwrap().success);
        assert!(result.step(StageName::Transcription).is_none());
        assert!(result.step(StageName::Translation).is_none());
        assert!(result.step(StageName::Synthesis).is_none());
    }

    #[tokio::test]
    async fn missing_video_fails_validation_without_stages() {
        let fx = Fixture::new();
        let mut extractor = MockMediaExtractor::new();
        extractor.expect_extract_audio().never();

        let wf = workflow(&fx, extractor, MockTranscriber::new(), MockTranslator::new(), MockVoiceSynthesizer::new());
        let mut request = fx.request();
        request.video_path = fx.dir.path().join("missing.mp4");

        let result = wf.run_workflow(&request).await;

        assert!(!result.success);
        assert_eq!(result.failed_stage, Some(StageName::Validation));
        assert!(result.steps.is_empty());
        assert!(result.error.as_deref().unwrap().contains("Video file not found"));
        assert!(result.finished_at.is_some());
    }

    #[tokio::test]
    async fn kept_temp_audio_is_reported() {
        let fx = Fixture::new();
        let wf = workflow(
            &fx,
            working_extractor(),
            transcriber_returning("Hello there", "en"),
            translator_returning("Bonjour"),
            working_synthesizer(),
        );

        let result = wf.run_workflow(&fx.request().with_cleanup(false)).await;

        assert!(result.success);
        let audio = result.retained_audio_path().unwrap();
        assert!(audio.is_file());
        assert!(audio.starts_with(&fx.temp_dir));
        match &result.step(StageName::AudioExtraction).unwrap().data {
            StageData::AudioExtraction { sample_rate, channels, duration_secs, .. } => {
                assert_eq!(*sample_rate, 22050);
                assert_eq!(*channels, 1);
                assert!((duration_secs.unwrap() - 0.5).abs() < 1e-3);
            }
            other => panic!("unexpected data {:?}", other),
        }
    }

    #[tokio::test]
    async fn repeated_runs_do_not_collide() {
        let fx = Fixture::new();
        let wf = workflow(
            &fx,
            working_extractor(),
            transcriber_returning("Hello there", "en"),
            translator_returning("Bonjour"),
            working_synthesizer(),
        );
        let request = fx.request().with_cleanup(false);

        let first = wf.run_workflow(&request).await;
        let second = wf.run_workflow(&request).await;

        assert!(first.success && second.success);
        assert_ne!(first.run_id, second.run_id);
        assert_ne!(first.retained_audio_path(), second.retained_audio_path());
        assert_eq!(fx.temp_files().len(), 2);

        let cleaned = wf.run_workflow(&fx.request()).await;
        assert!(cleaned.success);
        assert_eq!(fx.temp_files().len(), 2);
    }

    #[tokio::test]
    async fn synthesis_failure_leaves_no_output_behind() {
        let fx = Fixture::new();
        let mut synthesizer = MockVoiceSynthesizer::new();
        synthesizer.expect_synthesize().returning(|_, _, _, dest| {
            std::fs::write(dest, b"half a wav").unwrap();
            Err(RevoiceError::Synthesis("CUDA out of memory".into()))
        });

        let wf = workflow(
            &fx,
            working_extractor(),
            transcriber_returning("Hello there", "en"),
            translator_returning("Bonjour"),
            synthesizer,
        );
        let request = fx.request();
        let result = wf.run_workflow(&request).await;

        assert!(!result.success);
        assert_eq!(result.failed_stage, Some(StageName::Synthesis));
        assert!(result.error.as_deref().unwrap().contains("CUDA out of memory"));
        assert!(result.retryable);
        assert_eq!(result.final_text.as_deref(), Some("Bonjour"));
        assert!(!request.output_path.exists());
        let leftovers: Vec<_> = std::fs::read_dir(request.output_path.parent().unwrap()).unwrap().collect();
        assert!(leftovers.is_empty());
        assert!(fx.temp_files().is_empty());
    }

    #[tokio::test]
    async fn foreign_errors_are_reported_as_stage_errors() {
        let fx = Fixture::new();
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().returning(|_, _| {
            Err(RevoiceError::Io(std::io::Error::new(std::io::ErrorKind::Other, "model file truncated")))
        });

        let wf = workflow(&fx, working_extractor(), transcriber, MockTranslator::new(), MockVoiceSynthesizer::new());
        let result = wf.run_workflow(&fx.request()).await;

        assert_eq!(result.failed_stage, Some(StageName::Transcription));
        let error = result.error.unwrap();
        assert!(error.starts_with("Transcription failed"));
        assert!(error.contains("model file truncated"));
        assert!(fx.temp_files().is_empty());
    }

    struct PanickingTranscriber;

    #[async_trait]
    impl Transcriber for PanickingTranscriber {
        async fn transcribe(&self, _: &Path, _: &str) -> Result<Transcription> {
            panic!("engine blew up")
        }

        async fn check_availability(&self) -> Result<String> {
            Ok("panics".to_string())
        }
    }

    #[tokio::test]
    async fn panicking_engine_is_contained() {
        let fx = Fixture::new();
        let engines = Engines::new(
            Arc::new(working_extractor()),
            Arc::new(PanickingTranscriber),
            Arc::new(MockTranslator::new()),
            Arc::new(MockVoiceSynthesizer::new()),
        );
        let wf = Workflow::new(engines, fx.settings());
        let result = wf.run_workflow(&fx.request()).await;

        assert!(!result.success);
        assert_eq!(result.failed_stage, Some(StageName::Transcription));
        assert!(result.error.unwrap().contains("unexpected engine failure"));
    }

    struct StalledSynthesizer;

    #[async_trait]
    impl VoiceSynthesizer for StalledSynthesizer {
        async fn synthesize(&self, _: &str, _: &str, _: &Path, _: &Path) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }

        async fn check_availability(&self) -> Result<String> {
            Ok("stalled".to_string())
        }
    }

    #[tokio::test]
    async fn stage_timeout_is_a_stage_failure() {
        let fx = Fixture::new();
        let engines = Engines::new(
            Arc::new(working_extractor()),
            Arc::new(transcriber_returning("Hello there", "en")),
            Arc::new(translator_returning("Bonjour")),
            Arc::new(StalledSynthesizer),
        );
        let settings = WorkflowSettings {
            synthesis_timeout: Some(Duration::from_millis(50)),
            ..fx.settings()
        };
        let wf = Workflow::new(engines, settings);

        let started = Instant::now();
        let result = wf.run_workflow(&fx.request()).await;

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(result.failed_stage, Some(StageName::Synthesis));
        assert!(result.error.as_deref().unwrap().contains("timed out"));
        assert!(!result.step(StageName::Synthesis).unwrap().success);
    }

    #[tokio::test]
    async fn cancellation_is_checked_between_stages() {
        let fx = Fixture::new();
        let cancel = CancelFlag::new();
        let trigger = cancel.clone();
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().returning(move |_, _| {
            trigger.cancel();
            Ok(transcription("Hello there", "en"))
        });
        let mut translator = MockTranslator::new();
        translator.expect_translate().never();

        let wf = workflow(&fx, working_extractor(), transcriber, translator, MockVoiceSynthesizer::new())
            .with_cancel_flag(cancel);
        let result = wf.run_workflow(&fx.request()).await;

        assert!(!result.success);
        assert_eq!(result.failed_stage, Some(StageName::Translation));
        assert!(result.step(StageName::Transcription).unwrap().success);
        assert!(result.step(StageName::Translation).is_none());
        assert!(fx.temp_files().is_empty());
    }

    #[test]
    fn plan_uses_detected_language_for_auto() {
        let request = WorkflowRequest::new("v.mp4", "r.wav", "fr", "o.wav");

        let plan = TranslationPlan::decide(&request, &transcription("Hello", "en"));
        assert!(plan.needs_translation);
        assert_eq!(plan.source_language, "en");

        let plan = TranslationPlan::decide(&request, &transcription("Salut", "FR"));
        assert!(!plan.needs_translation);
    }

    #[test]
    fn plan_translates_when_source_is_unknown() {
        let request = WorkflowRequest::new("v.mp4", "r.wav", "fr", "o.wav");
        let plan = TranslationPlan::decide(&request, &transcription("???", UNKNOWN_LANGUAGE));

        assert!(plan.needs_translation);
        assert_eq!(plan.source_language, "auto");
    }

    #[test]
    fn result_serializes_with_stage_keys() {
        let request = WorkflowRequest::new("v.mp4", "r.wav", "fr", "o.wav");
        let mut result = WorkflowResult::new(Uuid::new_v4(), &request);
        result.steps.insert(
            StageName::Translation,
            StageResult::skipped(StageName::Translation, "same language".to_string()),
        );

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["steps"]["translation"]["data"]["kind"], "skipped");
        assert_eq!(json["target_language"], "fr");
    }

    #[test]
    fn request_defaults_apply_when_deserializing() {
        let request: WorkflowRequest = serde_json::from_str(
            r#"{"video_path": "a.mp4", "reference_audio_path": "r.wav",
                "target_language": "de", "output_path": "a_de.wav"}"#,
        )
        .unwrap();

        assert_eq!(request.source_language, "auto");
        assert!(request.cleanup_temp_files);
    }

    #[test]
    fn staging_file_sits_next_to_output() {
        let run_id = Uuid::new_v4();
        let staging = staging_path(Path::new("/out/speech.wav"), run_id);

        assert_eq!(staging.parent(), Some(Path::new("/out")));
        assert!(staging.to_string_lossy().ends_with(".speech.wav"));
    }
}
