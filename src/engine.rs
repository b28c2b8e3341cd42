use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::media::{MediaExtractor, MediaExtractorFactory};
use crate::synthesis::{SerializedSynthesizer, SynthesizerFactory, VoiceSynthesizer};
use crate::transcribe::{Transcriber, TranscriberFactory};
use crate::translate::{Translator, TranslatorFactory};
use crate::workflow::StageName;

/// The four stage adapters, owned by whoever drives the workflow.
///
/// Loaded engines live here and are threaded into every run, so the
/// workflow itself holds no hidden shared state.
#[derive(Clone)]
pub struct Engines {
    pub extractor: Arc<dyn MediaExtractor>,
    pub transcriber: Arc<dyn Transcriber>,
    pub translator: Arc<dyn Translator>,
    pub synthesizer: Arc<dyn VoiceSynthesizer>,
}

impl Engines {
    pub fn new(
        extractor: Arc<dyn MediaExtractor>,
        transcriber: Arc<dyn Transcriber>,
        translator: Arc<dyn Translator>,
        synthesizer: Arc<dyn VoiceSynthesizer>,
    ) -> Self {
        Self {
            extractor,
            transcriber,
            translator,
            synthesizer,
        }
    }

    /// Build the configured engines
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            extractor: Arc::from(MediaExtractorFactory::create_extractor(config.media.clone())),
            transcriber: Arc::from(TranscriberFactory::create_transcriber(config.transcriber.clone())),
            translator: Arc::from(TranslatorFactory::create_translator(config.translate.clone())?),
            synthesizer: Arc::from(SynthesizerFactory::create_synthesizer(config.synthesis.clone())),
        })
    }

    /// Route every synthesis call through one lock.
    pub fn with_serialized_synthesis(mut self) -> Self {
        self.synthesizer = Arc::new(SerializedSynthesizer::new(self.synthesizer));
        self
    }

    /// Probe every adapter, in stage order.
    pub async fn check_availability(&self) -> Vec<(StageName, Result<String>)> {
        let checks = vec![
            (StageName::AudioExtraction, self.extractor.check_availability().await),
            (StageName::Transcription, self.transcriber.check_availability().await),
            (StageName::Translation, self.translator.check_availability().await),
            (StageName::Synthesis, self.synthesizer.check_availability().await),
        ];

        for (stage, outcome) in &checks {
            match outcome {
                Ok(version) => info!("{} engine available: {}", stage, version),
                Err(e) => warn!("{} engine unavailable: {}", stage, e),
            }
        }
        checks
    }
}
