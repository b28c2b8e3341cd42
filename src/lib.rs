//! Revoice - Video to Voice Pipeline
//!
//! Re-voices the speech of a video in another language: the audio track is
//! extracted with ffmpeg, transcribed with whisper, translated through an
//! LLM or translation server and spoken again with a voice-cloning TTS
//! engine using a reference sample of the target voice.

pub mod audio;
pub mod batch;
pub mod cli;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod language;
pub mod media;
pub mod synthesis;
pub mod transcribe;
pub mod translate;
pub mod workflow;
