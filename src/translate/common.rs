use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{Result, RevoiceError};
use crate::language;
use super::Translation;

const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

pub fn build_http_client(timeout_secs: u64) -> Result<Client> {
    let mut builder = Client::builder().user_agent(concat!("revoice/", env!("CARGO_PKG_VERSION")));
    if timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(timeout_secs));
    }
    Ok(builder.build()?)
}

/// Run `op` until it succeeds or `max_retries` extra attempts are spent.
pub async fn with_retries<T, F, Fut>(max_retries: u32, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_retries => {
                attempt += 1;
                warn!("{} failed (attempt {}/{}): {}", what, attempt, max_retries + 1, e);
                tokio::time::sleep(retry_delay(attempt)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Exponential backoff for the given 1-based retry, capped at `RETRY_MAX_DELAY`.
fn retry_delay(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    RETRY_BASE_DELAY.saturating_mul(factor).min(RETRY_MAX_DELAY)
}

/// Split text into chunks of at most `max_chars` characters on sentence ends.
///
/// A single sentence longer than the limit is cut on whitespace, or on a
/// character boundary when it has none.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        for piece in hard_split(&sentence, max_chars) {
            let joined_len = current.chars().count() + piece.chars().count() + 1;
            if !current.is_empty() && joined_len > max_chars {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&piece);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?' | '。' | '！' | '？') {
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            current.clear();
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current.trim().to_string());
    }
    sentences
}

fn hard_split(sentence: &str, max_chars: usize) -> Vec<String> {
    if sentence.chars().count() <= max_chars {
        return vec![sentence.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in sentence.split_whitespace() {
        if word.chars().count() > max_chars {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = word.chars().collect();
            pieces.extend(chars.chunks(max_chars).map(|c| c.iter().collect::<String>()));
            continue;
        }
        if !current.is_empty() && current.chars().count() + word.chars().count() + 1 > max_chars {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Confidence estimate for services that report none.
pub fn heuristic_confidence(original: &str, translated: &str) -> f64 {
    let original_len = original.chars().count();
    let mut confidence: f64 = 0.8;

    if original_len < 10 {
        confidence -= 0.2;
    }
    if original.trim() == translated.trim() {
        confidence -= 0.3;
    }
    if original_len > 1000 {
        confidence -= 0.1;
    }
    confidence.clamp(0.0, 1.0)
}

/// Merge per-chunk translations into one result.
pub fn merge_translations(parts: Vec<Translation>, requested_source: &str) -> Result<Translation> {
    if parts.is_empty() {
        return Err(RevoiceError::Translation("Nothing to translate".to_string()));
    }

    // a blank chunk would silently drop part of the content
    if let Some(index) = parts.iter().position(|p| p.translated_text.trim().is_empty()) {
        return Err(RevoiceError::Translation(format!(
            "Empty translation for chunk {} of {}",
            index + 1,
            parts.len()
        )));
    }

    let detected = parts
        .iter()
        .map(|p| p.detected_source_language.as_str())
        .find(|l| !language::is_auto(l) && *l != crate::transcribe::UNKNOWN_LANGUAGE)
        .map(str::to_string)
        .unwrap_or_else(|| requested_source.to_string());

    let confidences: Vec<f64> = parts.iter().filter_map(|p| p.confidence).collect();
    let confidence = (!confidences.is_empty())
        .then(|| confidences.iter().sum::<f64>() / confidences.len() as f64);

    let translated_text = parts
        .into_iter()
        .map(|p| p.translated_text.trim().to_string())
        .collect::<Vec<_>>()
        .join(" ");

    Ok(Translation {
        translated_text,
        detected_source_language: detected,
        confidence,
    })
}

/// Strip the chatter LLMs wrap around a translation.
pub fn clean_translation_response(response: &str) -> String {
    let lines: Vec<&str> = response.lines().collect();

    for &line in &lines {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with("Here is")
            || trimmed.starts_with("Here are")
            || trimmed.starts_with("Option")
            || trimmed.starts_with("**Option")
            || trimmed.starts_with("Translation:")
            || trimmed.starts_with("- ")
            || trimmed.starts_with("* ")
        {
            continue;
        }

        if trimmed.starts_with("**") && trimmed.ends_with("**") {
            continue;
        }

        return trimmed.trim_matches('"').to_string();
    }

    response.trim().to_string()
}
