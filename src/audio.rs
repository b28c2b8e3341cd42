use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, RevoiceError};

/// Header facts about a WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_secs: f64,
}

/// Read the WAV header of `path` without decoding samples.
pub fn probe_wav<P: AsRef<Path>>(path: P) -> Result<WavInfo> {
    let path = path.as_ref();
    let reader = hound::WavReader::open(path)
        .map_err(|e| RevoiceError::Audio(format!("{}: {}", path.display(), e)))?;

    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(RevoiceError::Audio(format!("{}: zero sample rate", path.display())));
    }

    // duration() counts frames, i.e. samples per channel
    let duration_secs = reader.duration() as f64 / spec.sample_rate as f64;

    Ok(WavInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        duration_secs,
    })
}
