//! Audio metadata extraction via ffprobe.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Errors that can occur while probing a file.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("ffprobe failed: {0}")]
    ProbeFailed(String),

    #[error("invalid probe output: {0}")]
    InvalidOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio metadata attached to an imported asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioMetadata {
    /// Duration in milliseconds.
    pub duration_ms: i64,
    /// Sample rate in Hz.
    pub sample_rate: Option<i32>,
    /// Bitrate in kbps.
    pub bit_rate: Option<i32>,
    /// Number of channels.
    pub channels: Option<i32>,
    /// Container/format name (e.g. "wav", "mp3").
    pub format: String,
}

/// Extracts audio metadata from a local file.
///
/// Extraction is best-effort: the pipeline logs failures and registers the
/// asset without audio metadata.
#[async_trait]
pub trait MetadataProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<AudioMetadata, ExtractError>;
}

/// ffprobe JSON output structure.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: String,
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    sample_rate: Option<String>,
    channels: Option<i32>,
    bit_rate: Option<String>,
}

/// Probe implementation shelling out to ffprobe.
pub struct FfprobeMetadataProbe;

#[async_trait]
impl MetadataProbe for FfprobeMetadataProbe {
    async fn probe(&self, path: &Path) -> Result<AudioMetadata, ExtractError> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::ProbeFailed(stderr.to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_probe_output(&stdout)
    }
}

fn parse_probe_output(raw: &str) -> Result<AudioMetadata, ExtractError> {
    let probe: FfprobeOutput = serde_json::from_str(raw)
        .map_err(|e| ExtractError::InvalidOutput(format!("JSON parse error: {}", e)))?;

    let audio_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "audio")
        .ok_or_else(|| ExtractError::InvalidOutput("no audio stream found".to_string()))?;

    // ffprobe reports duration in seconds
    let duration_secs: f64 = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse().ok())
        .unwrap_or(0.0);
    let duration_ms = (duration_secs * 1000.0) as i64;

    // Prefer the stream bitrate, fall back to the format bitrate
    let bit_rate = audio_stream
        .bit_rate
        .as_ref()
        .or(probe.format.bit_rate.as_ref())
        .and_then(|b| b.parse::<i64>().ok())
        .map(|b| (b / 1000) as i32);

    let sample_rate = audio_stream
        .sample_rate
        .as_ref()
        .and_then(|sr| sr.parse().ok());

    Ok(AudioMetadata {
        duration_ms,
        sample_rate,
        bit_rate,
        channels: audio_stream.channels,
        format: probe.format.format_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAV_PROBE_JSON: &str = r#"{
        "format": {
            "format_name": "wav",
            "duration": "12.480000",
            "bit_rate": "1411200"
        },
        "streams": [
            {
                "codec_type": "audio",
                "codec_name": "pcm_s16le",
                "sample_rate": "44100",
                "channels": 2
            }
        ]
    }"#;

    #[test]
    fn test_parse_probe_output() {
        let meta = parse_probe_output(WAV_PROBE_JSON).unwrap();
        assert_eq!(meta.duration_ms, 12480);
        assert_eq!(meta.sample_rate, Some(44100));
        assert_eq!(meta.channels, Some(2));
        // Stream has no bitrate, format bitrate is used
        assert_eq!(meta.bit_rate, Some(1411));
        assert_eq!(meta.format, "wav");
    }

    #[test]
    fn test_parse_probe_output_no_audio_stream() {
        let raw = r#"{
            "format": { "format_name": "pdf" },
            "streams": [ { "codec_type": "data" } ]
        }"#;
        let err = parse_probe_output(raw).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidOutput(_)));
    }

    #[test]
    fn test_parse_probe_output_garbage() {
        assert!(matches!(
            parse_probe_output("not json").unwrap_err(),
            ExtractError::InvalidOutput(_)
        ));
    }
}
