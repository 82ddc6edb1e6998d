//! Media acquisition via external fetch and decode tools.
//!
//! The production acquirer shells out to `yt-dlp` for the best available
//! audio stream and to `ffmpeg` for decoding to stereo 44.1 kHz s16 PCM,
//! then reads the result with `hound`. Every call works through a fresh
//! pair of transient files in the configured scratch directory, removed on
//! every exit path; a stale sweep at construction clears leftovers from a
//! crashed run so they can never be mistaken for fresh input.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, warn};

use crate::waveform::Waveform;

const DOWNLOAD_STEM: &str = "download";
const DECODED_FILE_NAME: &str = "decoded.wav";

/// Sample rate the decode step targets.
pub const TARGET_SAMPLE_RATE: u32 = 44_100;
/// Channel count the decode step targets.
pub const TARGET_CHANNELS: u16 = 2;

/// Failure reasons for one acquisition. All of them are entry-local; no
/// retries happen at this layer.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// The reference could not be fetched at all.
    #[error("Failed to fetch {reference}: {detail}")]
    Unreachable {
        /// The failing reference.
        reference: String,
        /// Tool diagnostic, last stderr line when available.
        detail: String,
    },
    /// The fetch completed but produced no usable audio stream.
    #[error("No usable audio stream for {reference}")]
    UnsupportedFormat {
        /// The failing reference.
        reference: String,
    },
    /// The fetched media could not be decoded to the target PCM format.
    #[error("Failed to decode {reference}: {detail}")]
    Decode {
        /// The failing reference.
        reference: String,
        /// Tool or reader diagnostic.
        detail: String,
    },
}

/// Seam between the orchestrator and the fetch/decode mechanics. Tests
/// drive the pipeline through scripted implementations.
pub trait Acquire {
    /// Resolve `reference` to a decoded waveform or an entry-local failure.
    fn acquire(&mut self, reference: &str) -> Result<Waveform, AcquireError>;
}

/// Production acquirer wrapping `yt-dlp` and `ffmpeg`.
pub struct MediaAcquirer {
    transient_dir: PathBuf,
}

impl MediaAcquirer {
    /// Build an acquirer over `transient_dir`, creating it if needed and
    /// sweeping any stale transient files from a previous run.
    pub fn new(transient_dir: &Path) -> std::io::Result<Self> {
        fs::create_dir_all(transient_dir)?;
        let swept = clear_transients(transient_dir);
        if swept > 0 {
            warn!(swept, dir = %transient_dir.display(), "Removed stale transient files");
        }
        Ok(Self {
            transient_dir: transient_dir.to_path_buf(),
        })
    }
}

impl Acquire for MediaAcquirer {
    fn acquire(&mut self, reference: &str) -> Result<Waveform, AcquireError> {
        let _guard = TransientGuard {
            dir: self.transient_dir.clone(),
        };
        let downloaded = fetch(reference, &self.transient_dir)?;
        let wav_path = decode(reference, &downloaded, &self.transient_dir)?;
        let waveform = read_waveform(reference, &wav_path)?;
        debug!(
            reference,
            frames = waveform.frame_count(),
            seconds = waveform.duration_seconds(),
            "Acquired waveform"
        );
        Ok(waveform)
    }
}

/// Removes all transient files when an acquisition ends, successfully or not.
struct TransientGuard {
    dir: PathBuf,
}

impl Drop for TransientGuard {
    fn drop(&mut self) {
        clear_transients(&self.dir);
    }
}

/// Remove every regular file in the transient directory. The directory is
/// exclusively ours, so anything in it is acquisition residue.
fn clear_transients(dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) => warn!(path = %path.display(), "Failed to remove transient: {err}"),
            }
        }
    }
    removed
}

fn fetch(reference: &str, transient_dir: &Path) -> Result<PathBuf, AcquireError> {
    let template = transient_dir.join(format!("{DOWNLOAD_STEM}.%(ext)s"));
    let output = Command::new("yt-dlp")
        .arg("--quiet")
        .arg("--no-playlist")
        .arg("-f")
        .arg("bestaudio/best")
        .arg("-o")
        .arg(&template)
        .arg(reference)
        .output()
        .map_err(|err| AcquireError::Unreachable {
            reference: reference.to_string(),
            detail: format!("yt-dlp: {err}"),
        })?;
    if !output.status.success() {
        return Err(AcquireError::Unreachable {
            reference: reference.to_string(),
            detail: stderr_tail(&output.stderr),
        });
    }
    find_download(transient_dir).ok_or_else(|| AcquireError::UnsupportedFormat {
        reference: reference.to_string(),
    })
}

/// Locate the downloaded file; its extension depends on the stream picked.
fn find_download(transient_dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(transient_dir).ok()?;
    entries
        .flatten()
        .map(|entry| entry.path())
        .find(|path| {
            path.is_file() && path.file_stem().and_then(|s| s.to_str()) == Some(DOWNLOAD_STEM)
        })
}

fn decode(
    reference: &str,
    downloaded: &Path,
    transient_dir: &Path,
) -> Result<PathBuf, AcquireError> {
    let wav_path = transient_dir.join(DECODED_FILE_NAME);
    let output = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(downloaded)
        .arg("-vn")
        .arg("-acodec")
        .arg("pcm_s16le")
        .arg("-ar")
        .arg(TARGET_SAMPLE_RATE.to_string())
        .arg("-ac")
        .arg(TARGET_CHANNELS.to_string())
        .arg(&wav_path)
        .output()
        .map_err(|err| AcquireError::Decode {
            reference: reference.to_string(),
            detail: format!("ffmpeg: {err}"),
        })?;
    if !output.status.success() {
        return Err(AcquireError::Decode {
            reference: reference.to_string(),
            detail: stderr_tail(&output.stderr),
        });
    }
    Ok(wav_path)
}

fn read_waveform(reference: &str, wav_path: &Path) -> Result<Waveform, AcquireError> {
    let decode_err = |detail: String| AcquireError::Decode {
        reference: reference.to_string(),
        detail,
    };
    let mut reader =
        hound::WavReader::open(wav_path).map_err(|err| decode_err(format!("invalid wav: {err}")))?;
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(decode_err(format!(
            "unexpected wav format: {:?} {} bits",
            spec.sample_format, spec.bits_per_sample
        )));
    }
    let samples = reader
        .samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| decode_err(format!("sample error: {err}")))?;
    Ok(Waveform {
        samples,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
    })
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    text.lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no diagnostic output")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn constructor_sweeps_stale_transients() {
        let dir = tempdir().unwrap();
        let stale = dir.path().join("download.webm");
        fs::write(&stale, b"leftover").unwrap();
        MediaAcquirer::new(dir.path()).unwrap();
        assert!(!stale.exists());
    }

    #[test]
    fn guard_clears_files_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DECODED_FILE_NAME);
        fs::write(&path, b"temp").unwrap();
        drop(TransientGuard {
            dir: dir.path().to_path_buf(),
        });
        assert!(!path.exists());
    }

    #[test]
    fn find_download_skips_the_decoded_wav() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(DECODED_FILE_NAME), b"wav").unwrap();
        assert!(find_download(dir.path()).is_none());
        let media = dir.path().join("download.m4a");
        fs::write(&media, b"aac").unwrap();
        assert_eq!(find_download(dir.path()), Some(media));
    }

    #[test]
    fn read_waveform_round_trips_s16_stereo() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DECODED_FILE_NAME);
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: TARGET_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for value in [0_i16, 100, -100, 32_000] {
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();

        let wave = read_waveform("test", &path).unwrap();
        assert_eq!(wave.channels, 2);
        assert_eq!(wave.sample_rate, TARGET_SAMPLE_RATE);
        assert_eq!(wave.samples, vec![0, 100, -100, 32_000]);
    }

    #[test]
    fn read_waveform_rejects_float_wavs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DECODED_FILE_NAME);
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: TARGET_SAMPLE_RATE,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0.5_f32).unwrap();
        writer.finalize().unwrap();

        assert!(matches!(
            read_waveform("test", &path),
            Err(AcquireError::Decode { .. })
        ));
    }
}
