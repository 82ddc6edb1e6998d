//! Spectrogram rendering and artifact storage.
//!
//! Each successful entry produces exactly one PNG in the append-only
//! artifact directory. Rendering policy, fixed project-wide: width is the
//! frame count, height is the 64 mel bands, grayscale min-max normalized
//! over the whole array, mel band 0 on the bottom row. Trimming or padding
//! to a training shape is a consumer concern.

use std::fs;
use std::path::{Path, PathBuf};

use image::GrayImage;
use thiserror::Error;

use crate::spectrogram::Spectrogram;

/// Identifier prefix for stored artifacts.
pub const ARTIFACT_PREFIX: &str = "sp_";

/// A persisted artifact: its stable identifier and on-disk location.
///
/// The identifier is derived from the output-table row count at store time,
/// so the storage path exists before any table row referencing it is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    /// Stable identifier, `sp_{index}`.
    pub identifier: String,
    /// Path of the written PNG.
    pub storage_path: PathBuf,
}

/// Errors that may occur while storing an artifact. All of them are
/// entry-local.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A file with the assigned identifier already exists.
    #[error("Artifact {path} already exists")]
    Collision {
        /// The colliding path.
        path: PathBuf,
    },
    /// The artifact directory could not be created.
    #[error("Failed to create artifact directory {path}: {source}")]
    CreateDir {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The PNG could not be encoded or written.
    #[error("Failed to write artifact {path}: {source}")]
    Write {
        /// Offending path.
        path: PathBuf,
        /// Underlying image error.
        source: image::ImageError,
    },
    /// The finished PNG could not be moved into place.
    #[error("Failed to finalize artifact {path}: {source}")]
    Finalize {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Write-once store over a single artifact directory.
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Build a store rooted at `dir`. The directory is created lazily on
    /// first store.
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Render `spectrogram` and persist it under the identifier for
    /// `index`, which must be the output-table row count at call time.
    pub fn store(
        &self,
        spectrogram: &Spectrogram,
        index: usize,
    ) -> Result<ArtifactRecord, StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;
        let identifier = format!("{ARTIFACT_PREFIX}{index}");
        let path = self.dir.join(format!("{identifier}.png"));
        if path.exists() {
            return Err(StoreError::Collision { path });
        }
        // Stage through a `.tmp` sibling so a failed encode never leaves a
        // file at the final path; a stray partial there would collide with
        // this index on every later attempt.
        let staged = path.with_extension("png.tmp");
        if let Err(source) = render(spectrogram).save_with_format(&staged, image::ImageFormat::Png)
        {
            let _ = fs::remove_file(&staged);
            return Err(StoreError::Write { path, source });
        }
        if let Err(source) = fs::rename(&staged, &path) {
            let _ = fs::remove_file(&staged);
            return Err(StoreError::Finalize { path, source });
        }
        Ok(ArtifactRecord {
            identifier,
            storage_path: path,
        })
    }
}

fn render(spectrogram: &Spectrogram) -> GrayImage {
    let width = spectrogram.frames() as u32;
    let height = spectrogram.mel_bands() as u32;
    let values = spectrogram.values();
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = (max - min).max(f32::MIN_POSITIVE);
    GrayImage::from_fn(width, height, |x, y| {
        let band = (height - 1 - y) as usize;
        let v = spectrogram.value(band, x as usize);
        let level = ((v - min) / range * 255.0).round().clamp(0.0, 255.0) as u8;
        image::Luma([level])
    })
}
