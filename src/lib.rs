//! Library exports for the keygram batch pipeline.
/// Media acquisition via external fetch and decode tools.
pub mod acquire;
/// Spectrogram rendering and artifact storage.
pub mod artifact;
/// Pipeline configuration.
pub mod config;
/// Logging setup.
pub mod logging;
/// Batch orchestration.
pub mod pipeline;
/// Log-mel spectrogram extraction.
pub mod spectrogram;
/// Durable pending and output tables.
pub mod tables;
/// Decoded waveform types and mixdown helpers.
pub mod waveform;
