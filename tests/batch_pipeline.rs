//! End-to-end batch runs over a scripted acquirer in a temp directory.

use std::collections::HashMap;
use std::path::Path;

use tempfile::tempdir;

use keygram::acquire::{Acquire, AcquireError};
use keygram::config::PipelineConfig;
use keygram::pipeline::{Disposition, DispositionPrompt, Pipeline};
use keygram::spectrogram::STFT_N_FFT;
use keygram::tables::{self, PendingEntry};
use keygram::waveform::{ChannelPolicy, Waveform};

/// Per-reference script: either a waveform length in samples or a failure.
enum Script {
    Audio(usize),
    Fail,
}

struct ScriptedAcquirer {
    scripts: HashMap<String, Script>,
}

impl Acquire for ScriptedAcquirer {
    fn acquire(&mut self, reference: &str) -> Result<Waveform, AcquireError> {
        match self.scripts.get(reference) {
            Some(Script::Audio(len)) => Ok(Waveform {
                samples: (0..*len * 2)
                    .map(|i| (((i / 2) % 200) as i16 - 100) * 300)
                    .collect(),
                channels: 2,
                sample_rate: 44_100,
            }),
            Some(Script::Fail) | None => Err(AcquireError::Unreachable {
                reference: reference.to_string(),
                detail: "simulated outage".into(),
            }),
        }
    }
}

struct RecordingPrompt {
    answer: Disposition,
    asked_with: Option<usize>,
}

impl DispositionPrompt for RecordingPrompt {
    fn resolve(&mut self, remaining: usize) -> Disposition {
        self.asked_with = Some(remaining);
        self.answer
    }
}

fn config_in(root: &Path) -> PipelineConfig {
    PipelineConfig {
        pending_table_path: root.join("data/unprocessed-data.csv"),
        output_table_path: root.join("data/dataset/music-data.csv"),
        artifact_dir: root.join("data/dataset/spectrograms"),
        transient_dir: root.join("data/temp_data"),
        log_dir: root.join("data/logs"),
        channel_policy: ChannelPolicy::First,
    }
}

fn seed_pending(config: &PipelineConfig, rows: &[(&str, &str)]) {
    let entries: Vec<PendingEntry> = rows
        .iter()
        .map(|(reference, label)| PendingEntry {
            reference: reference.to_string(),
            label: label.to_string(),
        })
        .collect();
    tables::save_pending(&config.pending_table_path, &entries).unwrap();
}

#[test]
fn mixed_batch_commits_successes_and_retains_failures() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    seed_pending(
        &config,
        &[("urlA", "Cmaj"), ("urlB", "Gmin"), ("urlC", "Dmaj")],
    );

    let acquirer = ScriptedAcquirer {
        scripts: HashMap::from([
            ("urlA".to_string(), Script::Audio(8 * STFT_N_FFT)),
            ("urlB".to_string(), Script::Fail),
            ("urlC".to_string(), Script::Audio(8 * STFT_N_FFT)),
        ]),
    };
    let prompt = RecordingPrompt {
        answer: Disposition::Retain,
        asked_with: None,
    };
    let mut pipeline = Pipeline::new(config.clone(), acquirer, prompt);
    let summary = pipeline.run().unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.remaining, 1);

    // The failed entry keeps its original (reference, label) pair.
    let pending = tables::load_pending(&config.pending_table_path).unwrap();
    assert_eq!(
        pending,
        vec![PendingEntry {
            reference: "urlB".into(),
            label: "Gmin".into(),
        }]
    );

    // Output rows appear in processing order with existing artifacts.
    let output = tables::load_output(&config.output_table_path).unwrap();
    assert_eq!(output.len(), 2);
    assert_eq!(output[0].label, "Cmaj");
    assert_eq!(output[1].label, "Dmaj");
    for (idx, row) in output.iter().enumerate() {
        assert!(row.artifact_path.ends_with(&format!("sp_{idx}.png")));
        assert!(Path::new(&row.artifact_path).exists());
    }

    // No transient `.tmp` siblings survive the commit.
    assert!(!config.pending_table_path.with_extension("tmp").exists());
    assert!(!config.output_table_path.with_extension("tmp").exists());
}

#[test]
fn too_short_audio_counts_as_extraction_failure() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    seed_pending(&config, &[("short", "Amin")]);

    let acquirer = ScriptedAcquirer {
        scripts: HashMap::from([("short".to_string(), Script::Audio(STFT_N_FFT - 1))]),
    };
    let prompt = RecordingPrompt {
        answer: Disposition::Retain,
        asked_with: None,
    };
    let mut pipeline = Pipeline::new(config.clone(), acquirer, prompt);
    let summary = pipeline.run().unwrap();

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.remaining, 1);
    assert!(tables::load_output(&config.output_table_path)
        .unwrap()
        .is_empty());
    // No artifact may exist for a failed entry.
    let artifacts = std::fs::read_dir(&config.artifact_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(artifacts, 0);
}

#[test]
fn repeated_runs_drain_the_queue_as_entries_recover() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    seed_pending(&config, &[("flaky", "Bmin"), ("solid", "Emaj")]);

    // First run: "flaky" is down.
    let mut pipeline = Pipeline::new(
        config.clone(),
        ScriptedAcquirer {
            scripts: HashMap::from([("solid".to_string(), Script::Audio(4 * STFT_N_FFT))]),
        },
        RecordingPrompt {
            answer: Disposition::Retain,
            asked_with: None,
        },
    );
    let first = pipeline.run().unwrap();
    assert_eq!(first.processed, 1);
    assert_eq!(first.remaining, 1);

    // Second run: "flaky" recovered; numbering continues from row count.
    let mut pipeline = Pipeline::new(
        config.clone(),
        ScriptedAcquirer {
            scripts: HashMap::from([("flaky".to_string(), Script::Audio(4 * STFT_N_FFT))]),
        },
        RecordingPrompt {
            answer: Disposition::Retain,
            asked_with: None,
        },
    );
    let second = pipeline.run().unwrap();
    assert_eq!(second.processed, 1);
    assert_eq!(second.remaining, 0);

    let pending = tables::load_pending(&config.pending_table_path).unwrap();
    assert!(pending.is_empty());
    let output = tables::load_output(&config.output_table_path).unwrap();
    assert_eq!(output.len(), 2);
    assert!(output[0].artifact_path.ends_with("sp_0.png"));
    assert!(output[1].artifact_path.ends_with("sp_1.png"));
    assert_eq!(output[1].label, "Bmin");
}

#[test]
fn unreadable_pending_table_aborts_before_touching_durable_state() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());

    // Seed a prior output table, then make the pending table unreadable by
    // putting a directory where the file should be.
    let prior = vec![keygram::tables::DatasetRow {
        artifact_path: "old/sp_0.png".into(),
        label: "Cmaj".into(),
    }];
    tables::save_output(&config.output_table_path, &prior).unwrap();
    std::fs::create_dir_all(&config.pending_table_path).unwrap();

    let mut pipeline = Pipeline::new(
        config.clone(),
        ScriptedAcquirer {
            scripts: HashMap::new(),
        },
        RecordingPrompt {
            answer: Disposition::Discard,
            asked_with: None,
        },
    );
    assert!(pipeline.run().is_err());

    // The prior output table is untouched.
    let output = tables::load_output(&config.output_table_path).unwrap();
    assert_eq!(output, prior);
}
