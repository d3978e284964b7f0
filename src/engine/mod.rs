pub mod report;

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::error::{ErrorScope, Result, XocopyError};
use crate::hash::hash_file_with_progress;
use crate::ledger::{ArtifactCopyRecord, ArtifactKey, Ledger};
use crate::locate::{locate, select_artifacts, Artifact, Selection};
use crate::media::SpaceProbe;
use crate::mount::{MountGuard, VolumeMounter};
use crate::transfer::{remove_stale_temp_files, TransferStrategy};
use crate::types::BackupMode;
use crate::util::paths::ensure_dir;
use crate::util::progress::byte_bar;

pub use report::{JobReport, RunSummary};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub source_root: PathBuf,
    pub destination_root: PathBuf,
    pub mode: BackupMode,
    pub strategy: TransferStrategy,
    pub chunk_size: usize,
    pub progress: bool,
}

pub struct EncryptedVolume<'a> {
    pub mounter: &'a dyn VolumeMounter,
    pub cipher_dir: PathBuf,
    pub secret: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArtifactOutcome {
    Copied,
    UpToDate,
}

pub struct CopyEngine<'a> {
    config: EngineConfig,
    ledger: &'a Ledger,
    space: &'a dyn SpaceProbe,
    volume: Option<EncryptedVolume<'a>>,
}

impl<'a> CopyEngine<'a> {
    pub fn new(config: EngineConfig, ledger: &'a Ledger, space: &'a dyn SpaceProbe) -> Self {
        Self {
            config,
            ledger,
            space,
            volume: None,
        }
    }

    pub fn with_volume(mut self, volume: EncryptedVolume<'a>) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn copy_job_artifacts(&self, job_id: &str) -> Result<JobReport> {
        let mut report = JobReport::new(job_id);
        ensure_dir(&self.config.destination_root)?;

        let descriptors = locate(&self.config.source_root, job_id);
        report.descriptors = descriptors.len();
        if descriptors.is_empty() {
            info!("nothing to copy for job {}", job_id);
            return Ok(report);
        }

        for desc in &descriptors {
            let artifacts = match select_artifacts(desc, self.config.mode) {
                Selection::Artifacts(artifacts) => artifacts,
                Selection::Incremental => {
                    info!("{} is an incremental chain member, skipping", desc.path.display());
                    report.skipped += 1;
                    continue;
                }
                Selection::ModeMismatch(mode) => {
                    info!(
                        "{} is not {} type (found {}), skipping",
                        desc.path.display(),
                        self.config.mode,
                        mode
                    );
                    report.skipped += 1;
                    continue;
                }
                Selection::Unusable(reason) => {
                    warn!("skip descriptor {}: {}", desc.path.display(), reason);
                    report.skipped += 1;
                    continue;
                }
            };
            for artifact in &artifacts {
                match self.copy_artifact(job_id, artifact) {
                    Ok(ArtifactOutcome::Copied) => report.copied += 1,
                    Ok(ArtifactOutcome::UpToDate) => report.up_to_date += 1,
                    Err(err) => match err.scope() {
                        ErrorScope::Run => return Err(err),
                        ErrorScope::Job => {
                            error!("job {} aborted: {}", job_id, err);
                            report.aborted = Some(err.to_string());
                            return Ok(report);
                        }
                        ErrorScope::Artifact => {
                            error!("{}: {}", artifact.filename, err);
                            report.failed += 1;
                        }
                    },
                }
            }
        }
        Ok(report)
    }

    fn copy_artifact(&self, job_id: &str, artifact: &Artifact) -> Result<ArtifactOutcome> {
        let destination = self.config.destination_root.join(&artifact.relative);
        let key = ArtifactKey::new(job_id, &artifact.filename, &artifact.source, &destination);

        let source_len = fs::metadata(&artifact.source)
            .map_err(|e| {
                XocopyError::message(format!("stat {}: {}", artifact.source.display(), e))
            })?
            .len();

        if let Some(existing) = self.ledger.lookup_artifact(&key)? {
            let current = self.hash_source(artifact, source_len, "Checking")?;
            if current == existing.content_hash {
                info!("{} already up to date", artifact.filename);
                return Ok(ArtifactOutcome::UpToDate);
            }
            info!("{} has been modified, copying again", artifact.filename);
        } else {
            info!("copying {}", artifact.filename);
        }

        let prepared = self.config.strategy.prepare()?;
        let _volume = match &self.volume {
            Some(volume) => Some(MountGuard::acquire(
                volume.mounter,
                &volume.cipher_dir,
                &self.config.destination_root,
                &volume.secret,
            )?),
            None => None,
        };

        let dir = destination
            .parent()
            .unwrap_or(self.config.destination_root.as_path());
        ensure_dir(dir)?;
        remove_stale_temp_files(dir)?;
        let needed = prepared.output_len(source_len, self.config.chunk_size);
        let available = self.space.available_bytes(dir)?;
        if available < needed {
            return Err(XocopyError::InsufficientSpace {
                path: dir.to_path_buf(),
                needed,
                available,
            });
        }

        let bar = byte_bar(
            source_len,
            &format!("Copying ({})", artifact.filename),
            self.config.progress,
        );
        prepared.write_file(&artifact.source, &destination, self.config.chunk_size, &bar)?;
        bar.finish_and_clear();

        let hash = self.hash_source(artifact, source_len, "Hashing")?;
        let record = ArtifactCopyRecord::new(key, hash, prepared.key().map(str::to_string));
        self.ledger.append_artifact(&record)?;
        info!("{} copied to {}", artifact.filename, destination.display());
        Ok(ArtifactOutcome::Copied)
    }

    fn hash_source(&self, artifact: &Artifact, len: u64, label: &str) -> Result<String> {
        let bar = byte_bar(
            len,
            &format!("{} ({})", label, artifact.filename),
            self.config.progress,
        );
        let hash = hash_file_with_progress(&artifact.source, |done| bar.set_position(done))
            .map_err(|e| {
                XocopyError::message(format!("hash {}: {}", artifact.source.display(), e))
            })?;
        bar.finish_and_clear();
        Ok(hash)
    }

    pub fn run_pending(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut seen = HashSet::new();
        let pending = self.ledger.pending_jobs()?;
        for job in pending {
            if !seen.insert(job.job_id.clone()) {
                continue;
            }
            info!("processing job {} ({})", job.job_id, job.job_name);
            let report = self.copy_job_artifacts(&job.job_id)?;
            if report.is_success() {
                self.ledger.mark_copied(&job.job_id)?;
            } else {
                warn!("job {} left pending", job.job_id);
            }
            summary.add(&report);
        }
        summary.log();
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MountError;
    use crate::ledger::NewJob;
    use chrono::Local;
    use serde_json::json;
    use std::cell::Cell;
    use std::path::Path;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    struct FixedSpace {
        bytes: u64,
        calls: Cell<usize>,
    }

    impl FixedSpace {
        fn new(bytes: u64) -> Self {
            Self {
                bytes,
                calls: Cell::new(0),
            }
        }
    }

    impl SpaceProbe for FixedSpace {
        fn available_bytes(&self, _path: &Path) -> Result<u64> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.bytes)
        }
    }

    #[derive(Default)]
    struct CountingMounter {
        mounts: Cell<usize>,
        unmounts: Cell<usize>,
        missing_helper: bool,
        broken: bool,
    }

    impl VolumeMounter for CountingMounter {
        fn mount(&self, _source: &Path, _target: &Path, secret: &str) -> Result<()> {
            if self.missing_helper {
                return Err(MountError::HelperMissing(PathBuf::from("/bin/gocryptfs")).into());
            }
            if self.broken {
                return Err(MountError::MountFailure("bad password".to_string()).into());
            }
            assert_eq!(secret, "pw");
            self.mounts.set(self.mounts.get() + 1);
            Ok(())
        }

        fn unmount(&self, _target: &Path) -> Result<()> {
            self.unmounts.set(self.unmounts.get() + 1);
            Ok(())
        }
    }

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let fixture = Self {
                dir: TempDir::new().expect("tempdir"),
            };
            fs::create_dir_all(fixture.source()).unwrap();
            fixture
        }

        fn source(&self) -> PathBuf {
            self.dir.path().join("src")
        }

        fn destination(&self) -> PathBuf {
            self.dir.path().join("dst")
        }

        fn write(&self, relative: &str, contents: &[u8]) {
            let path = self.source().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }

        fn delta_job(&self, job_id: &str, image: &str, contents: &[u8]) {
            self.write(
                &format!("vm/{}.json", job_id),
                format!(
                    r#"{{"jobId":"{}","mode":"delta","vdis":{{"d0":{{}}}},"vhds":{{"d0":"{}"}}}}"#,
                    job_id, image
                )
                .as_bytes(),
            );
            self.write(&format!("vm/{}", image), contents);
        }

        fn config(&self, mode: BackupMode, strategy: TransferStrategy) -> EngineConfig {
            EngineConfig {
                source_root: self.source(),
                destination_root: self.destination(),
                mode,
                strategy,
                chunk_size: 4096,
                progress: false,
            }
        }

        fn destination_files(&self) -> Vec<PathBuf> {
            WalkDir::new(self.destination())
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.path().to_path_buf())
                .collect()
        }
    }

    fn pending(ledger: &Ledger, job_id: &str) {
        ledger
            .record_job_if_new(&NewJob {
                job_id: job_id.to_string(),
                job_name: format!("{} backup", job_id),
                raw_payload: json!({"jobId": job_id}),
                seen_at: Local::now(),
            })
            .unwrap();
    }

    #[test]
    fn first_run_copies_and_second_is_up_to_date() {
        let fx = Fixture::new();
        fx.delta_job("J1", "a.vhd", &[42u8; 1000]);
        fs::create_dir_all(fx.destination()).unwrap();
        fs::write(fx.destination().join(".xocopy-k3Jd9a"), b"interrupted").unwrap();
        let ledger = Ledger::open_in_memory().unwrap();
        let space = FixedSpace::new(2000);
        let engine = CopyEngine::new(
            fx.config(BackupMode::Delta, TransferStrategy::PlainCopy),
            &ledger,
            &space,
        );

        let first = engine.copy_job_artifacts("J1").unwrap();
        assert_eq!(first.copied, 1);
        assert!(first.is_success());
        assert_eq!(ledger.artifact_count().unwrap(), 1);
        let dest = fx.destination().join("a.vhd");
        assert_eq!(fs::read(&dest).unwrap(), vec![42u8; 1000]);

        let second = engine.copy_job_artifacts("J1").unwrap();
        assert_eq!(second.copied, 0);
        assert_eq!(second.up_to_date, 1);
        assert_eq!(ledger.artifact_count().unwrap(), 1);
        assert_eq!(fs::read(&dest).unwrap(), vec![42u8; 1000]);
        assert_eq!(fx.destination_files(), vec![dest]);
    }

    #[test]
    fn modified_source_is_copied_again() {
        let fx = Fixture::new();
        fx.delta_job("J1", "a.vhd", b"first contents");
        let ledger = Ledger::open_in_memory().unwrap();
        let space = FixedSpace::new(u64::MAX);
        let engine = CopyEngine::new(
            fx.config(BackupMode::Delta, TransferStrategy::PlainCopy),
            &ledger,
            &space,
        );

        engine.copy_job_artifacts("J1").unwrap();
        fx.write("vm/a.vhd", b"second contents, longer");
        let report = engine.copy_job_artifacts("J1").unwrap();
        assert_eq!(report.copied, 1);

        let dest = fx.destination().join("a.vhd");
        let key = ArtifactKey::new("J1", "a.vhd", &fx.source().join("vm/a.vhd"), &dest);
        let history = ledger.artifact_history(&key).unwrap();
        assert_eq!(history.len(), 2);
        assert_ne!(history[0].content_hash, history[1].content_hash);
        assert_eq!(
            ledger.lookup_artifact(&key).unwrap().unwrap().content_hash,
            history[1].content_hash
        );
        assert_eq!(fs::read(&dest).unwrap(), b"second contents, longer");
    }

    #[test]
    fn up_to_date_artifact_is_not_transferred() {
        let fx = Fixture::new();
        fx.delta_job("J1", "a.vhd", b"payload");
        let ledger = Ledger::open_in_memory().unwrap();
        let space = FixedSpace::new(u64::MAX);
        let mounter = CountingMounter::default();
        let engine = CopyEngine::new(
            fx.config(BackupMode::Delta, TransferStrategy::PlainCopy),
            &ledger,
            &space,
        )
        .with_volume(EncryptedVolume {
            mounter: &mounter,
            cipher_dir: fx.dir.path().join("cipher"),
            secret: "pw".to_string(),
        });

        engine.copy_job_artifacts("J1").unwrap();
        engine.copy_job_artifacts("J1").unwrap();
        engine.copy_job_artifacts("J1").unwrap();
        assert_eq!(mounter.mounts.get(), 1);
        assert_eq!(mounter.unmounts.get(), 1);
        assert_eq!(space.calls.get(), 1);
    }

    #[test]
    fn insufficient_space_aborts_without_record() {
        let fx = Fixture::new();
        fx.delta_job("J1", "a.vhd", &[1u8; 1000]);
        let ledger = Ledger::open_in_memory().unwrap();
        let space = FixedSpace::new(999);
        let mounter = CountingMounter::default();
        let engine = CopyEngine::new(
            fx.config(BackupMode::Delta, TransferStrategy::PlainCopy),
            &ledger,
            &space,
        )
        .with_volume(EncryptedVolume {
            mounter: &mounter,
            cipher_dir: fx.dir.path().join("cipher"),
            secret: "pw".to_string(),
        });

        let report = engine.copy_job_artifacts("J1").unwrap();
        assert!(!report.is_success());
        assert!(report.aborted.is_some());
        assert_eq!(ledger.artifact_count().unwrap(), 0);
        assert!(fx.destination_files().is_empty());
        assert_eq!(mounter.unmounts.get(), mounter.mounts.get());
    }

    #[test]
    fn encrypted_output_size_is_what_the_guard_checks() {
        let fx = Fixture::new();
        fx.delta_job("J1", "a.vhd", &[1u8; 1000]);
        let ledger = Ledger::open_in_memory().unwrap();
        let space = FixedSpace::new(1200);
        let engine = CopyEngine::new(
            fx.config(BackupMode::Delta, TransferStrategy::EncryptedCopy),
            &ledger,
            &space,
        );
        let report = engine.copy_job_artifacts("J1").unwrap();
        assert!(report.aborted.is_some());
        assert_eq!(ledger.artifact_count().unwrap(), 0);
    }

    #[test]
    fn encrypted_copy_records_its_key() {
        let fx = Fixture::new();
        fx.delta_job("J1", "a.vhd", b"secret image");
        let ledger = Ledger::open_in_memory().unwrap();
        let space = FixedSpace::new(u64::MAX);
        let engine = CopyEngine::new(
            fx.config(BackupMode::Delta, TransferStrategy::EncryptedCopy),
            &ledger,
            &space,
        );
        engine.copy_job_artifacts("J1").unwrap();
        let key = ledger.lookup_encryption_key("a.vhd").unwrap();
        assert!(key.is_some());
        assert_ne!(fs::read(fx.destination().join("a.vhd")).unwrap(), b"secret image");
    }

    #[test]
    fn other_mode_and_incrementals_are_skipped() {
        let fx = Fixture::new();
        fx.delta_job("J1", "a.vhd", b"data");
        fx.write(
            "vm/J1-incr.json",
            concat!(
                r#"{"jobId":"J1","mode":"delta","#,
                r#""vdis":{"d0":{"other_config":{"xo:base_delta":"x"}}},"vhds":{"d0":"b.vhd"}}"#
            )
            .as_bytes(),
        );
        let ledger = Ledger::open_in_memory().unwrap();
        let space = FixedSpace::new(u64::MAX);

        let full = CopyEngine::new(
            fx.config(BackupMode::Full, TransferStrategy::PlainCopy),
            &ledger,
            &space,
        );
        let report = full.copy_job_artifacts("J1").unwrap();
        assert_eq!(report.skipped, 2);
        assert!(report.is_success());
        assert_eq!(ledger.artifact_count().unwrap(), 0);

        let delta = CopyEngine::new(
            fx.config(BackupMode::Delta, TransferStrategy::PlainCopy),
            &ledger,
            &space,
        );
        let report = delta.copy_job_artifacts("J1").unwrap();
        assert_eq!(report.copied, 1);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn unknown_job_has_nothing_to_copy() {
        let fx = Fixture::new();
        let ledger = Ledger::open_in_memory().unwrap();
        let space = FixedSpace::new(0);
        let engine = CopyEngine::new(
            fx.config(BackupMode::Delta, TransferStrategy::PlainCopy),
            &ledger,
            &space,
        );
        let report = engine.copy_job_artifacts("nope").unwrap();
        assert!(report.nothing_to_copy());
        assert!(report.is_success());
        assert!(fx.destination().is_dir());
    }

    #[test]
    fn missing_helper_fails_only_the_artifact() {
        let fx = Fixture::new();
        fx.delta_job("J1", "a.vhd", b"data");
        let ledger = Ledger::open_in_memory().unwrap();
        pending(&ledger, "J1");
        let space = FixedSpace::new(u64::MAX);
        let mounter = CountingMounter {
            missing_helper: true,
            ..Default::default()
        };
        let engine = CopyEngine::new(
            fx.config(BackupMode::Delta, TransferStrategy::PlainCopy),
            &ledger,
            &space,
        )
        .with_volume(EncryptedVolume {
            mounter: &mounter,
            cipher_dir: fx.dir.path().join("cipher"),
            secret: "pw".to_string(),
        });

        let summary = engine.run_pending().unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.jobs_failed, 1);
        assert_eq!(ledger.pending_jobs().unwrap().len(), 1);
    }

    #[test]
    fn mount_failure_stops_the_run() {
        let fx = Fixture::new();
        fx.delta_job("J1", "a.vhd", b"data");
        let ledger = Ledger::open_in_memory().unwrap();
        let space = FixedSpace::new(u64::MAX);
        let mounter = CountingMounter {
            broken: true,
            ..Default::default()
        };
        let engine = CopyEngine::new(
            fx.config(BackupMode::Delta, TransferStrategy::PlainCopy),
            &ledger,
            &space,
        )
        .with_volume(EncryptedVolume {
            mounter: &mounter,
            cipher_dir: fx.dir.path().join("cipher"),
            secret: "pw".to_string(),
        });
        let err = engine.copy_job_artifacts("J1").unwrap_err();
        assert_eq!(err.scope(), ErrorScope::Run);
    }

    #[test]
    fn run_pending_marks_completed_jobs_once() {
        let fx = Fixture::new();
        fx.delta_job("J1", "a.vhd", b"one");
        fx.delta_job("J2", "b.vhd", &[0u8; 500]);
        let mut ledger = Ledger::open_in_memory().unwrap();
        let now = Local::now();
        ledger
            .record_jobs(&[
                NewJob {
                    job_id: "J1".to_string(),
                    job_name: "first".to_string(),
                    raw_payload: json!({}),
                    seen_at: now,
                },
                NewJob {
                    job_id: "J1".to_string(),
                    job_name: "first renamed".to_string(),
                    raw_payload: json!({}),
                    seen_at: now,
                },
                NewJob {
                    job_id: "J2".to_string(),
                    job_name: "second".to_string(),
                    raw_payload: json!({}),
                    seen_at: now,
                },
            ])
            .unwrap();
        let space = FixedSpace::new(100);
        let engine = CopyEngine::new(
            fx.config(BackupMode::Delta, TransferStrategy::PlainCopy),
            &ledger,
            &space,
        );

        let summary = engine.run_pending().unwrap();
        assert_eq!(summary.jobs, 2);
        assert_eq!(summary.jobs_completed, 1);
        assert_eq!(summary.jobs_failed, 1);
        let left: Vec<String> = ledger
            .pending_jobs()
            .unwrap()
            .into_iter()
            .map(|job| job.job_id)
            .collect();
        assert_eq!(left, vec!["J2"]);
    }

    #[test]
    fn ledger_failure_stops_the_run_and_keeps_the_job() {
        let fx = Fixture::new();
        fx.delta_job("J1", "a.vhd", b"data");
        let path = fx.dir.path().join("ledger.db");
        let ledger = Ledger::open(&path).unwrap();
        pending(&ledger, "J1");
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch("DROP TABLE artifact_copies;")
            .unwrap();
        let space = FixedSpace::new(u64::MAX);
        let engine = CopyEngine::new(
            fx.config(BackupMode::Delta, TransferStrategy::PlainCopy),
            &ledger,
            &space,
        );

        let err = engine.run_pending().unwrap_err();
        assert!(matches!(err, XocopyError::Ledger(_)));
        assert_eq!(err.scope(), ErrorScope::Run);
        assert_eq!(ledger.pending_jobs().unwrap().len(), 1);
    }
}
