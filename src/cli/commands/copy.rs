use std::path::Path;

use chrono::Local;
use tracing::{info, warn};

use crate::cli::args::CopyArgs;
use crate::config::model::{MediaSettings, UpstreamSettings};
use crate::config::{load_config, RuntimeConfig};
use crate::engine::{CopyEngine, EncryptedVolume, EngineConfig};
use crate::error::{MediaError, Result, XocopyError};
use crate::ledger::Ledger;
use crate::media::{self, MediaMount, StatvfsProbe};
use crate::mount::{DeviceMounter, GocryptfsMounter};
use crate::transfer::TransferStrategy;
use crate::upstream::xo_cli::DEFAULT_RETRY_DELAY;
use crate::upstream::{ingest, DumpFileSource, JobSource, XoCliSource};
use crate::util::paths::{ensure_dir, resolve_under};

pub fn run_copy(config_path: &Path, args: CopyArgs) -> Result<()> {
    let cfg = load_config(config_path)?;
    let mut ledger = Ledger::open(&cfg.ledger)?;

    if args.no_fetch {
        info!("skipping upstream fetch");
    } else {
        fetch_jobs(&cfg, &mut ledger)?;
    }
    if ledger.pending_jobs()?.is_empty() {
        info!("no pending jobs");
        return Ok(());
    }

    let device_mounter = DeviceMounter {
        options: cfg.media.as_ref().and_then(|m| m.mount_options.clone()),
        ..Default::default()
    };
    let media_mount = match &cfg.media {
        Some(media) => Some(attach_media(media, &device_mounter)?),
        None => None,
    };
    let media_base = match (&media_mount, &cfg.media) {
        (Some(mount), Some(media)) => Some(mount.path().join(&media.subdir)),
        _ => None,
    };
    let destination = match &media_base {
        Some(base) => resolve_under(base, &cfg.destination),
        None => cfg.destination.clone(),
    };

    let volume_mounter = cfg.encrypted_volume.as_ref().map(|volume| {
        GocryptfsMounter::new(volume.helper.clone()).with_timeout(volume.mount_timeout)
    });

    let engine_config = EngineConfig {
        source_root: cfg.source_root.clone(),
        destination_root: destination,
        mode: cfg.mode,
        strategy: TransferStrategy::from(cfg.transfer),
        chunk_size: cfg.chunk_size,
        progress: args.progress,
    };
    let space = StatvfsProbe;
    let mut engine = CopyEngine::new(engine_config, &ledger, &space);
    if let (Some(volume), Some(mounter)) = (&cfg.encrypted_volume, &volume_mounter) {
        let cipher_dir = match &media_base {
            Some(base) => resolve_under(base, &volume.cipher_dir),
            None => volume.cipher_dir.clone(),
        };
        ensure_dir(&cipher_dir)?;
        engine = engine.with_volume(EncryptedVolume {
            mounter,
            cipher_dir,
            secret: volume.password.clone(),
        });
    }

    let summary = engine.run_pending()?;
    drop(media_mount);
    if summary.jobs_failed > 0 {
        warn!("{} job(s) left pending for the next run", summary.jobs_failed);
    }
    Ok(())
}

fn fetch_jobs(cfg: &RuntimeConfig, ledger: &mut Ledger) -> Result<()> {
    let source: Box<dyn JobSource> = match &cfg.upstream {
        None => {
            info!("no upstream configured, using pending jobs only");
            return Ok(());
        }
        Some(UpstreamSettings::DumpFile(path)) => Box::new(DumpFileSource { path: path.clone() }),
        Some(UpstreamSettings::XoCli(xo)) => Box::new(XoCliSource {
            host: xo.host.clone(),
            user: xo.user.clone(),
            identity_file: xo.identity_file.clone(),
            xo_cli: xo.xo_cli.clone(),
            xo_url: xo.xo_url.clone(),
            xo_user: xo.xo_user.clone(),
            xo_password: xo.xo_password.clone(),
            timeout: xo.timeout,
            attempts: xo.attempts,
            retry_delay: DEFAULT_RETRY_DELAY,
        }),
    };
    match ingest(ledger, source.as_ref(), cfg.mode, Local::now()) {
        Ok(_) => Ok(()),
        Err(err @ XocopyError::Ledger(_)) => Err(err),
        Err(err) => {
            warn!("fetching jobs failed: {}; continuing with pending jobs", err);
            Ok(())
        }
    }
}

fn attach_media<'a>(media: &MediaSettings, mounter: &'a DeviceMounter) -> Result<MediaMount<'a>> {
    let device = media::find_authorized_device(&media.authorized_serials)?
        .ok_or(MediaError::NoAuthorizedDevice)?;
    let mount = media::attach(&device, &media.mountpoint, mounter)?;
    ensure_dir(&mount.path().join(&media.subdir))?;
    Ok(mount)
}
