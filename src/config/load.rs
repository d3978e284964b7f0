use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::model::{
    Config, EncryptedVolumeConfig, EncryptedVolumeSettings, MediaConfig, MediaSettings,
    RuntimeConfig, UpstreamConfig, UpstreamSettings, XoCliSettings,
};
use crate::error::{ConfigError, Result, XocopyError};
use crate::transfer::DEFAULT_CHUNK_SIZE;
use crate::types::{BackupMode, TransferKind};
use crate::upstream::xo_cli::DEFAULT_XO_CLI;

const DEFAULT_GOCRYPTFS: &str = "/usr/bin/gocryptfs";
const DEFAULT_MEDIA_MOUNTPOINT: &str = "/tmp/usb";
const DEFAULT_MEDIA_SUBDIR: &str = "backup";
const DEFAULT_MOUNT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 120;
const DEFAULT_UPSTREAM_ATTEMPTS: u32 = 3;
const DEFAULT_XO_URL: &str = "http://localhost";

pub fn load_config(path: &Path) -> Result<RuntimeConfig> {
    let contents = fs::read_to_string(path)
        .map_err(|e| XocopyError::message(format!("read {}: {}", path.display(), e)))?;
    let cfg: Config =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
    parse_runtime(cfg)
}

fn invalid(msg: impl Into<String>) -> XocopyError {
    ConfigError::Invalid(msg.into()).into()
}

fn required_path(value: &str, key: &str) -> Result<PathBuf> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{} is required", key)));
    }
    Ok(PathBuf::from(value.trim()))
}

fn read_secret(inline: Option<&str>, file: Option<&str>, key: &str) -> Result<String> {
    if let Some(file) = file {
        let contents = fs::read_to_string(file)
            .map_err(|e| invalid(format!("{}File {}: {}", key, file, e)))?;
        return Ok(contents.trim_end_matches(['\r', '\n']).to_string());
    }
    match inline {
        Some(secret) => Ok(secret.to_string()),
        None => Err(invalid(format!("{} or {}File is required", key, key))),
    }
}

fn parse_runtime(cfg: Config) -> Result<RuntimeConfig> {
    let mode = BackupMode::parse(&cfg.mode).map_err(|e| invalid(format!("mode: {}", e)))?;
    let transfer =
        TransferKind::parse(&cfg.transfer).map_err(|e| invalid(format!("transfer: {}", e)))?;
    let chunk_size = cfg.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
    if chunk_size == 0 {
        return Err(invalid("chunkSize must be greater than zero"));
    }

    Ok(RuntimeConfig {
        ledger: required_path(&cfg.ledger, "ledger")?,
        source_root: required_path(&cfg.source_root, "sourceRoot")?,
        destination: required_path(&cfg.destination, "destination")?,
        mode,
        transfer,
        chunk_size,
        encrypted_volume: cfg.encrypted_volume.map(parse_volume).transpose()?,
        media: cfg.media.map(parse_media).transpose()?,
        upstream: cfg.upstream.map(parse_upstream).transpose()?,
    })
}

fn parse_volume(volume: EncryptedVolumeConfig) -> Result<EncryptedVolumeSettings> {
    Ok(EncryptedVolumeSettings {
        helper: PathBuf::from(volume.helper.as_deref().unwrap_or(DEFAULT_GOCRYPTFS)),
        cipher_dir: required_path(&volume.cipher_dir, "encryptedVolume.cipherDir")?,
        password: read_secret(
            volume.password.as_deref(),
            volume.password_file.as_deref(),
            "encryptedVolume.password",
        )?,
        mount_timeout: Duration::from_secs(
            volume.mount_timeout_secs.unwrap_or(DEFAULT_MOUNT_TIMEOUT_SECS),
        ),
    })
}

fn parse_media(media: MediaConfig) -> Result<MediaSettings> {
    let authorized_serials: Vec<String> = media
        .authorized_serials
        .into_iter()
        .map(|serial| serial.trim().to_string())
        .filter(|serial| !serial.is_empty())
        .collect();
    if authorized_serials.is_empty() {
        return Err(invalid("media.authorizedSerials must list at least one serial"));
    }
    Ok(MediaSettings {
        authorized_serials,
        mountpoint: PathBuf::from(media.mountpoint.as_deref().unwrap_or(DEFAULT_MEDIA_MOUNTPOINT)),
        subdir: PathBuf::from(media.subdir.as_deref().unwrap_or(DEFAULT_MEDIA_SUBDIR)),
        mount_options: media.mount_options,
    })
}

fn parse_upstream(upstream: UpstreamConfig) -> Result<UpstreamSettings> {
    if let Some(dump) = upstream.dump_file {
        return Ok(UpstreamSettings::DumpFile(required_path(&dump, "upstream.dumpFile")?));
    }
    let host = upstream
        .host
        .filter(|host| !host.trim().is_empty())
        .ok_or_else(|| invalid("upstream.host or upstream.dumpFile is required"))?;
    let xo_user = upstream
        .xo_user
        .ok_or_else(|| invalid("upstream.xoUser is required"))?;
    let xo_password = read_secret(
        upstream.xo_password.as_deref(),
        upstream.xo_password_file.as_deref(),
        "upstream.xoPassword",
    )?;
    let attempts = upstream.attempts.unwrap_or(DEFAULT_UPSTREAM_ATTEMPTS);
    if attempts == 0 {
        return Err(invalid("upstream.attempts must be at least 1"));
    }
    Ok(UpstreamSettings::XoCli(XoCliSettings {
        host,
        user: upstream.user.unwrap_or_else(|| "root".to_string()),
        identity_file: upstream.identity_file.map(PathBuf::from),
        xo_cli: upstream.xo_cli.unwrap_or_else(|| DEFAULT_XO_CLI.to_string()),
        xo_url: upstream.xo_url.unwrap_or_else(|| DEFAULT_XO_URL.to_string()),
        xo_user,
        xo_password,
        timeout: Duration::from_secs(
            upstream
                .timeout_secs
                .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        ),
        attempts,
    }))
}
