use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::{BackupMode, TransferKind};

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub ledger: String,
    pub source_root: String,
    pub destination: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_transfer")]
    pub transfer: String,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub encrypted_volume: Option<EncryptedVolumeConfig>,
    #[serde(default)]
    pub media: Option<MediaConfig>,
    #[serde(default)]
    pub upstream: Option<UpstreamConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedVolumeConfig {
    #[serde(default)]
    pub helper: Option<String>,
    pub cipher_dir: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_file: Option<String>,
    #[serde(default)]
    pub mount_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MediaConfig {
    pub authorized_serials: Vec<String>,
    #[serde(default)]
    pub mountpoint: Option<String>,
    #[serde(default)]
    pub subdir: Option<String>,
    #[serde(default)]
    pub mount_options: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub identity_file: Option<String>,
    #[serde(default)]
    pub xo_cli: Option<String>,
    #[serde(default)]
    pub xo_url: Option<String>,
    #[serde(default)]
    pub xo_user: Option<String>,
    #[serde(default)]
    pub xo_password: Option<String>,
    #[serde(default)]
    pub xo_password_file: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub attempts: Option<u32>,
    #[serde(default)]
    pub dump_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EncryptedVolumeSettings {
    pub helper: PathBuf,
    pub cipher_dir: PathBuf,
    pub password: String,
    pub mount_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub authorized_serials: Vec<String>,
    pub mountpoint: PathBuf,
    pub subdir: PathBuf,
    pub mount_options: Option<String>,
}

#[derive(Debug, Clone)]
pub struct XoCliSettings {
    pub host: String,
    pub user: String,
    pub identity_file: Option<PathBuf>,
    pub xo_cli: String,
    pub xo_url: String,
    pub xo_user: String,
    pub xo_password: String,
    pub timeout: Duration,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub enum UpstreamSettings {
    XoCli(XoCliSettings),
    DumpFile(PathBuf),
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub ledger: PathBuf,
    pub source_root: PathBuf,
    pub destination: PathBuf,
    pub mode: BackupMode,
    pub transfer: TransferKind,
    pub chunk_size: usize,
    pub encrypted_volume: Option<EncryptedVolumeSettings>,
    pub media: Option<MediaSettings>,
    pub upstream: Option<UpstreamSettings>,
}

fn default_mode() -> String {
    "delta".to_string()
}

fn default_transfer() -> String {
    "plain".to_string()
}
