use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackupMode {
    Full,
    Delta,
}

impl BackupMode {
    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(BackupMode::Full),
            "delta" => Ok(BackupMode::Delta),
            _ => Err(format!("invalid backup mode {}; expected full or delta", value)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackupMode::Full => "full",
            BackupMode::Delta => "delta",
        }
    }
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Plain,
    Encrypted,
}

impl TransferKind {
    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plain" | "copy" => Ok(TransferKind::Plain),
            "encrypted" | "encrypt" => Ok(TransferKind::Encrypted),
            _ => Err(format!(
                "invalid transfer {}; expected plain or encrypted",
                value
            )),
        }
    }
}
