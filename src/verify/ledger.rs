//! Ledger capability.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use super::VerifyError;

/// Read access to the wallet ledger kept by an external collaborator.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Number of ledger entries, or `None` if no ledger exists yet.
    async fn entry_count(&self) -> Result<Option<usize>, VerifyError>;
}

/// A ledger stored as a JSON document on disk.
pub struct FileLedger {
    path: PathBuf,
}

impl FileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Ledger for FileLedger {
    async fn entry_count(&self) -> Result<Option<usize>, VerifyError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(VerifyError::Ledger(format!("{}: {}", self.path.display(), e))),
        };

        let doc: Value = serde_json::from_str(&raw)
            .map_err(|e| VerifyError::Ledger(format!("{}: {}", self.path.display(), e)))?;

        match doc {
            Value::Object(map) => Ok(Some(map.len())),
            Value::Array(items) => Ok(Some(items.len())),
            Value::Null => Ok(Some(0)),
            _ => Err(VerifyError::Ledger(format!(
                "{}: expected an object or array",
                self.path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_missing_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::new(dir.path().join("wallets.json"));
        assert_eq!(ledger.entry_count().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ledger_entries() {
        let mut tmp = NamedTempFile::new().unwrap();
        write!(tmp, r#"{{"user_1": {{"balance": 10.5}}, "user_2": {{"balance": 0}}}}"#).unwrap();

        let ledger = FileLedger::new(tmp.path());
        assert_eq!(ledger.entry_count().await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_corrupt_ledger_is_error() {
        let mut tmp = NamedTempFile::new().unwrap();
        write!(tmp, "{{not json").unwrap();

        let ledger = FileLedger::new(tmp.path());
        assert!(matches!(ledger.entry_count().await, Err(VerifyError::Ledger(_))));
    }
}
