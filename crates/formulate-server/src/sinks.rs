use std::fmt::Display;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use formulate_contracts::FormulaSolution;
use formulate_kernel::{error_entry, training_record_line};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

// One write_all per record under the lock; appends never interleave.
pub struct AppendLog {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl AppendLog {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| format!("open {} failed: {e}", path.display()))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: &str) -> std::io::Result<()> {
        let mut file = self.file.lock().await;
        file.write_all(record.as_bytes()).await?;
        file.flush().await
    }
}

pub struct TrainingLog {
    inner: AppendLog,
}

impl TrainingLog {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, String> {
        Ok(Self {
            inner: AppendLog::open(path).await?,
        })
    }

    pub async fn record(&self, prompt: &str, solution: &FormulaSolution) {
        let line = match training_record_line(prompt, solution) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "training record skipped");
                return;
            }
        };
        if let Err(e) = self.inner.append(&format!("{line}\n")).await {
            tracing::warn!(path = %self.inner.path().display(), error = %e, "training log append failed");
        }
    }
}

pub struct ErrorLog {
    inner: AppendLog,
}

impl ErrorLog {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, String> {
        Ok(Self {
            inner: AppendLog::open(path).await?,
        })
    }

    pub async fn record(&self, error: &(dyn Display + Sync), request: &str) {
        let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let entry = error_entry(&ts, &error.to_string(), request);
        if let Err(e) = self.inner.append(&entry).await {
            tracing::warn!(path = %self.inner.path().display(), error = %e, "error log append failed");
        }
    }
}
