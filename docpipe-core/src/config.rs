use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Engine configuration, passed explicitly into the components that need it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Lowercased extensions (with leading dot) accepted by upload.
    pub allowed_extensions: Vec<String>,
    pub max_upload_bytes: u64,
    /// Deadline for a single converter call.
    pub converter_timeout_ms: u64,
    /// Total attempts for a converter call that keeps timing out.
    pub max_convert_attempts: u32,
    /// Base delay for exponential backoff between timeout retries.
    pub retry_backoff_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: vec![
                ".docx".to_string(),
                ".pdf".to_string(),
                ".txt".to_string(),
                ".md".to_string(),
            ],
            max_upload_bytes: 50 * 1024 * 1024,
            converter_timeout_ms: 30_000,
            max_convert_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl CoreConfig {
    pub fn converter_timeout(&self) -> Duration {
        Duration::from_millis(self.converter_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn trace_loaded(&self) {
        info!(
            allowed_extensions = ?self.allowed_extensions,
            max_upload_bytes = self.max_upload_bytes,
            converter_timeout_ms = self.converter_timeout_ms,
            max_convert_attempts = self.max_convert_attempts,
            "Loaded CoreConfig"
        );
        debug!(?self, "CoreConfig loaded (full debug)");
    }
}
