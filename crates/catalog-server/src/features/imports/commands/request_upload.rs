use crate::import::config::inbox_key;
use crate::storage::UploadSigner;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest accepted file name, in characters
pub const MAX_FILE_NAME_LEN: usize = 255;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestUploadCommand {
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestUploadResponse {
    pub signed_url: String,
    pub key: String,
    pub expires_in: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum RequestUploadError {
    #[error("File name is required and cannot be empty")]
    NameRequired,
    #[error("File name must not contain '/'")]
    NameContainsSlash,
    #[error("File name must not exceed 255 characters")]
    NameTooLong,
    #[error("Signing error: {0}")]
    Signing(#[from] anyhow::Error),
}

/// Where upload handles point and how long they stay valid.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub inbox_prefix: String,
    pub ttl: Duration,
}

impl RequestUploadCommand {
    /// The validated file name.
    pub fn validate(&self) -> Result<&str, RequestUploadError> {
        let name = self
            .file_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or(RequestUploadError::NameRequired)?;
        if name.contains('/') {
            return Err(RequestUploadError::NameContainsSlash);
        }
        if name.chars().count() > MAX_FILE_NAME_LEN {
            return Err(RequestUploadError::NameTooLong);
        }
        Ok(name)
    }
}

#[tracing::instrument(skip(signer, settings))]
pub async fn handle(
    signer: &dyn UploadSigner,
    settings: &UploadSettings,
    command: RequestUploadCommand,
) -> Result<RequestUploadResponse, RequestUploadError> {
    let name = command.validate()?;
    let key = inbox_key(&settings.inbox_prefix, name);

    let signed_url = signer.presign_upload(&key, settings.ttl).await?;

    Ok(RequestUploadResponse {
        signed_url,
        key,
        expires_in: settings.ttl.as_secs(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn command(name: Option<&str>) -> RequestUploadCommand {
        RequestUploadCommand {
            file_name: name.map(str::to_string),
        }
    }

    #[test]
    fn test_validation_success() {
        assert!(matches!(command(Some("products.csv")).validate(), Ok("products.csv")));
    }

    #[test]
    fn test_validation_missing_name() {
        assert!(matches!(command(None).validate(), Err(RequestUploadError::NameRequired)));
        assert!(matches!(command(Some("   ")).validate(), Err(RequestUploadError::NameRequired)));
    }

    #[test]
    fn test_validation_rejects_path() {
        assert!(matches!(
            command(Some("../etc/products.csv")).validate(),
            Err(RequestUploadError::NameContainsSlash)
        ));
    }

    #[test]
    fn test_validation_name_length() {
        let long = "a".repeat(256);
        assert!(matches!(
            command(Some(&long)).validate(),
            Err(RequestUploadError::NameTooLong)
        ));
        let max = "a".repeat(255);
        assert!(command(Some(&max)).validate().is_ok());
    }
}
