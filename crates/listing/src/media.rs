use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Binary payload handed to the model next to the prompt text, never inlined into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    pub mime_type: String,
    /// Base64 body, exactly as it appeared in the data URI
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("missing 'data:' prefix")]
    MissingScheme,
    #[error("missing ';base64,' marker")]
    NotBase64,
    #[error("missing MIME type")]
    MissingMimeType,
    #[error("payload is not valid base64")]
    InvalidBase64,
}

impl MediaRef {
    /// Parse a `data:<mimetype>;base64,<encoded_data>` URI
    pub fn from_data_uri(uri: &str) -> Result<Self, MediaError> {
        let rest = uri.trim().strip_prefix("data:").ok_or(MediaError::MissingScheme)?;
        let (mime_type, data) = rest.split_once(";base64,").ok_or(MediaError::NotBase64)?;

        if mime_type.is_empty() || !mime_type.contains('/') {
            return Err(MediaError::MissingMimeType);
        }
        if data.is_empty() || STANDARD.decode(data).is_err() {
            return Err(MediaError::InvalidBase64);
        }

        Ok(Self {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        })
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}
