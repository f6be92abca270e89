//! Onboarding checks run before a session is joined: server address, then
//! username, then the media file.

use std::path::Path;

use thiserror::Error;

/// File extensions a player is expected to handle
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["mp4", "ogg", "webm"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OnboardingError {
    #[error("URL is empty!")]
    EmptyServerUrl,

    #[error("Username cannot be empty!")]
    EmptyUsername,

    #[error("Not a supported video format!")]
    UnsupportedMedia(String),
}

/// Trimmed server URL, rejected when empty
pub fn validate_server_url(input: &str) -> Result<String, OnboardingError> {
    let url = input.trim();
    if url.is_empty() {
        return Err(OnboardingError::EmptyServerUrl);
    }
    Ok(url.to_string())
}

/// Trimmed username, rejected when empty
pub fn validate_username(input: &str) -> Result<String, OnboardingError> {
    let name = input.trim();
    if name.is_empty() {
        return Err(OnboardingError::EmptyUsername);
    }
    Ok(name.to_string())
}

/// Accept only file names ending in one of [`SUPPORTED_EXTENSIONS`]
pub fn validate_media_file(path: &Path) -> Result<(), OnboardingError> {
    let supported = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
        .unwrap_or(false);

    if supported {
        Ok(())
    } else {
        Err(OnboardingError::UnsupportedMedia(
            path.display().to_string(),
        ))
    }
}
