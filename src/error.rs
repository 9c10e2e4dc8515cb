use thiserror::Error;

/// a side effect the platform could not carry out
///
/// these never stop the alarm from changing state. the dispatcher logs them
/// and moves on, leaving a visual-only alarm at worst.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("playback failed: {0}")]
    Playback(String),

    #[error("push delivery failed: {0}")]
    Push(String),

    #[cfg(feature = "hardware")]
    #[error("gpio error: {0}")]
    Gpio(#[from] rppal::gpio::Error),
}

/// an inbound payload that cannot be turned into a reading at all
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a json object")]
    NotAnObject,
}
