use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body the exam server answers with when a lookup misses, e.g.
/// `{"error": "Solution not found", "available": false}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub available: bool,
}

#[derive(Debug, Error)]
#[error("{endpoint} returned {status}: {message}")]
pub struct ApiException {
    pub endpoint: String,
    pub status: u16,
    pub message: String,
}

impl ApiException {
    pub fn new(endpoint: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            status,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}
