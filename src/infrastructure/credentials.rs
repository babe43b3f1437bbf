// Bearer credential holder for the plant API
use crate::infrastructure::error::{MonitorError, Result};
use parking_lot::RwLock;
use std::sync::Arc;

/// Shared bearer token. Requests fail fast when it is missing or blank.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    token: Arc<RwLock<Option<String>>>,
}

impl Credentials {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(token)),
        }
    }

    pub fn bearer_token(&self) -> Result<String> {
        match self.token.read().as_deref() {
            Some(token) if !token.trim().is_empty() => Ok(token.to_string()),
            _ => Err(MonitorError::MissingCredential),
        }
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }
}
