//! Service collaborator boundary
//!
//! The engine treats services as opaque: a name and a data map go in, a
//! value or an error comes out. Side effects live entirely behind this
//! trait; the executor only awaits completion.

use async_trait::async_trait;
use eca_core::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Errors a service collaborator can report
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("service not found: {0}")]
    NotFound(String),

    #[error("service call failed: {0}")]
    CallFailed(String),
}

/// Result type for service calls
pub type ServiceResult = Result<Value, ServiceError>;

/// The injected side-effect collaborator
///
/// Cancellation of a running rule only interrupts a call at the
/// collaborator's own await points; implementations decide how promptly
/// they honor it.
#[async_trait]
pub trait Service: Send + Sync {
    /// Execute a named service with opaque data
    async fn call(&self, service: &str, data: &HashMap<String, Value>) -> ServiceResult;
}

/// Shared service handle
pub type SharedService = Arc<dyn Service>;

/// Service used when no collaborator is wired
///
/// Every call is reported as not found; the executor logs this as an
/// action-level failure and continues, so a missing collaborator is never
/// fatal.
pub struct NullService;

#[async_trait]
impl Service for NullService {
    async fn call(&self, service: &str, _data: &HashMap<String, Value>) -> ServiceResult {
        warn!(service, "No service collaborator wired");
        Err(ServiceError::NotFound(service.to_string()))
    }
}
