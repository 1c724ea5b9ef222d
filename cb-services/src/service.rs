//! Service trait and lifecycle management.
//!
//! Every domain service is registered with the registry, initialized once at
//! startup and shut down in reverse order. A service whose optional backend
//! (LLM, SMS provider) is missing stays usable in `Degraded` state and says
//! why through [`Service::detail`].

use serde::Serialize;

use cb_core::error::CbResult;

/// Lifecycle state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// Created but not initialized.
    Created,
    Running,
    /// Running without one of its optional backends.
    Degraded,
    /// Service has been stopped.
    Stopped,
    /// Service encountered a fatal error.
    Failed,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Degraded => write!(f, "degraded"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One line of the registry health report.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub name: String,
    pub state: ServiceState,
    pub healthy: bool,
    pub detail: Option<String>,
}

/// A domain service managed by the registry.
pub trait Service: Send + Sync {
    /// Human-readable name of this service.
    fn name(&self) -> &str;

    /// Current state of this service.
    fn state(&self) -> ServiceState;

    /// Initialize the service. Called once during application startup.
    fn init(&mut self) -> CbResult<()>;

    /// Gracefully shut down the service.
    fn shutdown(&mut self) -> CbResult<()>;

    /// Degraded services can still answer requests.
    fn is_healthy(&self) -> bool {
        matches!(self.state(), ServiceState::Running | ServiceState::Degraded)
    }

    /// Why the service is not fully running, if it is not.
    fn detail(&self) -> Option<String> {
        None
    }

    fn health(&self) -> ServiceHealth {
        ServiceHealth {
            name: self.name().to_string(),
            state: self.state(),
            healthy: self.is_healthy(),
            detail: self.detail(),
        }
    }
}
