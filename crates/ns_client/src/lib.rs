use ns_core::{NewsApi, Result};
use std::str::FromStr;
use std::sync::Arc;

pub mod config;
pub mod http;
pub mod memory;
pub mod session;

pub use config::ClientConfig;
pub use http::HttpGateway;
pub use memory::InMemoryApi;
pub use session::{Session, SessionState};

/// Which gateway implementation backs the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Http,
    Memory,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(Backend::Http),
            "memory" => Ok(Backend::Memory),
            other => Err(format!("Unknown backend: {}", other)),
        }
    }
}

pub async fn create_gateway(
    backend: Backend,
    config: ClientConfig,
    session: Session,
) -> Result<Arc<dyn NewsApi>> {
    match backend {
        Backend::Http => Ok(Arc::new(HttpGateway::new(config, session)?)),
        Backend::Memory => Ok(Arc::new(InMemoryApi::seeded(session).await)),
    }
}
