//! # Remote Services
//!
//! gRPC clients for the collaborators the ledger does not own.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Port (kassa-core)      Client               Call                       │
//! │  ─────────────────      ──────────────────   ─────────────────────────  │
//! │  UserDirectory     ───► UserServiceClient    user.UserService/FetchUser │
//! │  TillAssigner      ───► TillServiceClient    user.TillService/UpdateTill│
//! │  Catalog           ───► InventoryClient      inventory.InventoryService │
//! │                                              /SearchProduct             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Channels connect lazily: the server starts even when a remote service is
//! down, and the first call that needs it fails with `Upstream`.

pub mod grpc;
mod directory;
mod inventory;

use std::sync::Arc;
use std::time::Duration;

use kassa_core::{Catalog, TillAssigner, UserDirectory};
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity as TlsIdentity};
use tracing::info;

pub use directory::{TillServiceClient, UserServiceClient};
pub use inventory::InventoryClient;

use crate::config::ServerConfig;

/// Remote client setup errors.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Invalid endpoint {url}: {message}")]
    InvalidEndpoint { url: String, message: String },

    #[error("Failed to read TLS material {path}: {source}")]
    TlsMaterial {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// The three ports, backed by gRPC.
#[derive(Clone)]
pub struct RemoteClients {
    pub directory: Arc<dyn UserDirectory>,
    pub assigner: Arc<dyn TillAssigner>,
    pub catalog: Arc<dyn Catalog>,
}

impl RemoteClients {
    /// Builds lazily connected channels for the user and inventory services.
    pub fn connect(config: &ServerConfig) -> Result<Self, RemoteError> {
        let tls = tls_config(config)?;
        let timeout = config.request_timeout();

        let users = channel(&config.remote.directory_url, tls.clone(), timeout)?;
        let inventory = channel(&config.remote.inventory_url, tls, timeout)?;

        info!(
            directory = %config.remote.directory_url,
            inventory = %config.remote.inventory_url,
            tls = config.server.tls_enabled,
            "Remote clients configured"
        );

        Ok(RemoteClients {
            directory: Arc::new(UserServiceClient::new(users.clone(), timeout)),
            assigner: Arc::new(TillServiceClient::new(users, timeout)),
            catalog: Arc::new(InventoryClient::new(inventory, timeout)),
        })
    }
}

fn channel(url: &str, tls: Option<ClientTlsConfig>, timeout: Duration) -> Result<Channel, RemoteError> {
    let invalid = |e: tonic::transport::Error| RemoteError::InvalidEndpoint {
        url: url.to_string(),
        message: e.to_string(),
    };

    let mut endpoint = Endpoint::from_shared(url.to_string())
        .map_err(invalid)?
        .connect_timeout(timeout)
        .timeout(timeout);
    if let Some(tls) = tls {
        endpoint = endpoint.tls_config(tls).map_err(invalid)?;
    }
    Ok(endpoint.connect_lazy())
}

fn tls_config(config: &ServerConfig) -> Result<Option<ClientTlsConfig>, RemoteError> {
    let server = &config.server;
    if !server.tls_enabled {
        return Ok(None);
    }

    let read = |path: &std::path::Path| {
        std::fs::read(path).map_err(|source| RemoteError::TlsMaterial {
            path: path.display().to_string(),
            source,
        })
    };

    let mut tls = ClientTlsConfig::new();
    if let (Some(cert), Some(key)) = (&server.tls_cert_path, &server.tls_key_path) {
        tls = tls.identity(TlsIdentity::from_pem(read(cert.as_path())?, read(key.as_path())?));
    }
    if let Some(ca) = &server.tls_ca_path {
        tls = tls.ca_certificate(Certificate::from_pem(read(ca.as_path())?));
    }
    Ok(Some(tls))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_is_lazy() {
        let mut config = ServerConfig::default();
        config.remote.directory_url = "http://127.0.0.1:1".to_string();
        config.remote.request_timeout_secs = 1;

        // nothing listens on port 1; building the clients must still succeed
        let clients = RemoteClients::connect(&config).unwrap();
        let err = clients.directory.approver("otieno").await.unwrap_err();
        assert_eq!(err.category(), kassa_core::ErrorCategory::Upstream);
    }

    #[tokio::test]
    async fn test_rejects_malformed_url() {
        let mut config = ServerConfig::default();
        config.remote.inventory_url = "not a url".to_string();
        assert!(matches!(
            RemoteClients::connect(&config),
            Err(RemoteError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_missing_tls_material() {
        let mut config = ServerConfig::default();
        config.server.tls_enabled = true;
        config.server.tls_cert_path = Some("/nonexistent/kassa.pem".into());
        config.server.tls_key_path = Some("/nonexistent/kassa.key".into());
        assert!(matches!(
            RemoteClients::connect(&config),
            Err(RemoteError::TlsMaterial { .. })
        ));
    }
}
