use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::Auth0Verifier;
use crate::config::Config;
use crate::extraction::GeminiClient;
use crate::lubelogger::{LubeLoggerClient, UpstreamError};

/// Shared handles for the submission API.
pub struct AppState {
    pub lubelogger: LubeLoggerClient,
    pub extractor: GeminiClient,
    pub auth: Auth0Verifier,
}

impl AppState {
    pub async fn from_config(config: &Config) -> anyhow::Result<Arc<Self>> {
        let lubelogger = LubeLoggerClient::new(&config.lubelogger).map_err(|err| match err {
            UpstreamError::NotConfigured => anyhow::anyhow!(
                "[ACTION REQUIRED] LubeLogger server URL environment variable (LUBELOGGER_URL) is not set"
            ),
            other => anyhow::Error::new(other),
        })?;
        info!(url = %lubelogger.base_url(), "Using LubeLogger");

        let auth = Auth0Verifier::from_config(&config.auth).await?;
        if !auth.is_enabled() {
            warn!("AUTH0_DOMAIN / AUTH0_API_AUDIENCE not set; API is open to unauthenticated requests");
        }

        Ok(Arc::new(Self {
            lubelogger,
            extractor: GeminiClient::new(&config.extraction),
            auth,
        }))
    }
}
