//! Bot Framework channel
//!
//! Main entry point for the messaging endpoint

use std::sync::Arc;

use bridge_core::{Config, TurnHandler};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::adapter::BotAdapter;
use crate::connector::ConnectorClient;
use crate::error::Result;
use crate::server::{start_server, ServerState};

/// Bot Framework channel for the bridge
pub struct BotServer {
    addr: String,
    state: ServerState,
}

impl BotServer {
    /// Create a new bot server
    pub fn new(config: &Config, turn_handler: Arc<TurnHandler>) -> Result<Self> {
        if config.bot.has_credentials() {
            warn!(
                "MicrosoftAppId {} is configured, but replies are sent without channel authentication",
                config.bot.app_id
            );
        } else {
            info!("No bot credentials configured (local/emulator mode)");
        }

        let state = ServerState {
            adapter: Arc::new(BotAdapter::new(turn_handler)),
            connector: Arc::new(ConnectorClient::new()?),
        };

        Ok(Self {
            addr: config.server.bind_addr(),
            state,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Run until a shutdown signal is broadcast
    pub async fn run(self, shutdown: broadcast::Receiver<()>) -> Result<()> {
        start_server(&self.addr, self.state, shutdown).await
    }
}
