use std::net::SocketAddr;

use log::info;

use crate::client::ClientKind;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::handlers::{ControlHandler, HandlerTable, IrrigationSystemHandler, RpiHandler};
use crate::server::event_loop::{EventLoop, LoopOptions};
use crate::storage::{SharedStore, SqliteStore};
use crate::transport::TcpAcceptor;

pub struct Server {
    event_loop: EventLoop,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the listening socket and opens the domain store shared by the
    /// control and RPi handlers.
    pub async fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        let addr = config.listen_addr();
        let acceptor = TcpAcceptor::bind(&addr, config.connection_limits())
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = acceptor
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;
        info!("Server bound to {}", local_addr);

        let handlers = build_handlers(config)?;
        info!("Domain store: {}", config.database_path);

        let options = LoopOptions {
            max_sessions: config.max_sessions,
            unbound_kind_policy: config.unbound_kind_policy,
            acknowledge_handshake: config.acknowledge_handshake,
        };

        Ok(Self {
            event_loop: EventLoop::new(Box::new(acceptor), handlers, options),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves clients until the readiness wait fails.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        info!(
            "Starting organicdump server on {} (max {} sessions)",
            self.local_addr,
            self.event_loop.options().max_sessions
        );
        self.event_loop.run().await
    }
}

fn build_handlers(config: &ServerConfig) -> Result<HandlerTable, ServerError> {
    let store = SharedStore::new(SqliteStore::open(&config.database_path)?);

    HandlerTable::new()
        .bind(
            ClientKind::Control,
            Box::new(ControlHandler::new(Box::new(store.clone()))),
        )?
        .bind(
            ClientKind::Rpi,
            Box::new(RpiHandler::new(Box::new(store))),
        )?
        .bind(
            ClientKind::IrrigationSystem,
            Box::new(IrrigationSystemHandler::new()),
        )
}
