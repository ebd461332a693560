//! Event loop
//!
//! Single-task accept/read/dispatch cycle. The readiness wait is the only
//! point where the loop suspends between batches; every accept, read and
//! handler call in a batch finishes before the next wait begins.

use log::{debug, error, info, warn};

use crate::client::{Classification, Session, SessionRegistry};
use crate::config::UnboundKindPolicy;
use crate::error::{HandlerError, ServerError};
use crate::handlers::{ClassificationHandler, Handler, HandlerTable};
use crate::protocol::Message;
use crate::server::readiness::wait_ready;
use crate::transport::{Handle, Listener};

/// Tunables for [`EventLoop`].
#[derive(Debug, Clone, Copy)]
pub struct LoopOptions {
    pub max_sessions: usize,
    pub unbound_kind_policy: UnboundKindPolicy,
    pub acknowledge_handshake: bool,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            max_sessions: 256,
            unbound_kind_policy: UnboundKindPolicy::Drop,
            acknowledge_handshake: false,
        }
    }
}

pub struct EventLoop {
    listener: Box<dyn Listener>,
    sessions: SessionRegistry,
    classifier: ClassificationHandler,
    handlers: HandlerTable,
    options: LoopOptions,
}

impl EventLoop {
    pub fn new(listener: Box<dyn Listener>, handlers: HandlerTable, options: LoopOptions) -> Self {
        Self {
            listener,
            sessions: SessionRegistry::new(),
            classifier: ClassificationHandler::new(options.acknowledge_handshake),
            handlers,
            options,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn options(&self) -> LoopOptions {
        self.options
    }

    /// Runs until the readiness wait fails. Never returns `Ok`.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        info!("Event loop started");
        loop {
            self.run_once().await?;
        }
    }

    /// Performs one wait followed by one batch of accept and reads.
    ///
    /// On a failed wait every session is closed and the error is returned.
    pub async fn run_once(&mut self) -> Result<(), ServerError> {
        let ready = match wait_ready(self.listener.as_mut(), &mut self.sessions).await {
            Ok(ready) => ready,
            Err(e) => {
                error!("Readiness wait failed: {}. Closing {} sessions", e, self.sessions.len());
                self.sessions.clear();
                return Err(ServerError::Multiplex(e));
            }
        };
        debug!(
            "Ready: listener={}, sessions={:?}",
            ready.listener, ready.sessions
        );

        if ready.listener {
            self.accept().await;
        }

        for handle in ready.sessions {
            self.service(handle).await;
        }
        Ok(())
    }

    async fn accept(&mut self) {
        let connection = match self.listener.accept().await {
            Ok(connection) => connection,
            Err(e) => {
                error!("Failed to accept new connection: {}", e);
                return;
            }
        };

        if self.sessions.len() >= self.options.max_sessions {
            warn!(
                "Session limit {} reached; closing connection from {}",
                self.options.max_sessions,
                connection.peer()
            );
            return;
        }

        let session = Session::new(connection);
        let peer = session.peer();
        let handle = self.sessions.insert(session);
        info!(
            "Accepted connection {} from {} ({} live sessions)",
            handle,
            peer,
            self.sessions.len()
        );
    }

    /// Reads and dispatches one message for a session reported ready.
    async fn service(&mut self, handle: Handle) {
        // An earlier handler in this batch may already have evicted it.
        let Some(session) = self.sessions.get_mut(handle) else {
            debug!("Session {} was evicted earlier in this batch", handle);
            return;
        };

        let message = match session.read_message() {
            Ok(message) => message,
            Err(e) if e.is_peer_closed() => {
                info!("Session {} closed by peer", handle);
                self.evict(handle);
                return;
            }
            Err(e) => {
                error!("Failed to read from session {}: {}. Evicting", handle, e);
                self.evict(handle);
                return;
            }
        };
        let classification = session.classification();
        debug!(
            "Read {:?} from session {} ({})",
            message.kind(),
            handle,
            classification
        );

        if let Err(e) = self.dispatch(message, handle, classification).await {
            error!(
                "Failed to handle message from session {} ({}): {}. Evicting",
                handle, classification, e
            );
            self.evict(handle);
        }
    }

    /// Routes by the session's classification at read time.
    async fn dispatch(
        &mut self,
        message: Message,
        handle: Handle,
        classification: Classification,
    ) -> Result<(), HandlerError> {
        let kind = match classification {
            Classification::Unclassified => {
                return self.classifier.handle(message, handle, &mut self.sessions).await;
            }
            Classification::Classified { kind, .. } => kind,
        };

        match self.handlers.get_mut(kind) {
            Some(handler) => handler.handle(message, handle, &mut self.sessions).await,
            None => match self.options.unbound_kind_policy {
                UnboundKindPolicy::Drop => {
                    warn!(
                        "No handler bound for {}; dropping {:?} from session {}",
                        kind,
                        message.kind(),
                        handle
                    );
                    Ok(())
                }
                UnboundKindPolicy::Evict => Err(HandlerError::ProtocolViolation(format!(
                    "no handler bound for client kind {}",
                    kind
                ))),
            },
        }
    }

    fn evict(&mut self, handle: Handle) {
        if self.sessions.contains(handle) {
            let session = self.sessions.remove(handle);
            debug!("Closed session {} ({})", handle, session.classification());
        }
    }
}
