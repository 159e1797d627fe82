// crates/serialite/src/bridge.rs
// ============================================================================
// Module: Bridge
// Description: Factory for serialized connections.
// Purpose: Own shared configuration, token generation, and shutdown.
// Dependencies: serialite-config, tracing
// ============================================================================

//! ## Overview
//! A [`Bridge`] is constructed once at startup from a validated
//! [`BridgeConfig`]. Every connection it starts gets its own worker thread,
//! and every command across those connections draws a correlation token from
//! one shared generator.
//!
//! The bridge tracks connections weakly: handles alone decide how long a
//! connection lives, except that [`Bridge::shutdown`] (or dropping the
//! bridge) tears down every connection still alive. Handles that outlive the
//! bridge then reject every dispatch with [`DispatchError::Closed`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::mem;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::Weak;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serialite_config::BridgeConfig;
use serialite_config::ConfigError;
use tracing::debug;
use tracing::info;

use crate::command::CorrelationToken;
use crate::command::TokenSource;
use crate::connection::Connection;
use crate::connection::ConnectionId;
use crate::connection::ConnectionInner;
use crate::error::DispatchError;
use crate::reply::ReplyTo;

// ============================================================================
// SECTION: Bridge
// ============================================================================

/// Factory for serialized engine connections.
#[derive(Debug)]
pub struct Bridge {
    /// Validated configuration shared with every worker.
    config: Arc<BridgeConfig>,
    /// Token generator shared by every connection.
    tokens: Arc<TokenSource>,
    /// Next connection identifier.
    next_connection: AtomicU64,
    /// Weak references to every connection started here.
    registry: Mutex<Vec<Weak<ConnectionInner>>>,
}

impl Bridge {
    /// Creates a bridge from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the configuration fails validation.
    pub fn new(config: BridgeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            tokens: Arc::new(TokenSource::new()),
            next_connection: AtomicU64::new(1),
            registry: Mutex::new(Vec::new()),
        })
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Starts a connection worker with no engine handle open yet.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Spawn`] when the worker thread cannot start.
    pub fn start(&self) -> Result<Connection, DispatchError> {
        let id = ConnectionId::new(self.next_connection.fetch_add(1, Ordering::Relaxed));
        let connection = Connection::spawn(id, Arc::clone(&self.config), Arc::clone(&self.tokens))?;
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.retain(|entry| entry.strong_count() > 0);
        registry.push(Arc::downgrade(connection.inner()));
        Ok(connection)
    }

    /// Starts a connection and queues an open of `path` as its first command.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Spawn`] when the worker thread cannot start.
    pub fn open(
        &self,
        path: impl Into<String>,
        reply_to: ReplyTo,
    ) -> Result<(Connection, CorrelationToken), DispatchError> {
        let connection = self.start()?;
        let token = connection.open(path, reply_to)?;
        Ok((connection, token))
    }

    /// Returns the number of connections that are still alive.
    #[must_use]
    pub fn live_connections(&self) -> usize {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.retain(|entry| entry.strong_count() > 0);
        registry.len()
    }

    /// Tears down every live connection and consumes the bridge.
    pub fn shutdown(self) {
        drop(self);
    }

    /// Tears down every connection still alive.
    fn teardown_all(&self) {
        let entries = mem::take(&mut *self.registry.lock().unwrap_or_else(PoisonError::into_inner));
        let live: Vec<Arc<ConnectionInner>> = entries.iter().filter_map(Weak::upgrade).collect();
        if live.is_empty() {
            return;
        }
        info!(connections = live.len(), "shutting down connections");
        for connection in &live {
            connection.teardown();
        }
        debug!("connections shut down");
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.teardown_all();
    }
}
