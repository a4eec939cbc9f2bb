//! Reaction to server online/offline announcements.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use agent_config::ConfigStore;
use agent_primitives::ServerLocator;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::events::ConnectivityEvent;
use crate::transport::{CommandSender, ServerIdentifier};

/// Starts and stops the command sender as the tracked server comes and goes.
pub struct AutoDiscoveryListener {
    configured: ServerLocator,
    canonical: AsyncMutex<Option<ServerLocator>>,
    identifier: Arc<dyn ServerIdentifier>,
    sender: Arc<dyn CommandSender>,
    identify_warned: Arc<AtomicBool>,
}

impl AutoDiscoveryListener {
    fn new(
        configured: ServerLocator,
        identifier: Arc<dyn ServerIdentifier>,
        sender: Arc<dyn CommandSender>,
        identify_warned: Arc<AtomicBool>,
    ) -> Self {
        Self {
            configured,
            canonical: AsyncMutex::new(None),
            identifier,
            sender,
            identify_warned,
        }
    }

    /// Locator this listener was prepared for.
    #[must_use]
    pub fn configured(&self) -> &ServerLocator {
        &self.configured
    }

    /// Handles an "online" announcement.
    pub async fn server_online(&self, advertised_uri: &str) {
        if !self.is_tracked(advertised_uri).await {
            debug!(advertised_uri, "ignoring online announcement for another server");
            return;
        }
        if self.sender.start_sending() {
            info!(advertised_uri, "server came online; command sending started");
        } else {
            debug!(advertised_uri, "server came online; sender was already running");
        }
    }

    /// Handles an "offline" announcement.
    pub async fn server_offline(&self, advertised_uri: &str) {
        if !self.is_tracked(advertised_uri).await {
            debug!(advertised_uri, "ignoring offline announcement for another server");
            return;
        }
        info!(advertised_uri, "server went offline; command sending stopped");
        self.sender.stop_sending(false);
    }

    async fn is_tracked(&self, advertised_uri: &str) -> bool {
        let advertised: ServerLocator = match advertised_uri.parse() {
            Ok(locator) => locator,
            Err(err) => {
                debug!(advertised_uri, %err, "unparseable server announcement");
                return false;
            }
        };
        self.canonical().await.same_host_port(&advertised)
    }

    async fn canonical(&self) -> ServerLocator {
        let mut canonical = self.canonical.lock().await;
        if let Some(locator) = canonical.as_ref() {
            return locator.clone();
        }

        let identified = match self.identifier.identify(&self.configured).await {
            Ok(identity) => identity
                .locator_uri
                .parse::<ServerLocator>()
                .map_err(|err| err.to_string()),
            Err(err) => Err(err.to_string()),
        };
        match identified {
            Ok(locator) => {
                let configured = &self.configured;
                debug!(%configured, canonical = %locator, "identified tracked server");
                *canonical = Some(locator.clone());
                locator
            }
            Err(err) => {
                if self.identify_warned.swap(true, Ordering::AcqRel) {
                    debug!(server = %self.configured, %err, "server identification failed");
                } else {
                    warn!(
                        server = %self.configured,
                        %err,
                        "server identification failed; matching against the configured address"
                    );
                }
                self.configured.clone()
            }
        }
    }
}

/// Owns the active [`AutoDiscoveryListener`], if auto-detection is enabled.
pub struct AutoDiscovery {
    config: Arc<ConfigStore>,
    identifier: Arc<dyn ServerIdentifier>,
    sender: Arc<dyn CommandSender>,
    listener: Mutex<Option<Arc<AutoDiscoveryListener>>>,
    identify_warned: Arc<AtomicBool>,
}

impl AutoDiscovery {
    /// Creates an unprepared discovery component.
    #[must_use]
    pub fn new(
        config: Arc<ConfigStore>,
        identifier: Arc<dyn ServerIdentifier>,
        sender: Arc<dyn CommandSender>,
    ) -> Self {
        Self {
            config,
            identifier,
            sender,
            listener: Mutex::new(None),
            identify_warned: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Installs a listener for the configured server when auto-detection is on.
    ///
    /// Returns `true` when a listener is active afterwards.
    pub fn prepare(&self) -> bool {
        let settings = self.config.snapshot();
        let mut listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        if !settings.server_auto_detection {
            *listener = None;
            return false;
        }
        debug!(server = %settings.server, "auto-discovery listening for server announcements");
        *listener = Some(Arc::new(AutoDiscoveryListener::new(
            settings.server,
            Arc::clone(&self.identifier),
            Arc::clone(&self.sender),
            Arc::clone(&self.identify_warned),
        )));
        true
    }

    /// Removes the active listener.
    pub fn unprepare(&self) {
        if self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            debug!("auto-discovery listener removed");
        }
    }

    /// Returns `true` while a listener is installed.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.current().is_some()
    }

    /// Active listener, if any.
    #[must_use]
    pub fn current(&self) -> Option<Arc<AutoDiscoveryListener>> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Routes online/offline announcements to the active listener.
    pub async fn dispatch(&self, event: &ConnectivityEvent) {
        let Some(listener) = self.current() else {
            return;
        };
        match event {
            ConnectivityEvent::ServerOnline { locator_uri } => {
                listener.server_online(locator_uri).await;
            }
            ConnectivityEvent::ServerOffline { locator_uri } => {
                listener.server_offline(locator_uri).await;
            }
            _ => {}
        }
    }
}

impl std::fmt::Debug for AutoDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoDiscovery")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}
