//! Wires the connectivity components together and runs their tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::announce::ConnectAnnouncer;
use crate::context::ConnectivityContext;
use crate::error::{ConnectivityError, ConnectivityResult};
use crate::events::ConnectivityEvent;
use crate::liveness::discovery::AutoDiscovery;
use crate::liveness::failure::{ConnectInitializer, FailoverFailureCallback};
use crate::liveness::ping::PingExecutor;
use crate::registration::{RegistrationConfig, RegistrationCoordinator, RegistrationOutcome};
use crate::registry::ConnectionRegistry;
use crate::store::FailoverListStore;
use crate::switchover::SwitchoverController;

/// The agent's connectivity subsystem.
pub struct AgentRuntime {
    ctx: ConnectivityContext,
    store: Arc<FailoverListStore>,
    discovery: Arc<AutoDiscovery>,
    announcer: Arc<ConnectAnnouncer>,
    registry: Arc<ConnectionRegistry>,
    registration: Arc<RegistrationCoordinator>,
    switchover: Arc<SwitchoverController>,
    ping: Arc<PingExecutor>,
    failure_callback: Arc<FailoverFailureCallback>,
    initializer: Arc<ConnectInitializer>,
    shutdown: CancellationToken,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AgentRuntime {
    /// Builds every component from `ctx`.
    #[must_use]
    pub fn new(ctx: ConnectivityContext) -> Arc<Self> {
        Self::with_registration_timing(ctx, RegistrationConfig::default())
    }

    /// Builds every component from `ctx` with custom registration retry timing.
    #[must_use]
    pub fn with_registration_timing(
        ctx: ConnectivityContext,
        timing: RegistrationConfig,
    ) -> Arc<Self> {
        let settings = ctx.config.snapshot();
        let shutdown = CancellationToken::new();

        let store = Arc::new(FailoverListStore::new(
            &settings.data_directory,
            Arc::clone(&ctx.console),
        ));
        let discovery = Arc::new(AutoDiscovery::new(
            Arc::clone(&ctx.config),
            Arc::clone(&ctx.identifier),
            Arc::clone(&ctx.sender),
        ));
        let announcer = Arc::new(ConnectAnnouncer::new(
            Arc::clone(&ctx.config),
            Arc::clone(&ctx.clock),
            Arc::clone(&ctx.updater),
            Arc::clone(&ctx.console),
        ));
        let registry = Arc::new(ConnectionRegistry::new(
            Arc::clone(&ctx.config),
            Arc::clone(&ctx.sender),
            Arc::clone(&ctx.failover_list),
            Arc::clone(&discovery),
            Arc::clone(&announcer),
            ctx.events.clone(),
        ));
        let registration = Arc::new(RegistrationCoordinator::new(
            Arc::clone(&ctx.config),
            Arc::clone(&ctx.sender),
            Arc::clone(&ctx.failover_list),
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&ctx.probe),
            Arc::clone(&ctx.updater),
            Arc::clone(&ctx.console),
            ctx.events.clone(),
            shutdown.clone(),
        )
        .with_timing(timing));
        let switchover = Arc::new(SwitchoverController::new(
            Arc::clone(&ctx.config),
            Arc::clone(&ctx.sender),
            Arc::clone(&ctx.identifier),
            Arc::clone(&ctx.failover_list),
            Arc::clone(&store),
            Arc::clone(&registry),
            ctx.events.clone(),
            settings.switchover_check_interval(),
        ));
        let ping = Arc::new(PingExecutor::new(
            Arc::clone(&ctx.config),
            Arc::clone(&ctx.sender),
            Arc::clone(&discovery),
            Arc::clone(&ctx.clock),
            settings.server_polling_interval(),
        ));
        let failure_callback = Arc::new(FailoverFailureCallback::new(
            Arc::clone(&registry),
            Arc::clone(&ctx.failover_list),
            Arc::clone(&ctx.predicate),
        ));
        let initializer = Arc::new(ConnectInitializer::new(
            Arc::clone(&announcer),
            Arc::clone(&registry),
            Arc::clone(&ctx.predicate),
        ));

        Arc::new(Self {
            ctx,
            store,
            discovery,
            announcer,
            registry,
            registration,
            switchover,
            ping,
            failure_callback,
            initializer,
            shutdown,
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Loads persisted state and starts the background tasks.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectivityError::AlreadyStarted`] on a second call.
    pub fn start(self: &Arc<Self>) -> ConnectivityResult<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ConnectivityError::AlreadyStarted);
        }

        let list = self.ctx.failover_list.replace(self.store.load());
        info!(servers = list.size(), "failover list loaded");

        if !self.discovery.prepare() {
            info!("server auto-detection disabled; polling the server instead");
            self.ctx.sender.start_server_polling();
        }

        let settings = self.ctx.config.snapshot();
        let register_on_start =
            settings.register_with_server_at_startup || !self.registration.is_registered();
        let mut tasks = vec![
            self.spawn_dispatcher(register_on_start, settings.wait_for_registration()),
        ];
        tasks.push(self.ping.spawn(self.shutdown.child_token()));
        if let Some(worker) = self.switchover.start(&self.shutdown) {
            tasks.push(worker);
        }
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).extend(tasks);
        info!(register_on_start, "connectivity runtime started");
        Ok(())
    }

    fn spawn_dispatcher(
        self: &Arc<Self>,
        register_on_start: bool,
        wait: Duration,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let mut events = self.ctx.events.subscribe();
        let cancel = self.shutdown.child_token();
        let mut register_pending = register_on_start;
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    event = events.recv() => event,
                };
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "connectivity event dispatcher fell behind");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                match &event {
                    ConnectivityEvent::SenderStarted if register_pending => {
                        register_pending = false;
                        let registration = Arc::clone(&this.registration);
                        tokio::spawn(async move {
                            let outcome = registration.register_with_server(wait, false).await;
                            debug!(?outcome, "startup registration wait finished");
                        });
                    }
                    ConnectivityEvent::ServerOnline { .. }
                    | ConnectivityEvent::ServerOffline { .. } => {
                        this.discovery.dispatch(&event).await;
                    }
                    _ => {}
                }
            }
            debug!("connectivity event dispatcher stopped");
        })
    }

    /// Stops every background task and cancels any registration in progress.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.switchover.stop();
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(err) = task.await {
                warn!(%err, "connectivity task ended abnormally");
            }
        }
        info!("connectivity runtime stopped");
    }

    /// Switches to an operator supplied server; see [`ConnectionRegistry::switch_to_server`].
    pub async fn switch_to_server(&self, target: &str) -> bool {
        self.registry.switch_to_server(target).await
    }

    /// Registers now; see [`RegistrationCoordinator::register_with_server`].
    pub async fn register_with_server(
        &self,
        max_wait: Duration,
        regenerate_token: bool,
    ) -> Option<RegistrationOutcome> {
        self.registration
            .register_with_server(max_wait, regenerate_token)
            .await
    }

    /// Asks the switchover worker to check the primary server now.
    pub fn perform_primary_server_switchover_check(&self) {
        self.switchover.check_now();
    }

    /// Shared context.
    #[must_use]
    pub const fn context(&self) -> &ConnectivityContext {
        &self.ctx
    }

    /// Failover list persistence.
    #[must_use]
    pub const fn store(&self) -> &Arc<FailoverListStore> {
        &self.store
    }

    /// Connect announcer.
    #[must_use]
    pub const fn announcer(&self) -> &Arc<ConnectAnnouncer> {
        &self.announcer
    }

    /// Switch coordination.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Registration coordination.
    #[must_use]
    pub const fn registration(&self) -> &Arc<RegistrationCoordinator> {
        &self.registration
    }

    /// Primary server switchover.
    #[must_use]
    pub const fn switchover(&self) -> &Arc<SwitchoverController> {
        &self.switchover
    }

    /// Server ping.
    #[must_use]
    pub const fn ping(&self) -> &Arc<PingExecutor> {
        &self.ping
    }

    /// Auto-discovery.
    #[must_use]
    pub const fn discovery(&self) -> &Arc<AutoDiscovery> {
        &self.discovery
    }

    /// Callback the command sender invokes on delivery failures.
    #[must_use]
    pub const fn failure_callback(&self) -> &Arc<FailoverFailureCallback> {
        &self.failure_callback
    }

    /// Hook the communicator invokes when it first connects.
    #[must_use]
    pub const fn connect_initializer(&self) -> &Arc<ConnectInitializer> {
        &self.initializer
    }
}

impl std::fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("started", &self.started.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}
