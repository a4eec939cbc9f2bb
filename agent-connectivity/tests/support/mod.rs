#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_config::{AgentSettings, ConfigStore};
use agent_connectivity::wire::{
    ConnectAgentRequest, ConnectAgentResults, PingRequest, PingResponse, RegistrationRequest,
    RegistrationResults, ServerIdentity,
};
use agent_connectivity::{
    AgentRuntime, AgentUpdater, CollectingConsole, CommError, CommResult, CommandSender,
    ConnectivityContext, ReachabilityProbe, ServerConnection, ServerIdentifier,
};
use agent_primitives::{ServerEndpoint, ServerLocator, Transport};
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use tokio::time::Instant;
use uuid::Uuid;

pub fn endpoint(address: &str) -> ServerEndpoint {
    ServerEndpoint::new(address, 7080, 7443).unwrap()
}

pub fn locator(address: &str) -> ServerLocator {
    ServerLocator::new(Transport::Socket, address, 7080, "").unwrap()
}

pub fn endpoints(addresses: &[&str]) -> Vec<ServerEndpoint> {
    addresses.iter().map(|address| endpoint(address)).collect()
}

fn host_of(uri: &str) -> String {
    uri.parse::<ServerLocator>()
        .map(|locator| locator.address().to_owned())
        .unwrap_or_default()
}

pub enum RegisterReply {
    Token(String),
    Fail(CommError),
    Hang,
}

#[derive(Default)]
pub struct FakeServer {
    endpoint: Mutex<String>,
    token: Mutex<Option<String>>,
    replies: Mutex<VecDeque<RegisterReply>>,
    failover_list: Mutex<Option<Vec<ServerEndpoint>>>,
    down_hosts: Mutex<HashSet<String>>,
    connect_error: Mutex<Option<CommError>>,
    ping_error: Mutex<Option<CommError>>,
    ping_lag_secs: Mutex<i64>,
    requests: Mutex<Vec<RegistrationRequest>>,
    tokens_at_register: Mutex<Vec<Option<String>>>,
    register_times: Mutex<Vec<Instant>>,
    pub register_calls: AtomicUsize,
    pub connect_calls: AtomicUsize,
    pub ping_calls: AtomicUsize,
    pub endpoint_changes: AtomicUsize,
}

impl FakeServer {
    pub fn new(endpoint: &ServerLocator) -> Self {
        let server = Self::default();
        *server.endpoint.lock().unwrap() = endpoint.to_uri();
        server
    }

    pub fn queue(&self, reply: RegisterReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn set_failover_list(&self, list: Option<Vec<ServerEndpoint>>) {
        *self.failover_list.lock().unwrap() = list;
    }

    pub fn set_down(&self, host: &str, down: bool) {
        let mut hosts = self.down_hosts.lock().unwrap();
        if down {
            hosts.insert(host.to_owned());
        } else {
            hosts.remove(host);
        }
    }

    pub fn fail_connects_with(&self, error: Option<CommError>) {
        *self.connect_error.lock().unwrap() = error;
    }

    pub fn fail_pings_with(&self, error: Option<CommError>) {
        *self.ping_error.lock().unwrap() = error;
    }

    pub fn set_ping_lag_secs(&self, lag: i64) {
        *self.ping_lag_secs.lock().unwrap() = lag;
    }

    pub fn endpoint(&self) -> String {
        self.endpoint.lock().unwrap().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<RegistrationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn tokens_at_register(&self) -> Vec<Option<String>> {
        self.tokens_at_register.lock().unwrap().clone()
    }

    pub fn register_times(&self) -> Vec<Instant> {
        self.register_times.lock().unwrap().clone()
    }

    pub fn registers(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerConnection for FakeServer {
    fn remote_endpoint(&self) -> String {
        self.endpoint()
    }

    fn set_remote_endpoint(&self, uri: &str) -> CommResult<()> {
        self.endpoint_changes.fetch_add(1, Ordering::SeqCst);
        *self.endpoint.lock().unwrap() = uri.to_owned();
        Ok(())
    }

    fn set_security_token(&self, token: Option<String>) {
        *self.token.lock().unwrap() = token;
    }

    async fn register_agent(
        &self,
        request: RegistrationRequest,
    ) -> CommResult<RegistrationResults> {
        let call = self.register_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request);
        self.tokens_at_register.lock().unwrap().push(self.token());
        self.register_times.lock().unwrap().push(Instant::now());

        let reply = self.replies.lock().unwrap().pop_front();
        let token = match reply {
            Some(RegisterReply::Token(token)) => token,
            Some(RegisterReply::Fail(err)) => return Err(err),
            Some(RegisterReply::Hang) => std::future::pending().await,
            None => format!("token-{call}"),
        };
        Ok(RegistrationResults {
            agent_token: token,
            failover_list: self.failover_list.lock().unwrap().clone(),
        })
    }

    async fn connect_agent(
        &self,
        _request: ConnectAgentRequest,
    ) -> CommResult<ConnectAgentResults> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let endpoint = self.endpoint();
        if let Some(err) = self.connect_error.lock().unwrap().clone() {
            return Err(err);
        }
        if self.down_hosts.lock().unwrap().contains(&host_of(&endpoint)) {
            return Err(CommError::cannot_connect(endpoint, "connection refused"));
        }
        Ok(ConnectAgentResults {
            server_time: Utc::now(),
            is_down: false,
        })
    }

    async fn ping(&self, _request: PingRequest) -> CommResult<PingResponse> {
        self.ping_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.ping_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(PingResponse {
            reply_server_timestamp: Utc::now()
                - TimeDelta::seconds(*self.ping_lag_secs.lock().unwrap()),
        })
    }

    async fn get_failover_list(
        &self,
        _agent_name: &str,
    ) -> CommResult<Option<Vec<ServerEndpoint>>> {
        Ok(self.failover_list.lock().unwrap().clone())
    }
}

pub struct FakeSender {
    sending: AtomicBool,
    polling: AtomicBool,
    server: Option<Arc<FakeServer>>,
    stops: Mutex<Vec<bool>>,
}

impl FakeSender {
    pub fn new(server: Option<Arc<FakeServer>>) -> Self {
        Self {
            sending: AtomicBool::new(true),
            polling: AtomicBool::new(false),
            server,
            stops: Mutex::new(Vec::new()),
        }
    }

    pub fn set_sending(&self, sending: bool) {
        self.sending.store(sending, Ordering::SeqCst);
    }

    pub fn set_polling(&self, polling: bool) {
        self.polling.store(polling, Ordering::SeqCst);
    }

    pub fn is_sending_now(&self) -> bool {
        self.sending.load(Ordering::SeqCst)
    }

    pub fn is_polling_now(&self) -> bool {
        self.polling.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> Vec<bool> {
        self.stops.lock().unwrap().clone()
    }
}

impl CommandSender for FakeSender {
    fn is_sending(&self) -> bool {
        self.sending.load(Ordering::SeqCst)
    }

    fn start_sending(&self) -> bool {
        !self.sending.swap(true, Ordering::SeqCst)
    }

    fn stop_sending(&self, drain: bool) {
        self.stops.lock().unwrap().push(drain);
        self.sending.store(false, Ordering::SeqCst);
    }

    fn is_server_polling(&self) -> bool {
        self.polling.load(Ordering::SeqCst)
    }

    fn start_server_polling(&self) {
        self.polling.store(true, Ordering::SeqCst);
    }

    fn stop_server_polling(&self) {
        self.polling.store(false, Ordering::SeqCst);
    }

    fn connection(&self) -> Option<Arc<dyn ServerConnection>> {
        self.server
            .clone()
            .map(|server| server as Arc<dyn ServerConnection>)
    }
}

#[derive(Default)]
pub struct FakeIdentifier {
    reachable: Mutex<HashSet<String>>,
    canonical: Mutex<HashMap<String, String>>,
    pub calls: AtomicUsize,
}

impl FakeIdentifier {
    pub fn set_reachable(&self, host: &str) {
        self.reachable.lock().unwrap().insert(host.to_owned());
    }

    pub fn set_canonical(&self, host: &str, uri: &str) {
        self.set_reachable(host);
        self.canonical
            .lock()
            .unwrap()
            .insert(host.to_owned(), uri.to_owned());
    }
}

#[async_trait]
impl ServerIdentifier for FakeIdentifier {
    async fn identify(&self, locator: &ServerLocator) -> CommResult<ServerIdentity> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.reachable.lock().unwrap().contains(locator.address()) {
            return Err(CommError::cannot_connect(locator.to_uri(), "no route to host"));
        }
        let locator_uri = self
            .canonical
            .lock()
            .unwrap()
            .get(locator.address())
            .cloned()
            .unwrap_or_else(|| locator.to_uri());
        Ok(ServerIdentity { locator_uri })
    }
}

#[derive(Default)]
pub struct FakeProbe {
    unreachable: Mutex<HashSet<String>>,
    pub calls: AtomicUsize,
}

impl FakeProbe {
    pub fn set_unreachable(&self, host: &str) {
        self.unreachable.lock().unwrap().insert(host.to_owned());
    }
}

#[async_trait]
impl ReachabilityProbe for FakeProbe {
    async fn is_reachable(&self, endpoint: &ServerEndpoint) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        !self.unreachable.lock().unwrap().contains(endpoint.address())
    }
}

#[derive(Default)]
pub struct RecordingUpdater {
    pub calls: AtomicUsize,
}

#[async_trait]
impl AgentUpdater for RecordingUpdater {
    async fn update_agent_now(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub runtime: Arc<AgentRuntime>,
    pub config: Arc<ConfigStore>,
    pub server: Arc<FakeServer>,
    pub sender: Arc<FakeSender>,
    pub identifier: Arc<FakeIdentifier>,
    pub probe: Arc<FakeProbe>,
    pub updater: Arc<RecordingUpdater>,
    pub console: Arc<CollectingConsole>,
    pub data_dir: PathBuf,
}

impl Harness {
    /// Agent pointed at `s1`, sending, with auto-detection off.
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    pub fn with_settings(configure: impl FnOnce(&mut AgentSettings)) -> Self {
        let data_dir = std::env::temp_dir().join(format!("agent-connectivity-{}", Uuid::new_v4()));
        let mut settings = AgentSettings {
            agent_name: "web-01".into(),
            server: locator("s1"),
            data_directory: data_dir.clone(),
            ..AgentSettings::default()
        };
        configure(&mut settings);

        let config = Arc::new(ConfigStore::in_memory(settings.clone()));
        let server = Arc::new(FakeServer::new(&settings.server));
        let sender = Arc::new(FakeSender::new(Some(Arc::clone(&server))));
        let identifier = Arc::new(FakeIdentifier::default());
        let probe = Arc::new(FakeProbe::default());
        let updater = Arc::new(RecordingUpdater::default());
        let console = Arc::new(CollectingConsole::new());

        let ctx =
            ConnectivityContext::builder(Arc::clone(&config), sender.clone(), identifier.clone())
                .probe(probe.clone())
                .updater(updater.clone())
                .console(console.clone())
                .build();
        let runtime = AgentRuntime::new(ctx);

        Self {
            runtime,
            config,
            server,
            sender,
            identifier,
            probe,
            updater,
            console,
            data_dir,
        }
    }

    pub fn connection(&self) -> Arc<dyn ServerConnection> {
        self.server.clone()
    }

    pub fn install_list(&self, addresses: &[&str]) {
        self.runtime
            .context()
            .failover_list
            .replace(agent_connectivity::FailoverList::new(endpoints(addresses)));
    }

    pub fn server_address(&self) -> String {
        self.config.server_locator().address().to_owned()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}

/// Polls `condition` every 10ms until it holds or ten seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..1000 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
