// Network Client - the connector a server instance talks to
//
// Owns the link to the master, the correlator, the sync store, the node
// registry and the poll loop. Cloning is cheap; collaborators that need a
// back-reference hold a WeakNetworkClient.

use crate::client::{
    ClientBuilder, ClientConfig, ClientError, HostState, NodeRegistry, RosterProvider,
    GET_PLAYER, GET_PLAYERS,
};
use crate::correlator::{CorrelatorStats, ReplyOutcome, RequestCorrelator};
use crate::handshake::{Handshake, HandshakeParams, HandshakeState, Session, StateCell};
use crate::protocol::{
    DetailsListReply, DetailsReply, InstanceDetails, InstanceMessage, NetHealthData,
    NetworkSyncEntry, PingResponse,
};
use crate::schedule::ScheduledTask;
use crate::sync::{
    ClusterMembership, PollLoop, PollStats, PollTick, SyncError, SyncStore, PLUGINS_KEY,
    ROUND_KEY, STARTUP_KEY,
};
use crate::transport::{Auth, ErrorHandler, MasterLink, StatusEnvelope, Transport};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

struct ClientInner {
    config: ClientConfig,
    link: MasterLink,
    correlator: RequestCorrelator,
    store: SyncStore,
    nodes: NodeRegistry,
    poll: PollLoop,
    roster: Option<Arc<dyn RosterProvider>>,
    host: Arc<dyn HostState>,
    state: StateCell,
    session: RwLock<Option<Session>>,
    started: AtomicBool,
    // Bumped by every disconnect; a connect that sees it move gives up
    generation: AtomicU64,
    push_task: Mutex<Option<ScheduledTask>>,
    created_at: DateTime<Utc>,
}

/// Handle to a cluster connector
#[derive(Clone)]
pub struct NetworkClient {
    inner: Arc<ClientInner>,
}

/// Non-owning handle, upgraded on use
#[derive(Clone)]
pub struct WeakNetworkClient {
    inner: Weak<ClientInner>,
}

impl WeakNetworkClient {
    pub fn upgrade(&self) -> Option<NetworkClient> {
        self.inner.upgrade().map(|inner| NetworkClient { inner })
    }
}

impl fmt::Debug for WeakNetworkClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakNetworkClient")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

// Undoes a half-finished connect unless disarmed. A disconnect that ran in
// the meantime already tore everything down, so a stale guard does nothing.
struct ConnectGuard<'a> {
    inner: &'a ClientInner,
    generation: u64,
    armed: bool,
}

impl ConnectGuard<'_> {
    fn is_stale(&self) -> bool {
        self.inner.generation.load(Ordering::SeqCst) != self.generation
    }
}

impl ConnectGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        if !self.armed || self.is_stale() {
            return;
        }
        self.inner.push_task.lock().take();
        self.inner.session.write().take();
        self.inner.link.clear_session_token();
        self.inner.poll.reset();
        {
            let mut state = self.inner.state.write();
            if !state.is_failed() {
                *state = HandshakeState::Failed("connect aborted".to_string());
            }
        }
        self.inner.started.store(false, Ordering::SeqCst);
    }
}

impl NetworkClient {
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Client over HTTP with no nodes and no roster
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        ClientBuilder::new(config).build()
    }

    pub(crate) fn assemble(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        nodes: NodeRegistry,
        roster: Option<Arc<dyn RosterProvider>>,
        host: Arc<dyn HostState>,
    ) -> Self {
        let link = MasterLink::new(transport);
        let correlator = RequestCorrelator::new(config.correlator.clone());
        let store = SyncStore::new(link.clone());
        let poll = PollLoop::new(
            link.clone(),
            correlator.clone(),
            nodes.clone(),
            config.poll.clone(),
        );

        Self {
            inner: Arc::new(ClientInner {
                config,
                link,
                correlator,
                store,
                nodes,
                poll,
                roster,
                host,
                state: StateCell::default(),
                session: RwLock::new(None),
                started: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                push_task: Mutex::new(None),
                created_at: Utc::now(),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakNetworkClient {
        WeakNetworkClient {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Run the handshake and start publishing sync entries.
    ///
    /// Fails with `AlreadyStarted` while a connect is running or has
    /// succeeded. On failure the client is left not started and may connect
    /// again. A `disconnect` issued while the handshake is in flight makes
    /// this return `NotConnected` without installing a session.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(ClientError::AlreadyStarted);
        }
        let guard = ConnectGuard {
            inner: &self.inner,
            generation: self.inner.generation.load(Ordering::SeqCst),
            armed: true,
        };

        info!(
            master = %self.inner.config.base_url,
            name = %self.inner.config.client_name,
            "connecting to cluster master"
        );

        let params = HandshakeParams {
            client_name: self.inner.config.client_name.clone(),
            port: self.inner.config.port,
            secret: self.inner.config.secret.clone(),
        };
        let handshake = Handshake::new(&self.inner.link, &params, self.inner.state.clone());
        let outcome = handshake.run().await;
        if guard.is_stale() {
            info!("connect abandoned by disconnect");
            return Err(ClientError::NotConnected);
        }
        let session = match outcome {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "handshake with master failed");
                return Err(e.into());
            }
        };

        {
            let mut slot = self.inner.session.write();
            if guard.is_stale() {
                return Err(ClientError::NotConnected);
            }
            self.inner.link.set_session_token(session.session_token());
            self.inner
                .poll
                .membership_cell()
                .write()
                .set_self(session.client_identifier());
            info!(
                client_id = session.client_identifier(),
                priority = session.migration_priority(),
                "connected to cluster master"
            );
            *slot = Some(session);
        }

        if let Err(e) = self.on_connected(guard.generation) {
            warn!(error = %e, "connect did not complete");
            return Err(e);
        }
        guard.disarm();
        Ok(())
    }

    /// Stop background work and forget the session.
    ///
    /// Pending requests resolve as `Cancelled`. Once this returns no push
    /// tick runs until the next connect.
    pub async fn disconnect(&self) {
        let was_started = self.inner.started.swap(false, Ordering::SeqCst);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);

        let task = self.inner.push_task.lock().take();
        if let Some(task) = task {
            task.stop().await;
        }

        let cancelled = self.inner.correlator.clear();
        {
            let mut session = self.inner.session.write();
            self.inner.link.clear_session_token();
            session.take();
        }
        self.inner.poll.reset();
        self.inner.link.release().await;

        {
            let mut state = self.inner.state.write();
            if state.can_transition_to(&HandshakeState::Disconnected) {
                *state = HandshakeState::Disconnected;
            }
        }

        if was_started {
            info!(cancelled, "disconnected from cluster master");
        }
    }

    // Fails with NotConnected when a disconnect overtook the connect; no
    // push task is left behind in that case
    fn on_connected(&self, generation: u64) -> Result<(), ClientError> {
        self.inner.nodes.start_client(self);
        self.inner.nodes.reconfigure(self.inner.config.authority);

        if let Err(e) = self.publish_startup_entries() {
            warn!(error = %e, "could not publish startup entries");
        }
        self.refresh_round();

        let mut slot = self.inner.push_task.lock();
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            return Err(ClientError::NotConnected);
        }
        let weak = self.downgrade();
        let task = ScheduledTask::spawn(
            "sync-push",
            self.inner.config.sync_push_interval(),
            move || {
                let weak = weak.clone();
                async move {
                    if let Some(client) = weak.upgrade() {
                        client.push_sync_entries().await;
                    }
                }
            },
        );
        if let Some(previous) = slot.replace(task) {
            warn!(task = previous.name(), "replaced a running push task");
        }
        Ok(())
    }

    fn publish_startup_entries(&self) -> Result<(), SyncError> {
        let store = &self.inner.store;
        store.set(PLUGINS_KEY, &self.inner.host.plugin_manifest())?;

        let health = NetHealthData {
            client_id: self.client_identifier().unwrap_or_default(),
            client_name: self.inner.config.client_name.clone(),
            startup_timestamp: self.inner.created_at.timestamp(),
        };
        store.set(STARTUP_KEY, &health)
    }

    fn refresh_round(&self) {
        if let Err(e) = self.inner.store.set(ROUND_KEY, &self.inner.host.round_marker()) {
            warn!(error = %e, "could not publish round marker");
        }
    }

    async fn push_sync_entries(&self) {
        if !self.is_started() {
            return;
        }
        let Some(client_id) = self.client_identifier() else {
            return;
        };
        self.refresh_round();
        if !self.inner.store.push(&client_id).await {
            debug!("sync push did not reach the master");
        }
    }

    // ========================================================================
    // POLLING
    // ========================================================================

    /// Ping the master once; `None` when not connected or on failure
    pub async fn poll(&self) -> Option<PingResponse> {
        let epoch = self.inner.poll.epoch();
        if !self.is_authenticated() {
            return None;
        }
        self.inner.poll.poll_in(epoch).await
    }

    /// Poll once and classify the outcome against the configured policy
    pub async fn poll_tick(&self) -> PollTick {
        let epoch = self.inner.poll.epoch();
        if !self.is_authenticated() {
            return PollTick::Missed {
                consecutive: self.inner.poll.consecutive_misses(),
            };
        }
        self.inner.poll.tick_in(epoch).await
    }

    /// Poll every `period` until the returned task is stopped or dropped.
    ///
    /// `on_tick` sees every outcome; reconnecting is left to the caller.
    pub fn spawn_poll_loop<F>(&self, period: Duration, on_tick: F) -> ScheduledTask
    where
        F: Fn(PollTick) + Send + Sync + 'static,
    {
        let weak = self.downgrade();
        let on_tick = Arc::new(on_tick);
        ScheduledTask::spawn("poll", period, move || {
            let weak = weak.clone();
            let on_tick = on_tick.clone();
            async move {
                if let Some(client) = weak.upgrade() {
                    on_tick(client.poll_tick().await);
                }
            }
        })
    }

    // ========================================================================
    // MESSAGING
    // ========================================================================

    /// Post a message to the master for delivery; the sender is stamped here
    pub async fn send_message(&self, message: InstanceMessage) -> Result<(), ClientError> {
        let sender = self.require_client_id()?;
        let message = message.with_sender(&sender);
        self.inner
            .link
            .try_post::<StatusEnvelope, _>("/post", &message, Auth::Bearer)
            .await?;
        Ok(())
    }

    /// Post `message` and wait for a reply carrying its reference id under
    /// `reply_subject`, up to the correlator TTL
    pub async fn send_and_await(
        &self,
        message: InstanceMessage,
        reply_subject: &str,
    ) -> Result<ReplyOutcome, ClientError> {
        let sender = self.require_client_id()?;
        let message = message.with_sender(&sender);
        let link = self.inner.link.clone();

        let outcome = self
            .inner
            .correlator
            .send_and_await(message, reply_subject, move |message| async move {
                link.try_post::<StatusEnvelope, _>("/post", &message, Auth::Bearer)
                    .await
                    .map(|_| ())
            })
            .await?;
        Ok(outcome)
    }

    /// `send_and_await` on the message's default reply subject
    pub async fn request(&self, message: InstanceMessage) -> Result<ReplyOutcome, ClientError> {
        let reply_subject = message.reply_subject();
        self.send_and_await(message, &reply_subject).await
    }

    // ========================================================================
    // CLUSTER QUERIES
    // ========================================================================

    /// Details the master holds about one client
    pub async fn details(&self, client_id: &str) -> Option<InstanceDetails> {
        let path = format!("/client/{}/details", client_id);
        self.inner
            .link
            .get::<DetailsReply>(&path, &ErrorHandler::log("client::details"))
            .await
            .map(|reply| reply.details)
    }

    /// Details of every connected client; empty on failure
    pub async fn all_details(&self) -> Vec<InstanceDetails> {
        self.inner
            .link
            .get::<DetailsListReply>("/client/all/details", &ErrorHandler::log("client::all_details"))
            .await
            .map(|reply| reply.details)
            .unwrap_or_default()
    }

    /// Ask the cluster for a player; `None` if nobody answers in time
    pub async fn get_player<T: DeserializeOwned>(&self, uid: &str) -> Option<T> {
        if let Some(player) = self.inner.roster.as_ref().and_then(|r| r.find_player(uid)) {
            return serde_json::from_value(player).ok();
        }

        let message = InstanceMessage::broadcast(GET_PLAYER, Value::String(uid.to_string()));
        match self.request(message).await {
            Ok(outcome) => outcome.into_message()?.payload_as(),
            Err(e) => {
                warn!(error = %e, uid, "player lookup failed");
                None
            }
        }
    }

    /// Every player on this instance plus every player reported by the
    /// other connected instances
    pub async fn get_all_players<T>(&self) -> Vec<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let mut players: Vec<T> = self
            .inner
            .roster
            .as_ref()
            .map(|r| r.local_players())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| serde_json::from_value(p).ok())
            .collect();

        let mut requests = JoinSet::new();
        for client_id in self.membership().others() {
            let client = self.clone();
            requests.spawn(async move {
                let message = InstanceMessage::direct(GET_PLAYERS, Value::Null, &client_id);
                (client_id, client.request(message).await)
            });
        }

        while let Some(joined) = requests.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => {
                    if let Some(list) = outcome.into_message().and_then(|m| m.payload_as::<Vec<T>>())
                    {
                        players.extend(list);
                    }
                }
                Ok((client_id, Err(e))) => {
                    warn!(error = %e, %client_id, "roster request failed");
                }
                Err(e) => warn!(error = %e, "roster request task failed"),
            }
        }
        players
    }

    // ========================================================================
    // SYNC VARS
    // ========================================================================

    pub fn sync_store(&self) -> &SyncStore {
        &self.inner.store
    }

    /// Fetch a var from the master's table
    pub async fn request_var<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.inner.store.request_remote(key).await
    }

    /// Write a var into the master's table
    pub async fn set_var<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        self.inner.store.set_remote(key, value).await
    }

    /// The master's whole table
    pub async fn all_vars(&self) -> Vec<NetworkSyncEntry> {
        self.inner.store.dump_all_remote().await
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn state(&self) -> HandshakeState {
        self.inner.state.read().clone()
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_started() && self.state().is_authenticated()
    }

    pub fn session_token(&self) -> Option<String> {
        self.inner.link.session_token()
    }

    /// Identifier the master assigned during the handshake
    pub fn client_identifier(&self) -> Option<String> {
        self.inner
            .session
            .read()
            .as_ref()
            .map(|s| s.client_identifier().to_string())
    }

    /// Assigned priority once connected, the configured seed before that
    pub fn migration_priority(&self) -> i32 {
        self.inner
            .session
            .read()
            .as_ref()
            .map(|s| s.migration_priority())
            .unwrap_or(self.inner.config.migration_priority_seed)
    }

    pub fn membership(&self) -> ClusterMembership {
        self.inner.poll.membership()
    }

    pub fn latest_var_hash(&self) -> Option<String> {
        self.inner.poll.latest_var_hash()
    }

    pub fn poll_stats(&self) -> PollStats {
        self.inner.poll.stats()
    }

    pub fn correlator(&self) -> &RequestCorrelator {
        &self.inner.correlator
    }

    pub fn correlator_stats(&self) -> CorrelatorStats {
        self.inner.correlator.stats()
    }

    pub fn nodes(&self) -> &NodeRegistry {
        &self.inner.nodes
    }

    /// When this client was built
    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    fn require_client_id(&self) -> Result<String, ClientError> {
        if !self.is_authenticated() {
            return Err(ClientError::NotConnected);
        }
        self.client_identifier().ok_or(ClientError::NotConnected)
    }
}

impl fmt::Debug for NetworkClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkClient")
            .field("master", &self.inner.config.base_url)
            .field("state", &self.state())
            .field("client_id", &self.client_identifier())
            .finish()
    }
}
