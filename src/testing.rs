//! In-memory fakes for the host window, identity provider and gateway.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use url::Url;

use crate::auth::{
    HostCapabilities, HostWindow, ListenerId, PopupMessage, PopupWindow, WindowMessage,
};
use crate::config::PopupSpec;
use crate::mutation::{RemoteOp, VoteDirection};
use crate::remote::{GatewayError, IdentityProvider, RemoteGateway};
use crate::session::{Session, SessionTokens, test_identity};
use crate::types::ResourceId;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap()
}

// ── Host window ────────────────────────────────────────────────────

/// Popup that reports closed once `closes_after` polls have been made.
pub(crate) struct FakePopup {
    polls: Arc<AtomicU32>,
    closes_after: Option<u32>,
}

impl PopupWindow for FakePopup {
    fn is_closed(&self) -> bool {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        self.closes_after.is_some_and(|n| polls > n)
    }
}

#[derive(Default)]
struct HostState {
    listeners: HashMap<u64, UnboundedSender<WindowMessage>>,
    next_listener: u64,
    added: u32,
    removed: Vec<ListenerId>,
    scripted: Vec<WindowMessage>,
    opened: Vec<(Url, PopupSpec)>,
    navigations: Vec<String>,
    reloads: Vec<String>,
    posted: Vec<(PopupMessage, String)>,
    closed: bool,
    storage: HashMap<String, String>,
}

pub(crate) struct FakeHost {
    hostname: String,
    capabilities: HostCapabilities,
    current_url: Url,
    has_opener: bool,
    block_popups: AtomicBool,
    popup_closes_after: Mutex<Option<u32>>,
    popup_polls: Arc<AtomicU32>,
    state: Mutex<HostState>,
}

impl FakeHost {
    pub(crate) fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            capabilities: HostCapabilities::full(),
            current_url: Url::parse(&format!("http://{hostname}/")).unwrap(),
            has_opener: false,
            block_popups: AtomicBool::new(false),
            popup_closes_after: Mutex::new(None),
            popup_polls: Arc::default(),
            state: Mutex::default(),
        }
    }

    pub(crate) fn with_capabilities(mut self, capabilities: HostCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// A callback window loaded at `url`.
    pub(crate) fn at(mut self, url: &str, has_opener: bool) -> Self {
        self.current_url = url.parse().unwrap();
        self.has_opener = has_opener;
        self
    }

    pub(crate) fn block_popups(&self) {
        self.block_popups.store(true, Ordering::SeqCst);
    }

    /// The next popup reports closed after `polls` checks.
    pub(crate) fn popup_closes_after(&self, polls: u32) {
        *lock(&self.popup_closes_after) = Some(polls);
    }

    /// Queues a message delivered as soon as a listener registers.
    pub(crate) fn script_message(&self, origin: &str, data: serde_json::Value) {
        lock(&self.state).scripted.push(WindowMessage {
            origin: origin.to_string(),
            data,
        });
    }

    pub(crate) fn store(&self, key: &str, value: &str) {
        self.store_item(key, value);
    }

    pub(crate) fn listeners_added(&self) -> u32 {
        lock(&self.state).added
    }

    pub(crate) fn listeners_removed(&self) -> Vec<ListenerId> {
        lock(&self.state).removed.clone()
    }

    pub(crate) fn active_listeners(&self) -> usize {
        lock(&self.state).listeners.len()
    }

    pub(crate) fn opened(&self) -> Vec<(Url, PopupSpec)> {
        lock(&self.state).opened.clone()
    }

    pub(crate) fn navigations(&self) -> Vec<String> {
        lock(&self.state).navigations.clone()
    }

    pub(crate) fn reloads(&self) -> Vec<String> {
        lock(&self.state).reloads.clone()
    }

    pub(crate) fn posted(&self) -> Vec<(PopupMessage, String)> {
        lock(&self.state).posted.clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    pub(crate) fn stored(&self, key: &str) -> Option<String> {
        lock(&self.state).storage.get(key).cloned()
    }
}

impl HostWindow for FakeHost {
    type Popup = FakePopup;

    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn capabilities(&self) -> HostCapabilities {
        self.capabilities
    }

    fn open_popup(&self, url: &Url, spec: &PopupSpec) -> Option<FakePopup> {
        if self.block_popups.load(Ordering::SeqCst) {
            return None;
        }
        lock(&self.state).opened.push((url.clone(), spec.clone()));
        Some(FakePopup {
            polls: Arc::clone(&self.popup_polls),
            closes_after: *lock(&self.popup_closes_after),
        })
    }

    fn add_message_listener(&self, sink: UnboundedSender<WindowMessage>) -> ListenerId {
        let mut state = lock(&self.state);
        for message in state.scripted.drain(..) {
            let _ = sink.send(message);
        }
        let id = state.next_listener;
        state.next_listener += 1;
        state.added += 1;
        state.listeners.insert(id, sink);
        ListenerId(id)
    }

    fn remove_message_listener(&self, id: ListenerId) {
        let mut state = lock(&self.state);
        state.listeners.remove(&id.0);
        state.removed.push(id);
    }

    fn navigate(&self, url: &str) {
        lock(&self.state).navigations.push(url.to_string());
    }

    fn reload_with_fragment(&self, fragment: &str) {
        lock(&self.state).reloads.push(fragment.to_string());
    }

    fn current_url(&self) -> Url {
        self.current_url.clone()
    }

    fn has_opener(&self) -> bool {
        self.has_opener
    }

    fn post_to_opener(&self, message: &PopupMessage, target_origin: &str) {
        lock(&self.state)
            .posted
            .push((message.clone(), target_origin.to_string()));
    }

    fn close(&self) {
        lock(&self.state).closed = true;
    }

    fn store_item(&self, key: &str, value: &str) {
        lock(&self.state)
            .storage
            .insert(key.to_string(), value.to_string());
    }

    fn take_item(&self, key: &str) -> Option<String> {
        lock(&self.state).storage.remove(key)
    }
}

// ── Identity provider ──────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct FakeProvider {
    fail: AtomicBool,
    challenges: Mutex<Vec<Option<String>>>,
    exchanges: Mutex<Vec<(String, String)>>,
}

impl FakeProvider {
    pub(crate) fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub(crate) fn challenges(&self) -> Vec<Option<String>> {
        lock(&self.challenges).clone()
    }

    pub(crate) fn exchanges(&self) -> Vec<(String, String)> {
        lock(&self.exchanges).clone()
    }
}

impl IdentityProvider for FakeProvider {
    async fn authorization_url(
        &self,
        redirect_uri: &Url,
        code_challenge: Option<&str>,
    ) -> Result<Url, GatewayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("provider unreachable".into()));
        }
        lock(&self.challenges).push(code_challenge.map(str::to_string));
        let mut url = Url::parse("https://github.com/login/oauth/authorize").unwrap();
        url.query_pairs_mut()
            .append_pair("redirect_to", redirect_uri.as_str());
        Ok(url)
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<SessionTokens, GatewayError> {
        lock(&self.exchanges).push((code.to_string(), code_verifier.to_string()));
        Ok(SessionTokens::new(format!("access-{code}"), format!("refresh-{code}")).unwrap())
    }
}

// ── Remote gateway ─────────────────────────────────────────────────

type Gate = oneshot::Receiver<Result<(), GatewayError>>;

#[derive(Default)]
pub(crate) struct FakeGateway {
    fail_exchange: AtomicBool,
    fail_writes: AtomicBool,
    fail_sign_out: AtomicBool,
    exchanged: Mutex<Vec<SessionTokens>>,
    signed_out: AtomicU32,
    writes: Mutex<Vec<(ResourceId, RemoteOp)>>,
    gates: Mutex<VecDeque<Gate>>,
}

impl FakeGateway {
    pub(crate) fn fail_exchange(&self) {
        self.fail_exchange.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_sign_out(&self) {
        self.fail_sign_out.store(true, Ordering::SeqCst);
    }

    pub(crate) fn exchanged(&self) -> Vec<SessionTokens> {
        lock(&self.exchanged).clone()
    }

    pub(crate) fn sign_outs(&self) -> u32 {
        self.signed_out.load(Ordering::SeqCst)
    }

    pub(crate) fn writes(&self) -> Vec<(ResourceId, RemoteOp)> {
        lock(&self.writes).clone()
    }

    /// Makes the next unclaimed write wait for the returned sender.
    pub(crate) fn hold_next_write(&self) -> oneshot::Sender<Result<(), GatewayError>> {
        let (tx, rx) = oneshot::channel();
        lock(&self.gates).push_back(rx);
        tx
    }

    async fn write(&self, resource: &ResourceId, op: RemoteOp) -> Result<(), GatewayError> {
        lock(&self.writes).push((resource.clone(), op));
        let gate = lock(&self.gates).pop_front();
        if let Some(gate) = gate {
            return gate
                .await
                .unwrap_or_else(|_| Err(GatewayError::Transport("gate dropped".into())));
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(GatewayError::Status {
                operation: "write",
                status: 500,
                detail: "boom".into(),
            });
        }
        Ok(())
    }
}

impl RemoteGateway for FakeGateway {
    async fn establish_session(&self, tokens: &SessionTokens) -> Result<Session, GatewayError> {
        lock(&self.exchanged).push(tokens.clone());
        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(GatewayError::Unauthorized {
                operation: "session exchange",
            });
        }
        Ok(Session::new(tokens.clone(), test_identity("user-1")))
    }

    async fn sign_out(&self, _session: &Session) -> Result<(), GatewayError> {
        self.signed_out.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("offline".into()));
        }
        Ok(())
    }

    async fn upsert_vote(
        &self,
        _session: &Session,
        resource: &ResourceId,
        direction: VoteDirection,
    ) -> Result<(), GatewayError> {
        self.write(resource, RemoteOp::UpsertVote(direction)).await
    }

    async fn delete_vote(
        &self,
        _session: &Session,
        resource: &ResourceId,
    ) -> Result<(), GatewayError> {
        self.write(resource, RemoteOp::DeleteVote).await
    }

    async fn insert_bookmark(
        &self,
        _session: &Session,
        resource: &ResourceId,
    ) -> Result<(), GatewayError> {
        self.write(resource, RemoteOp::InsertBookmark).await
    }

    async fn delete_bookmark(
        &self,
        _session: &Session,
        resource: &ResourceId,
    ) -> Result<(), GatewayError> {
        self.write(resource, RemoteOp::DeleteBookmark).await
    }
}
