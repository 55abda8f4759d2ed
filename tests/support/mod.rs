//! Shared harness: an in-process mock authority speaking the real wire
//! protocol, with per-endpoint request counters, plus pre-wired client
//! components against it.
#![allow(dead_code)]

use axum::{
    Json,
    Router,
    extract::{
        Path,
        State,
    },
    http::{
        HeaderMap,
        StatusCode,
        header,
    },
    routing::{
        get,
        post,
    },
};
use serde_json::{
    Value,
    json,
};
use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::{
        Arc,
        Mutex,
        atomic::{
            AtomicUsize,
            Ordering,
        },
    },
};
use tokio::sync::mpsc::{
    self,
    UnboundedReceiver,
};
use twentyone::{
    authority::AuthorityClient,
    profile::ProfileSync,
    round::{
        RoundController,
        RoundEvent,
    },
    session::{
        CREDENTIAL_KEY,
        IDENTITY_KEY,
        SessionManager,
    },
    store::MemoryStore,
    test_helpers,
};

pub const USERNAME: &str = "alice";
pub const PASSWORD: &str = "pw";
pub const TOKEN: &str = "tok-live";

#[derive(Default)]
pub struct Counts {
    pub login: AtomicUsize,
    pub register: AtomicUsize,
    pub profile: AtomicUsize,
    pub start: AtomicUsize,
    pub hit: AtomicUsize,
    pub stand: AtomicUsize,
}

impl Counts {
    pub fn total(&self) -> usize {
        self.login.load(Ordering::SeqCst)
            + self.register.load(Ordering::SeqCst)
            + self.profile.load(Ordering::SeqCst)
            + self.start.load(Ordering::SeqCst)
            + self.hit.load(Ordering::SeqCst)
            + self.stand.load(Ordering::SeqCst)
    }
}

struct MockState {
    token: String,
    profile: Value,
    start_responses: VecDeque<(StatusCode, Value)>,
    hit_responses: VecDeque<(StatusCode, Value)>,
    stand_responses: VecDeque<(StatusCode, Value)>,
}

struct Shared {
    state: Mutex<MockState>,
    counts: Counts,
}

pub struct MockAuthority {
    pub base_url: String,
    shared: Arc<Shared>,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for MockAuthority {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl MockAuthority {
    pub async fn start() -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(MockState {
                token: TOKEN.to_owned(),
                profile: test_helpers::profile_json(1000),
                start_responses: VecDeque::new(),
                hit_responses: VecDeque::new(),
                stand_responses: VecDeque::new(),
            }),
            counts: Counts::default(),
        });

        let router = Router::new()
            .route("/api/login/", post(login))
            .route("/api/register/", post(register))
            .route("/api/profile/", get(profile))
            .route("/api/games/", post(start_round))
            .route("/api/games/:id/hit/", post(hit))
            .route("/api/games/:id/stand/", post(stand))
            .with_state(shared.clone());

        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        let actual_addr = listener.local_addr().unwrap();
        let base_url = format!("http://{actual_addr}/api");

        let handle = tokio::spawn(async move {
            axum::serve(listener, router.into_make_service())
                .await
                .unwrap();
        });

        Self {
            base_url,
            shared,
            handle,
        }
    }

    pub fn counts(&self) -> &Counts {
        &self.shared.counts
    }

    pub fn enqueue_start(&self, status: u16, body: Value) {
        self.shared
            .state
            .lock()
            .unwrap()
            .start_responses
            .push_back((StatusCode::from_u16(status).unwrap(), body));
    }

    pub fn enqueue_hit(&self, status: u16, body: Value) {
        self.shared
            .state
            .lock()
            .unwrap()
            .hit_responses
            .push_back((StatusCode::from_u16(status).unwrap(), body));
    }

    pub fn enqueue_stand(&self, status: u16, body: Value) {
        self.shared
            .state
            .lock()
            .unwrap()
            .stand_responses
            .push_back((StatusCode::from_u16(status).unwrap(), body));
    }

    pub fn set_profile(&self, body: Value) {
        self.shared.state.lock().unwrap().profile = body;
    }

    /// Stop accepting the current bearer token; authenticated requests now
    /// come back 401.
    pub fn revoke_token(&self) {
        self.shared.state.lock().unwrap().token = String::from("tok-revoked");
    }

    pub fn restore_token(&self) {
        self.shared.state.lock().unwrap().token = TOKEN.to_owned();
    }
}

fn authorized(state: &MockState, headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value == format!("Bearer {}", state.token))
        .unwrap_or(false)
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Invalid or expired token"})),
    )
}

async fn login(
    State(shared): State<Arc<Shared>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    shared.counts.login.fetch_add(1, Ordering::SeqCst);
    let state = shared.state.lock().unwrap();
    let username = body.get("username").and_then(Value::as_str).unwrap_or("");
    let password = body.get("password").and_then(Value::as_str).unwrap_or("");
    if username == USERNAME && password == PASSWORD {
        (
            StatusCode::OK,
            Json(test_helpers::auth_json(USERNAME, &state.token)),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Invalid username or password"})),
        )
    }
}

async fn register(
    State(shared): State<Arc<Shared>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    shared.counts.register.fetch_add(1, Ordering::SeqCst);
    let state = shared.state.lock().unwrap();
    let username = body.get("username").and_then(Value::as_str).unwrap_or("");
    if username == USERNAME {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Username already exists"})),
        )
    } else {
        (
            StatusCode::CREATED,
            Json(test_helpers::auth_json(username, &state.token)),
        )
    }
}

async fn profile(
    State(shared): State<Arc<Shared>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    shared.counts.profile.fetch_add(1, Ordering::SeqCst);
    let state = shared.state.lock().unwrap();
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    (StatusCode::OK, Json(state.profile.clone()))
}

async fn start_round(
    State(shared): State<Arc<Shared>>,
    headers: HeaderMap,
    Json(_body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    shared.counts.start.fetch_add(1, Ordering::SeqCst);
    let mut state = shared.state.lock().unwrap();
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    pop(&mut state.start_responses)
}

async fn hit(
    State(shared): State<Arc<Shared>>,
    Path(_id): Path<u64>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    shared.counts.hit.fetch_add(1, Ordering::SeqCst);
    let mut state = shared.state.lock().unwrap();
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    pop(&mut state.hit_responses)
}

async fn stand(
    State(shared): State<Arc<Shared>>,
    Path(_id): Path<u64>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    shared.counts.stand.fetch_add(1, Ordering::SeqCst);
    let mut state = shared.state.lock().unwrap();
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    pop(&mut state.stand_responses)
}

fn pop(queue: &mut VecDeque<(StatusCode, Value)>) -> (StatusCode, Json<Value>) {
    match queue.pop_front() {
        Some((status, body)) => (status, Json(body)),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "no scripted response"})),
        ),
    }
}

pub struct Harness {
    pub session: SessionManager,
    pub authority: AuthorityClient,
    pub rounds: RoundController,
    pub profile: ProfileSync,
    pub events: UnboundedReceiver<RoundEvent>,
}

/// Fresh components with nothing persisted: the session restores to
/// `Anonymous`.
pub fn anonymous_harness(mock: &MockAuthority) -> Harness {
    let mut session = SessionManager::new(Box::new(MemoryStore::new()));
    session.restore();
    wire(mock, session)
}

/// Components restoring a persisted session whose token the mock accepts.
pub fn authenticated_harness(mock: &MockAuthority) -> Harness {
    let store = MemoryStore::with_entries([
        (CREDENTIAL_KEY.to_owned(), TOKEN.to_owned()),
        (
            IDENTITY_KEY.to_owned(),
            format!(r#"{{"id":1,"username":"{USERNAME}"}}"#),
        ),
    ]);
    let mut session = SessionManager::new(Box::new(store));
    session.restore();
    wire(mock, session)
}

fn wire(mock: &MockAuthority, session: SessionManager) -> Harness {
    let authority = AuthorityClient::new(mock.base_url.clone(), session.credentials()).unwrap();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    Harness {
        session,
        authority,
        rounds: RoundController::new(events_tx),
        profile: ProfileSync::new(),
        events: events_rx,
    }
}

impl Harness {
    /// The application's event pump in miniature: drain round events and run
    /// at most one profile refresh if any arrived.
    pub async fn pump_round_events(&mut self) -> Vec<RoundEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        if !events.is_empty() {
            let _ = self.profile.refresh(&self.authority).await;
        }
        events
    }
}
