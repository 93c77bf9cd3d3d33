// src/api_handlers.rs
// JSON request handlers for the draw server. Routing works on the method and
// the path segments so handlers can be driven without a socket.

use hyper::body::Bytes;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::{Method, Response, StatusCode};
use http_body_util::Full;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::defs::{Number, PrizeId};
use crate::error::BingoError;
use crate::logging::log_error;
use crate::prize::PrizeDefinition;
use crate::server::AppState;
use crate::session::Session;
use crate::store::{validate_session_id, BaseSource, SessionRecord};

pub type ApiResponse = Response<Full<Bytes>>;

const DEFAULT_RANDOM_COUNT: usize = 10;

// Response structures for JSON serialization
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn into_response(self) -> ApiResponse {
        json_response(self.status, &ErrorResponse { error: self.message })
    }
}

impl From<BingoError> for ApiError {
    fn from(e: BingoError) -> Self {
        let status = match &e {
            BingoError::SessionNotFound(_) | BingoError::PrizeNotFound(_) => StatusCode::NOT_FOUND,
            BingoError::Json(_)
            | BingoError::InvalidBarcode(_)
            | BingoError::UnknownPrizeKind(_)
            | BingoError::DuplicateBase(_)
            | BingoError::InvalidSessionId(_)
            | BingoError::TicketSource { .. } => StatusCode::BAD_REQUEST,
            BingoError::SessionExists(_) | BingoError::DrawRejected(_) | BingoError::NothingToUndo => {
                StatusCode::CONFLICT
            }
            BingoError::Persistence(_) | BingoError::Io(_) | BingoError::LockPoisoned(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        ApiError::new(status, e.to_string())
    }
}

/// Every response is JSON and readable from any origin.
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> ApiResponse {
    let body = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub max_balls: Option<Number>,
    #[serde(default)]
    pub open_play: Option<bool>,
    #[serde(default)]
    pub bases: Vec<BaseSource>,
    #[serde(default)]
    pub prizes: Vec<PrizeDefinition>,
}

#[derive(Debug, Deserialize)]
pub struct DrawRequest {
    /// Missing means draw a random remaining ball
    #[serde(default)]
    pub number: Option<Number>,
}

#[derive(Debug, Deserialize)]
pub struct BarcodeRequest {
    pub barcode: String,
}

#[derive(Debug, Deserialize)]
pub struct RandomRequest {
    #[serde(default)]
    pub count: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PrizeStatusRequest {
    pub realized: bool,
}

/// An empty body reads as `{}`.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) { b"{}" } else { body };
    serde_json::from_slice(body).map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("Invalid JSON in request body: {e}")))
}

/// Run `f` on a session while holding its lock.
fn with_session<T>(
    state: &AppState,
    session_id: &str,
    f: impl FnOnce(&mut Session) -> Result<T, BingoError>,
) -> Result<T, ApiError> {
    let handle = state.registry.get(session_id)?;
    let mut session = handle.lock().map_err(|_| BingoError::LockPoisoned("session"))?;
    Ok(f(&mut session)?)
}

pub async fn route(state: &AppState, method: &Method, path: &str, body: &[u8]) -> ApiResponse {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    let result = match (method, segments.as_slice()) {
        (&Method::GET, ["sessions"]) => handle_list_sessions(state),
        (&Method::POST, ["sessions"]) => handle_create_session(state, body),
        (&Method::GET, [sid, "status"]) => handle_status(state, sid),
        (&Method::POST, [sid, "draw"]) => handle_draw(state, sid, body),
        (&Method::POST, [sid, "undo"]) => handle_undo(state, sid),
        (&Method::POST, [sid, "newgame"]) => handle_newgame(state, sid),
        (&Method::POST, [sid, "register"]) => handle_register(state, sid, body),
        (&Method::POST, [sid, "register_random"]) => handle_register_random(state, sid, body),
        (&Method::POST, [sid, "unregister"]) => handle_unregister(state, sid, body),
        (&Method::POST, [sid, "clear_sales"]) => handle_clear_sales(state, sid),
        (&Method::POST, [sid, "prizes"]) => handle_add_prize(state, sid, body),
        (&Method::POST, [sid, "prizes", pid, "status"]) => handle_prize_status(state, sid, pid, body),
        _ => Err(ApiError::new(StatusCode::NOT_FOUND, format!("No route for {method} {path}"))),
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            if e.status.is_server_error() {
                log_error(&format!("{method} {path} failed: {}", e.message));
            }
            e.into_response()
        }
    }
}

fn handle_list_sessions(state: &AppState) -> Result<ApiResponse, ApiError> {
    let sessions = state.registry.list()?;
    Ok(json_response(StatusCode::OK, &json!({ "sessions": sessions })))
}

fn handle_create_session(state: &AppState, body: &[u8]) -> Result<ApiResponse, ApiError> {
    let request: CreateSessionRequest = parse_body(body)?;
    validate_session_id(&request.id)?;

    let mut record = SessionRecord::new(&request.id, request.name.as_deref().unwrap_or(&request.id));
    record.max_balls = request.max_balls.unwrap_or(state.config.max_balls);
    record.open_play = request.open_play.unwrap_or(state.config.open_play);
    record.bases = request.bases;
    record.prizes = request.prizes;

    let handle = state.registry.create(record)?;
    let session = handle.lock().map_err(|_| BingoError::LockPoisoned("session"))?;
    Ok(json_response(StatusCode::CREATED, &json!({ "session": session.snapshot() })))
}

fn handle_status(state: &AppState, sid: &str) -> Result<ApiResponse, ApiError> {
    let snapshot = with_session(state, sid, |s| Ok(s.snapshot()))?;
    Ok(json_response(StatusCode::OK, &snapshot))
}

fn handle_draw(state: &AppState, sid: &str, body: &[u8]) -> Result<ApiResponse, ApiError> {
    let request: DrawRequest = parse_body(body)?;
    let (outcome, snapshot) = with_session(state, sid, |s| {
        let outcome = match request.number {
            Some(number) => s.draw(number)?,
            None => s.draw_random()?,
        };
        Ok((outcome, s.snapshot()))
    })?;
    Ok(json_response(
        StatusCode::OK,
        &json!({
            "number": outcome.number,
            "updated": outcome.updated,
            "new_winners": outcome.new_winners,
            "snapshot": snapshot,
        }),
    ))
}

fn handle_undo(state: &AppState, sid: &str) -> Result<ApiResponse, ApiError> {
    let (cancelled, snapshot) = with_session(state, sid, |s| Ok((s.undo()?, s.snapshot())))?;
    Ok(json_response(StatusCode::OK, &json!({ "cancelled": cancelled, "snapshot": snapshot })))
}

fn handle_newgame(state: &AppState, sid: &str) -> Result<ApiResponse, ApiError> {
    let snapshot = with_session(state, sid, |s| {
        s.start_new_game()?;
        Ok(s.snapshot())
    })?;
    Ok(json_response(
        StatusCode::OK,
        &json!({ "message": format!("New game started in session '{sid}'"), "snapshot": snapshot }),
    ))
}

fn handle_register(state: &AppState, sid: &str, body: &[u8]) -> Result<ApiResponse, ApiError> {
    let request: BarcodeRequest = parse_body(body)?;
    let (registered, snapshot) = with_session(state, sid, |s| Ok((s.register_barcode(&request.barcode)?, s.snapshot())))?;
    Ok(json_response(
        StatusCode::OK,
        &json!({ "registered": registered, "barcode": request.barcode.trim(), "snapshot": snapshot }),
    ))
}

fn handle_register_random(state: &AppState, sid: &str, body: &[u8]) -> Result<ApiResponse, ApiError> {
    let request: RandomRequest = parse_body(body)?;
    let count = request.count.unwrap_or(DEFAULT_RANDOM_COUNT);
    let (barcodes, snapshot) = with_session(state, sid, |s| Ok((s.register_random(count)?, s.snapshot())))?;
    Ok(json_response(StatusCode::OK, &json!({ "registered": barcodes, "snapshot": snapshot })))
}

fn handle_unregister(state: &AppState, sid: &str, body: &[u8]) -> Result<ApiResponse, ApiError> {
    let request: BarcodeRequest = parse_body(body)?;
    let (removed, snapshot) = with_session(state, sid, |s| Ok((s.unregister_barcode(&request.barcode)?, s.snapshot())))?;
    Ok(json_response(StatusCode::OK, &json!({ "unregistered": removed, "snapshot": snapshot })))
}

fn handle_clear_sales(state: &AppState, sid: &str) -> Result<ApiResponse, ApiError> {
    let (cleared, snapshot) = with_session(state, sid, |s| Ok((s.clear_sales()?, s.snapshot())))?;
    Ok(json_response(StatusCode::OK, &json!({ "cleared": cleared, "snapshot": snapshot })))
}

fn handle_add_prize(state: &AppState, sid: &str, body: &[u8]) -> Result<ApiResponse, ApiError> {
    let def: PrizeDefinition = parse_body(body)?;
    let (added, snapshot) = with_session(state, sid, |s| Ok((s.add_prize(def)?, s.snapshot())))?;
    let status = if added { StatusCode::CREATED } else { StatusCode::OK };
    Ok(json_response(status, &json!({ "added": added, "snapshot": snapshot })))
}

fn handle_prize_status(state: &AppState, sid: &str, pid: &str, body: &[u8]) -> Result<ApiResponse, ApiError> {
    let prize_id: PrizeId = pid
        .parse()
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, format!("Invalid prize id '{pid}'")))?;
    let request: PrizeStatusRequest = parse_body(body)?;
    let (changed, snapshot) = with_session(state, sid, |s| {
        Ok((s.set_prize_status(prize_id, request.realized)?, s.snapshot()))
    })?;
    Ok(json_response(StatusCode::OK, &json!({ "changed": changed, "snapshot": snapshot })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use http_body_util::BodyExt;
    use serde_json::Value;

    use crate::config::ServerConfig;
    use crate::session::tests::{quina_cheia_record, write_base};
    use crate::session::SessionRegistry;
    use crate::store::MemoryStore;

    fn app_state(store: Arc<MemoryStore>) -> AppState {
        AppState {
            registry: SessionRegistry::new(store),
            config: ServerConfig::default(),
        }
    }

    async fn call(state: &AppState, method: Method, path: &str, body: &str) -> (StatusCode, Value) {
        let response = route(state, &method, path, body.as_bytes()).await;
        let status = response.status();
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn state_with_session() -> (AppState, tempfile::NamedTempFile) {
        let base = write_base();
        let state = app_state(Arc::new(MemoryStore::new()));
        state.registry.create(quina_cheia_record("s1", base.path())).unwrap();
        (state, base)
    }

    #[tokio::test]
    async fn test_create_and_list_sessions() {
        let base = write_base();
        let state = app_state(Arc::new(MemoryStore::new()));
        let body = json!({
            "id": "friday",
            "bases": [{ "id": 1, "name": "Main", "path": base.path() }],
            "prizes": [{ "id": 1, "name": "Quina", "type": "quina", "base_id": 1 }],
        })
        .to_string();

        let (status, value) = call(&state, Method::POST, "/sessions", &body).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(value["session"]["max_balls"], 75);
        assert_eq!(value["session"]["prizes"][0]["type"], "quina");

        let (status, _) = call(&state, Method::POST, "/sessions", &body).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, value) = call(&state, Method::GET, "/sessions", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["sessions"][0]["id"], "friday");
    }

    #[tokio::test]
    async fn test_create_session_rejects_path_like_ids() {
        let state = app_state(Arc::new(MemoryStore::new()));
        for id in ["a/b", "../x", ""] {
            let body = json!({ "id": id }).to_string();
            let (status, value) = call(&state, Method::POST, "/sessions", &body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(value["error"].as_str().unwrap().starts_with("invalid session id"));
        }
        let (status, _) = call(&state, Method::POST, "/sessions", r#"{"id":"a_b"}"#).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_create_session_with_bad_prize_type() {
        let state = app_state(Arc::new(MemoryStore::new()));
        let body = r#"{"id":"x","prizes":[{"id":1,"name":"L","type":"linha","base_id":1}]}"#;
        let (status, value) = call(&state, Method::POST, "/sessions", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(value["error"].as_str().unwrap().contains("Invalid JSON"));
    }

    #[tokio::test]
    async fn test_draw_flow_and_errors() {
        let (state, _base) = state_with_session().await;

        let (status, value) = call(&state, Method::POST, "/s1/register", r#"{"barcode":"0000019"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["registered"], true);

        for n in 1..=4 {
            let (status, _) = call(&state, Method::POST, "/s1/draw", &format!(r#"{{"number":{n}}}"#)).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (_, value) = call(&state, Method::POST, "/s1/draw", r#"{"number":5}"#).await;
        assert_eq!(value["updated"], true);
        assert_eq!(value["new_winners"][0]["barcode"], "0000019");
        assert_eq!(value["snapshot"]["prizes"][0]["winners"][0], "0000019");

        let (status, _) = call(&state, Method::POST, "/s1/draw", r#"{"number":5}"#).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = call(&state, Method::POST, "/s1/draw", r#"{"number":"five"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&state, Method::POST, "/nope/draw", r#"{"number":6}"#).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_random_draw_without_number() {
        let (state, _base) = state_with_session().await;
        let (status, value) = call(&state, Method::POST, "/s1/draw", "").await;
        assert_eq!(status, StatusCode::OK);
        let number = value["number"].as_u64().unwrap();
        assert!((1..=75).contains(&number));
        assert_eq!(value["snapshot"]["remaining"], 74);
    }

    #[tokio::test]
    async fn test_undo_route() {
        let (state, _base) = state_with_session().await;
        let (status, _) = call(&state, Method::POST, "/s1/undo", "").await;
        assert_eq!(status, StatusCode::CONFLICT);

        call(&state, Method::POST, "/s1/draw", r#"{"number":33}"#).await;
        let (status, value) = call(&state, Method::POST, "/s1/undo", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["cancelled"], 33);
        assert_eq!(value["snapshot"]["drawn_numbers"], json!([]));
    }

    #[tokio::test]
    async fn test_prize_status_route() {
        let (state, _base) = state_with_session().await;
        let (status, value) = call(&state, Method::POST, "/s1/prizes/1/status", r#"{"realized":true}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["snapshot"]["prizes"][0]["realized"], true);
        assert_eq!(value["snapshot"]["prizes"][1]["in_turn"], true);

        let (status, _) = call(&state, Method::POST, "/s1/prizes/9/status", r#"{"realized":true}"#).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&state, Method::POST, "/s1/prizes/abc/status", r#"{"realized":true}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_add_prize_route() {
        let (state, _base) = state_with_session().await;
        let body = r#"{"id":3,"name":"Corners","type":"forma","base_id":1,"pattern_indices":[0,4,20,24]}"#;
        let (status, value) = call(&state, Method::POST, "/s1/prizes", body).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(value["snapshot"]["prizes"][2]["type"], "forma");
        let (status, value) = call(&state, Method::POST, "/s1/prizes", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["added"], false);
    }

    #[tokio::test]
    async fn test_sales_routes() {
        let (state, _base) = state_with_session().await;
        let (_, value) = call(&state, Method::POST, "/s1/register_random", "").await;
        assert_eq!(value["registered"].as_array().unwrap().len(), 3);

        let (_, value) = call(&state, Method::POST, "/s1/unregister", r#"{"barcode":"0000024"}"#).await;
        assert_eq!(value["unregistered"], true);
        assert_eq!(value["snapshot"]["registered_count"], 2);

        let (status, _) = call(&state, Method::POST, "/s1/register", r#"{"barcode":"12"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, value) = call(&state, Method::POST, "/s1/clear_sales", "").await;
        assert_eq!(value["cleared"], 2);
    }

    #[tokio::test]
    async fn test_newgame_and_status() {
        let (state, _base) = state_with_session().await;
        call(&state, Method::POST, "/s1/draw", r#"{"number":7}"#).await;
        let (status, _) = call(&state, Method::POST, "/s1/newgame", "").await;
        assert_eq!(status, StatusCode::OK);
        let (_, value) = call(&state, Method::GET, "/s1/status", "").await;
        assert_eq!(value["drawn_numbers"], json!([]));
        assert_eq!(value["session_id"], "s1");
    }

    #[tokio::test]
    async fn test_persistence_failure_is_server_error() {
        let base = write_base();
        let store = Arc::new(MemoryStore::new());
        let state = app_state(Arc::clone(&store));
        state.registry.create(quina_cheia_record("s1", base.path())).unwrap();

        store.set_fail_writes(true);
        let (status, _) = call(&state, Method::POST, "/s1/draw", r#"{"number":8}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let (_, value) = call(&state, Method::GET, "/s1/status", "").await;
        assert_eq!(value["drawn_numbers"], json!([]));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let state = app_state(Arc::new(MemoryStore::new()));
        let (status, value) = call(&state, Method::GET, "/whatever", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(value["error"].as_str().unwrap().contains("No route"));
        let (status, _) = call(&state, Method::DELETE, "/sessions", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
