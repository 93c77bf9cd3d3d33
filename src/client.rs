// src/client.rs
// Async HTTP client for the draw server, used by the operator console.

use std::error::Error;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::OperatorConfig;
use crate::defs::{Number, PrizeId};
use crate::pouch::Pouch;
use crate::session::{SessionSnapshot, SessionSummary, WinnerNotice};

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
struct SessionsResponse {
    sessions: Vec<SessionSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DrawReply {
    pub number: Number,
    pub updated: bool,
    pub new_winners: Vec<WinnerNotice>,
    pub snapshot: SessionSnapshot,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UndoReply {
    pub cancelled: Number,
    pub snapshot: SessionSnapshot,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterReply {
    pub registered: bool,
    pub barcode: String,
    pub snapshot: SessionSnapshot,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RandomReply {
    pub registered: Vec<String>,
    pub snapshot: SessionSnapshot,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrizeStatusReply {
    pub changed: bool,
    pub snapshot: SessionSnapshot,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotReply {
    pub snapshot: SessionSnapshot,
}

#[derive(Debug)]
pub struct OperatorClient {
    server_url: String,
    session: String,
    http_client: reqwest::Client,
}

impl OperatorClient {
    pub fn new(server_url: &str, session: &str, timeout: u64) -> Result<Self, Box<dyn Error>> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()?;

        Ok(Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            session: session.to_string(),
            http_client,
        })
    }

    pub fn from_config(config: &OperatorConfig) -> Result<Self, Box<dyn Error>> {
        Self::new(&config.server_url(), &config.session, config.timeout)
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    fn session_url(&self, action: &str) -> String {
        format!("{}/{}/{}", self.server_url, self.session, action)
    }

    async fn read_reply<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T, Box<dyn Error>> {
        if response.status().is_success() {
            return Ok(response.json().await?);
        }
        let status = response.status();
        let text = response.text().await?;
        Err(describe_failure(what, status.as_u16(), &text).into())
    }

    async fn get<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T, Box<dyn Error>> {
        let response = self.http_client.get(url).send().await?;
        Self::read_reply(response, what).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, url: &str, body: &B, what: &str) -> Result<T, Box<dyn Error>> {
        let response = self.http_client.post(url).json(body).send().await?;
        Self::read_reply(response, what).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, Box<dyn Error>> {
        let url = format!("{}/sessions", self.server_url);
        let reply: SessionsResponse = self.get(&url, "list sessions").await?;
        Ok(reply.sessions)
    }

    pub async fn status(&self) -> Result<SessionSnapshot, Box<dyn Error>> {
        self.get(&self.session_url("status"), "get status").await
    }

    pub async fn draw(&self, number: Number) -> Result<DrawReply, Box<dyn Error>> {
        self.post(&self.session_url("draw"), &json!({ "number": number }), "draw").await
    }

    /// Pick a ball from those still in the pouch and draw it.
    pub async fn draw_random(&self) -> Result<DrawReply, Box<dyn Error>> {
        let snapshot = self.status().await?;
        let mut pouch = Pouch::remaining(snapshot.max_balls, &snapshot.drawn_numbers);
        match pouch.extract() {
            Some(number) => self.draw(number).await,
            None => Err("All balls have been drawn".into()),
        }
    }

    pub async fn undo(&self) -> Result<UndoReply, Box<dyn Error>> {
        self.post(&self.session_url("undo"), &json!({}), "undo").await
    }

    pub async fn new_game(&self) -> Result<SnapshotReply, Box<dyn Error>> {
        self.post(&self.session_url("newgame"), &json!({}), "start new game").await
    }

    pub async fn register(&self, barcode: &str) -> Result<RegisterReply, Box<dyn Error>> {
        self.post(&self.session_url("register"), &json!({ "barcode": barcode }), "register ticket").await
    }

    pub async fn register_random(&self, count: usize) -> Result<RandomReply, Box<dyn Error>> {
        self.post(&self.session_url("register_random"), &json!({ "count": count }), "register random tickets").await
    }

    pub async fn set_prize_status(&self, prize_id: PrizeId, realized: bool) -> Result<PrizeStatusReply, Box<dyn Error>> {
        let url = self.session_url(&format!("prizes/{prize_id}/status"));
        self.post(&url, &json!({ "realized": realized }), "update prize").await
    }
}

/// Turn an error reply into a one-line message, preferring the server's own text.
fn describe_failure(what: &str, status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(error) => format!("Failed to {what}: {} (HTTP {status})", error.error),
        Err(_) => format!("Failed to {what}: HTTP {status}"),
    }
}
