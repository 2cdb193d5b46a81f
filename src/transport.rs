// ===================================================================================================
// PeerTransport — the single network boundary
// ===================================================================================================
//
// Stateless request/response helpers over HTTP-style JSON. Every call returns a uniform
// `TransportResponse` carrying a success flag, status code (0 on connection failure),
// decoded body, optional error string, and measured latency. No retries here — retries
// are a WorkDistributor concern.
// ===================================================================================================

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::identity::NodeIdentity;
use crate::messages::{
    GossipMessage, HeartbeatMessage, JoinRequest, LeaveRequest, OkResponse, SwarmTaskRequest,
    SwarmTaskResult, TaskRequestDecision,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct TransportResponse<T> {
    pub success: bool,
    /// 0 on connection failure, otherwise the HTTP status code.
    pub status: u16,
    pub body: Option<T>,
    pub error: Option<String>,
    pub latency_ms: u64,
}

impl<T> TransportResponse<T> {
    fn failure(status: u16, error: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            success: false,
            status,
            body: None,
            error: Some(error.into()),
            latency_ms,
        }
    }

    fn success(status: u16, body: T, latency_ms: u64) -> Self {
        Self {
            success: true,
            status,
            body: Some(body),
            error: None,
            latency_ms,
        }
    }
}

#[derive(Clone)]
pub struct PeerTransport {
    client: reqwest::Client,
    token: Option<String>,
}

impl PeerTransport {
    pub fn new(token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("reqwest client builds with static config");
        Self { client, token }
    }

    fn request_builder(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn get<R: DeserializeOwned>(&self, url: &str) -> TransportResponse<R> {
        let started = Instant::now();
        match self.request_builder(reqwest::Method::GET, url).send().await {
            Ok(resp) => Self::decode(resp, started).await,
            Err(e) => TransportResponse::failure(0, e.to_string(), elapsed_ms(started)),
        }
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> TransportResponse<R> {
        let started = Instant::now();
        match self
            .request_builder(reqwest::Method::POST, url)
            .json(body)
            .send()
            .await
        {
            Ok(resp) => Self::decode(resp, started).await,
            Err(e) => TransportResponse::failure(0, e.to_string(), elapsed_ms(started)),
        }
    }

    async fn decode<R: DeserializeOwned>(
        resp: reqwest::Response,
        started: Instant,
    ) -> TransportResponse<R> {
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let latency_ms = elapsed_ms(started);
            let text = resp.text().await.unwrap_or_default();
            return TransportResponse::failure(status, text, latency_ms);
        }
        match resp.json::<R>().await {
            Ok(body) => TransportResponse::success(status, body, elapsed_ms(started)),
            Err(e) => TransportResponse::failure(status, e.to_string(), elapsed_ms(started)),
        }
    }

    pub async fn fetch_identity(&self, base_url: &str) -> TransportResponse<NodeIdentity> {
        self.get(&format!("{base_url}/identity")).await
    }

    pub async fn send_join(
        &self,
        base_url: &str,
        identity: NodeIdentity,
    ) -> TransportResponse<OkResponse> {
        self.post(&format!("{base_url}/join"), &JoinRequest { identity })
            .await
    }

    pub async fn send_leave(
        &self,
        base_url: &str,
        msg: LeaveRequest,
    ) -> TransportResponse<OkResponse> {
        self.post(&format!("{base_url}/leave"), &msg).await
    }

    pub async fn send_heartbeat(
        &self,
        base_url: &str,
        msg: &HeartbeatMessage,
    ) -> TransportResponse<OkResponse> {
        self.post(&format!("{base_url}/heartbeat"), msg).await
    }

    pub async fn send_gossip(
        &self,
        base_url: &str,
        msg: &GossipMessage,
    ) -> TransportResponse<GossipMessage> {
        self.post(&format!("{base_url}/gossip"), msg).await
    }

    pub async fn send_task_request(
        &self,
        base_url: &str,
        req: &SwarmTaskRequest,
    ) -> TransportResponse<TaskRequestDecision> {
        self.post(&format!("{base_url}/task/request"), req).await
    }

    pub async fn send_task_result(
        &self,
        base_url: &str,
        res: &SwarmTaskResult,
    ) -> TransportResponse<OkResponse> {
        self.post(&format!("{base_url}/task/result"), res).await
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
