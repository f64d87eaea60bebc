// src/http/webhook.rs
//
// Webhook intake: verifies an HMAC-SHA256 signature over the raw body
// (GitHub-style `X-Hub-Signature-256: sha256=<hex>`) or a plain shared
// token (GitLab-style `X-Gitlab-Token`), then maps the push payload into
// a WebhookJob. HMAC verification follows the teacher's `hmac_sign`
// helper in ioc_feed.rs, using a constant-time comparison.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;

use crate::data::{JobStatus, WebhookJob};
use crate::http::AppState;

type HmacSha256 = Hmac<sha2::Sha256>;

fn verify_github_signature(secret: &str, body: &[u8], header_value: &str) -> bool {
    let Some(hex_sig) = header_value.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(expected.as_bytes(), hex_sig.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Debug, Deserialize)]
struct GithubPushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    repository: GithubRepo,
    #[serde(default)]
    commits: Vec<GithubCommit>,
    #[serde(default)]
    pusher: Option<GithubPusher>,
}

#[derive(Debug, Deserialize)]
struct GithubRepo {
    full_name: String,
    clone_url: String,
}

#[derive(Debug, Deserialize)]
struct GithubCommit {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GithubPusher {
    name: String,
}

pub async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let signature = headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !verify_github_signature(&state.config.webhook.secret, &body, signature) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid signature"})));
    }

    let payload: GithubPushPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("malformed payload: {e}")})),
            )
        }
    };

    let job = WebhookJob {
        id: String::new(),
        event_type: "push".to_string(),
        repo_url: payload.repository.clone_url,
        repo_name: payload.repository.full_name,
        branch: payload.git_ref.trim_start_matches("refs/heads/").to_string(),
        author: payload.pusher.map(|p| p.name).unwrap_or_default(),
        commits: payload.commits.into_iter().map(|c| c.id).collect(),
        timestamp: chrono::Utc::now(),
        status: JobStatus::Pending,
        progress: String::new(),
        error: None,
        result: None,
    };

    match state.queue.enqueue(job).await {
        Ok(id) => (StatusCode::ACCEPTED, Json(json!({"job_id": id, "status": "pending"}))),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": e.to_string()}))),
    }
}

#[derive(Debug, Deserialize)]
struct GitlabPushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    #[serde(default)]
    project: Option<GitlabProject>,
    #[serde(default)]
    commits: Vec<GitlabCommit>,
    #[serde(default)]
    user_name: String,
}

#[derive(Debug, Deserialize)]
struct GitlabProject {
    path_with_namespace: String,
    git_http_url: String,
}

#[derive(Debug, Deserialize)]
struct GitlabCommit {
    id: String,
}

pub async fn gitlab_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let token = headers.get("X-Gitlab-Token").and_then(|v| v.to_str().ok()).unwrap_or("");
    if !constant_time_eq(token.as_bytes(), state.config.webhook.secret.as_bytes()) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid token"})));
    }

    let payload: GitlabPushPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("malformed payload: {e}")})),
            )
        }
    };

    let project = payload.project.unwrap_or(GitlabProject {
        path_with_namespace: String::new(),
        git_http_url: String::new(),
    });

    let job = WebhookJob {
        id: String::new(),
        event_type: "push".to_string(),
        repo_url: project.git_http_url,
        repo_name: project.path_with_namespace,
        branch: payload.git_ref.trim_start_matches("refs/heads/").to_string(),
        author: payload.user_name,
        commits: payload.commits.into_iter().map(|c| c.id).collect(),
        timestamp: chrono::Utc::now(),
        status: JobStatus::Pending,
        progress: String::new(),
        error: None,
        result: None,
    };

    match state.queue.enqueue(job).await {
        Ok(id) => (StatusCode::ACCEPTED, Json(json!({"job_id": id, "status": "pending"}))),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": e.to_string()}))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn github_signature_round_trips() {
        let secret = "topsecret";
        let body = b"{\"ref\":\"refs/heads/main\"}";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let sig = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));
        assert!(verify_github_signature(secret, body, &sig));
        assert!(!verify_github_signature(secret, body, "sha256=deadbeef"));
    }

    #[test]
    fn constant_time_eq_rejects_mismatched_lengths() {
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(constant_time_eq(b"abc", b"abc"));
    }
}
