//! Slack Web API transport used by the dispatcher.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::blocks::Block;

pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostMessageRequest {
    pub channel: String,
    pub text: String,
    pub blocks: Vec<Block>,
    pub unfurl_links: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub content: String,
    pub filename: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFilesRequest {
    pub channel_id: String,
    pub thread_ts: Option<String>,
    pub initial_comment: String,
    pub file_uploads: Vec<FileUpload>,
}

/// Body of a Slack Web API response. Fields the dispatcher does not use are
/// kept in `extra` so a rejected call can be reported verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlackResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SlackResponse {
    pub fn success(ts: Option<&str>) -> Self {
        Self {
            ok: true,
            ts: ts.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn rejected(error: &str) -> Self {
        Self {
            ok: false,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

/// Anything able to deliver messages and files to Slack.
///
/// `Err` means the request never produced a Slack answer; a response with
/// `ok == false` is a rejection by Slack itself.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn post_message(&self, request: &PostMessageRequest) -> Result<SlackResponse>;

    async fn upload_files(&self, request: &UploadFilesRequest) -> Result<SlackResponse>;
}

#[derive(Debug, Deserialize)]
struct UploadUrlResponse {
    ok: bool,
    upload_url: Option<String>,
    file_id: Option<String>,
}

#[derive(Clone)]
pub struct SlackWebTransport {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl SlackWebTransport {
    pub fn new(
        api_base: &str,
        bot_token: &str,
        proxy: Option<&str>,
        request_timeout_ms: u64,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("slackrun/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_millis(request_timeout_ms.max(1)));
        if let Some(proxy) = proxy {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy).with_context(|| format!("Invalid proxy URL {proxy}"))?,
            );
        }
        let http = builder.build().context("Creating Slack HTTP client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.trim().to_string(),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, payload: &Value) -> Result<T> {
        let response = self
            .http
            .post(format!("{}/{}", self.api_base, method))
            .bearer_auth(&self.bot_token)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Slack {method} request failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Slack {method} failed with status {}: {}", status.as_u16(), body);
        }
        response
            .json::<T>()
            .await
            .with_context(|| format!("Decoding Slack {method} response"))
    }

    /// Reserve an upload slot and push the file bytes into it. A rejection
    /// from Slack is handed back as `Err(response)`.
    async fn stage_file(&self, file: &FileUpload) -> Result<std::result::Result<String, SlackResponse>> {
        let raw: Value = self
            .call(
                "files.getUploadURLExternal",
                &json!({ "filename": file.filename, "length": file.content.len() }),
            )
            .await?;
        let slot: UploadUrlResponse = serde_json::from_value(raw.clone())
            .context("Decoding Slack files.getUploadURLExternal response")?;
        if !slot.ok {
            return Ok(Err(serde_json::from_value(raw)?));
        }
        let upload_url = slot
            .upload_url
            .ok_or_else(|| anyhow!("Slack files.getUploadURLExternal response missing upload_url"))?;
        let file_id = slot
            .file_id
            .ok_or_else(|| anyhow!("Slack files.getUploadURLExternal response missing file_id"))?;

        let upload = self
            .http
            .post(&upload_url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(file.content.clone().into_bytes())
            .send()
            .await
            .with_context(|| format!("Uploading {} to Slack", file.filename))?;
        if !upload.status().is_success() {
            let status = upload.status();
            let body = upload.text().await.unwrap_or_default();
            bail!("Slack file upload failed with status {}: {}", status.as_u16(), body);
        }
        Ok(Ok(file_id))
    }
}

#[async_trait]
impl MessageTransport for SlackWebTransport {
    async fn post_message(&self, request: &PostMessageRequest) -> Result<SlackResponse> {
        let payload = serde_json::to_value(request)?;
        self.call("chat.postMessage", &payload).await
    }

    async fn upload_files(&self, request: &UploadFilesRequest) -> Result<SlackResponse> {
        let mut files = Vec::with_capacity(request.file_uploads.len());
        for file in &request.file_uploads {
            match self.stage_file(file).await? {
                Ok(file_id) => files.push(json!({ "id": file_id, "title": file.title })),
                Err(rejected) => return Ok(rejected),
            }
        }

        let mut payload = json!({
            "files": files,
            "channel_id": request.channel_id,
            "initial_comment": request.initial_comment,
        });
        if let Some(thread_ts) = &request.thread_ts {
            payload["thread_ts"] = Value::String(thread_ts.clone());
        }
        self.call("files.completeUploadExternal", &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn transport(server: &MockServer) -> SlackWebTransport {
        SlackWebTransport::new(&server.base_url(), "xoxb-test", None, 2_000).unwrap()
    }

    fn post(thread_ts: Option<&str>) -> PostMessageRequest {
        PostMessageRequest {
            channel: "C1".to_string(),
            text: "✅ 1 ❌ 0 ⏩ 0".to_string(),
            blocks: vec![json!({ "type": "divider" })],
            unfurl_links: false,
            thread_ts: thread_ts.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn post_message_sends_blocks_with_bearer_token() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat.postMessage")
                .header("authorization", "Bearer xoxb-test")
                .json_body(json!({
                    "channel": "C1",
                    "text": "✅ 1 ❌ 0 ⏩ 0",
                    "blocks": [{ "type": "divider" }],
                    "unfurl_links": false,
                    "thread_ts": "1.5"
                }));
            then.status(200)
                .json_body(json!({ "ok": true, "channel": "C1", "ts": "1.6" }));
        });

        let response = transport(&server).post_message(&post(Some("1.5"))).await.unwrap();
        mock.assert();
        assert!(response.ok);
        assert_eq!(response.ts.as_deref(), Some("1.6"));
    }

    #[tokio::test]
    async fn rejection_is_returned_with_extra_fields() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat.postMessage");
            then.status(200).json_body(json!({
                "ok": false,
                "error": "channel_not_found",
                "response_metadata": { "messages": [] }
            }));
        });

        let response = transport(&server).post_message(&post(None)).await.unwrap();
        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("channel_not_found"));
        assert!(response.extra.contains_key("response_metadata"));
        assert!(response.to_pretty_json().contains("\"channel_not_found\""));
    }

    #[tokio::test]
    async fn http_error_status_is_a_transport_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat.postMessage");
            then.status(503).body("upstream down");
        });

        let err = transport(&server).post_message(&post(None)).await.unwrap_err();
        assert!(err.to_string().contains("status 503"), "{err}");
    }

    #[tokio::test]
    async fn upload_files_stages_each_file_then_completes_once() {
        let server = MockServer::start();
        let slot = server.mock(|when, then| {
            when.method(POST).path("/files.getUploadURLExternal");
            then.status(200).json_body(json!({
                "ok": true,
                "upload_url": server.url("/upload/F1"),
                "file_id": "F1"
            }));
        });
        let bytes = server.mock(|when, then| {
            when.method(POST).path("/upload/F1").body("log text");
            then.status(200);
        });
        let complete = server.mock(|when, then| {
            when.method(POST)
                .path("/files.completeUploadExternal")
                .json_body(json!({
                    "files": [
                        { "id": "F1", "title": "suite > a" },
                        { "id": "F1", "title": "suite > b" }
                    ],
                    "channel_id": "C1",
                    "initial_comment": "Console logs (1/1)",
                    "thread_ts": "9.9"
                }));
            then.status(200).json_body(json!({ "ok": true }));
        });

        let file = |title: &str| FileUpload {
            content: "log text".to_string(),
            filename: "a.txt".to_string(),
            title: title.to_string(),
        };
        let request = UploadFilesRequest {
            channel_id: "C1".to_string(),
            thread_ts: Some("9.9".to_string()),
            initial_comment: "Console logs (1/1)".to_string(),
            file_uploads: vec![file("suite > a"), file("suite > b")],
        };

        let response = transport(&server).upload_files(&request).await.unwrap();
        assert!(response.ok);
        assert_eq!(slot.calls(), 2);
        assert_eq!(bytes.calls(), 2);
        complete.assert();
    }

    #[tokio::test]
    async fn upload_slot_rejection_short_circuits() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/files.getUploadURLExternal");
            then.status(200)
                .json_body(json!({ "ok": false, "error": "not_authed" }));
        });
        let complete = server.mock(|when, then| {
            when.method(POST).path("/files.completeUploadExternal");
            then.status(200).json_body(json!({ "ok": true }));
        });

        let request = UploadFilesRequest {
            channel_id: "C1".to_string(),
            thread_ts: None,
            initial_comment: "Console logs (1/1)".to_string(),
            file_uploads: vec![FileUpload {
                content: "x".to_string(),
                filename: "x.txt".to_string(),
                title: "x".to_string(),
            }],
        };
        let response = transport(&server).upload_files(&request).await.unwrap();
        assert_eq!(response.error.as_deref(), Some("not_authed"));
        assert_eq!(complete.calls(), 0);
    }
}
