use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{InitRequest, SessionHandle, SessionService};
use crate::encode::jpeg::EncodedFrame;
use crate::error::{RenderError, RenderResult};

const USER_AGENT: &str = concat!("vinylcast/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct InitResponse {
    session_id: Option<Value>,
    audio_url: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FinishResponse {
    url: Option<String>,
    error: Option<String>,
}

/// Session service reached over HTTP under `{api_root}/videogen/*`.
pub struct HttpSession {
    client: Client,
    api_root: String,
}

impl HttpSession {
    pub fn new(api_root: &str, timeout: Duration) -> RenderResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| RenderError::initialization(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_root: api_root.trim_end_matches('/').to_string(),
        })
    }

    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_root, path)
    }

    /// Raw time-tagged transcript for a track. A missing transcript is not
    /// an error for the render, so callers usually log and continue.
    pub fn fetch_lyrics(&self, track_id: &str, source: &str) -> RenderResult<String> {
        let url = Url::parse_with_params(
            &self.endpoint("lyric"),
            &[("id", track_id), ("source", source)],
        )
        .map_err(|e| RenderError::resource(format!("lyric URL: {}", e)))?;
        self.client
            .get(url)
            .send()
            .and_then(Response::error_for_status)
            .and_then(Response::text)
            .map_err(|e| RenderError::resource(format!("fetching lyrics: {}", e)))
    }

    /// Route a remote cover through the service's image proxy.
    pub fn cover_url(&self, raw: &str) -> String {
        cover_proxy_url(&self.api_root, raw)
    }
}

impl SessionService for HttpSession {
    fn init(&mut self, request: &InitRequest) -> RenderResult<SessionHandle> {
        let builder = self.client.post(self.endpoint("videogen/init"));
        let builder = match &request.audio {
            Some(audio) => {
                let part = Part::bytes(audio.bytes.clone()).file_name(audio.file_name.clone());
                let form = Form::new()
                    .text("id", request.track_id.clone())
                    .text("source", request.source.clone())
                    .part("audio_file", part);
                log::info!(
                    "Creating render session with local audio {} ({} bytes)",
                    audio.file_name,
                    audio.bytes.len()
                );
                builder.multipart(form)
            }
            None => {
                log::info!(
                    "Creating render session for {} ({})",
                    request.track_id,
                    request.source
                );
                builder.json(&json!({ "id": request.track_id, "source": request.source }))
            }
        };

        let response = builder
            .send()
            .map_err(|e| RenderError::initialization(e.to_string()))?;
        let status = response.status();
        let body: InitResponse = response.json().map_err(|e| {
            RenderError::initialization(format!("unreadable init response ({}): {}", status, e))
        })?;
        let handle = parse_init(body, &self.api_root, request.audio.is_some())?;
        log::info!("Session {} created", handle.session_id);
        Ok(handle)
    }

    fn fetch_audio(&mut self, handle: &SessionHandle) -> RenderResult<Vec<u8>> {
        log::info!("Downloading audio from {}", handle.audio_locator);
        let bytes = self
            .client
            .get(&handle.audio_locator)
            .send()
            .and_then(Response::error_for_status)
            .and_then(Response::bytes)
            .map_err(|e| RenderError::decode(format!("audio download failed: {}", e)))?;
        Ok(bytes.to_vec())
    }

    fn push_frames(
        &mut self,
        session_id: &str,
        start_index: usize,
        frames: &[EncodedFrame],
    ) -> RenderResult<()> {
        let urls: Vec<String> = frames.iter().map(EncodedFrame::data_url).collect();
        let body = json!({
            "session_id": session_id,
            "start_idx": start_index,
            "frames": urls,
        });
        self.client
            .post(self.endpoint("videogen/frame"))
            .json(&body)
            .send()
            .and_then(Response::error_for_status)
            .map_err(|e| RenderError::upload(start_index, e.to_string()))?;
        log::debug!(
            "Uploaded frames {}..{} to session {}",
            start_index,
            start_index + frames.len(),
            session_id
        );
        Ok(())
    }

    fn finish(&mut self, session_id: &str, title: &str) -> RenderResult<String> {
        log::info!("Finalizing session {}", session_id);
        let response = self
            .client
            .post(self.endpoint("videogen/finish"))
            .json(&json!({ "session_id": session_id, "name": title }))
            .send()
            .map_err(|e| RenderError::finalize(e.to_string()))?;
        let status = response.status();
        let body: FinishResponse = response.json().map_err(|e| {
            RenderError::finalize(format!("unreadable finish response ({}): {}", status, e))
        })?;
        parse_finish(body, &self.api_root)
    }
}

/// `has_payload` is false when the audio must be downloaded afterwards, so
/// the response has to say where from.
fn parse_init(
    body: InitResponse,
    api_root: &str,
    has_payload: bool,
) -> RenderResult<SessionHandle> {
    if let Some(error) = body.error.filter(|e| !e.is_empty()) {
        return Err(RenderError::initialization(error));
    }
    let session_id = match body.session_id {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(RenderError::initialization("response carries no session_id")),
    };
    let audio_url = body.audio_url.unwrap_or_default();
    if audio_url.is_empty() && !has_payload {
        return Err(RenderError::initialization(format!(
            "session {} has no audio_url to download",
            session_id
        )));
    }
    Ok(SessionHandle {
        session_id,
        audio_locator: resolve(api_root, &audio_url),
    })
}

fn parse_finish(body: FinishResponse, api_root: &str) -> RenderResult<String> {
    if let Some(error) = body.error.filter(|e| !e.is_empty()) {
        return Err(RenderError::finalize(error));
    }
    match body.url {
        Some(url) if !url.is_empty() => Ok(format!("{}{}", api_root, url)),
        _ => Err(RenderError::finalize("response carries no download url")),
    }
}

/// Absolute URLs pass through; anything else is taken relative to the API root.
fn resolve(api_root: &str, locator: &str) -> String {
    if locator.starts_with("http://") || locator.starts_with("https://") || locator.is_empty() {
        locator.to_string()
    } else if locator.starts_with('/') {
        format!("{}{}", api_root, locator)
    } else {
        format!("{}/{}", api_root, locator)
    }
}

fn cover_proxy_url(api_root: &str, raw: &str) -> String {
    if raw.starts_with("data:") {
        return raw.to_string();
    }
    let base = format!("{}/download_cover", api_root);
    match Url::parse_with_params(&base, &[("url", raw), ("name", "render"), ("artist", "render")])
    {
        Ok(url) => url.to_string(),
        Err(_) => raw.to_string(),
    }
}
