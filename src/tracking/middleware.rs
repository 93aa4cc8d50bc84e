//! Request tracking middleware
//!
//! Install with `route_layer` so the matched route template and raw path
//! parameters are available:
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/users/:id", get(get_user))
//!     .route_layer(middleware::from_fn_with_state(tracking, track_requests));
//! ```

use axum::{
    body::{Body, Bytes, HttpBody},
    extract::{ConnectInfo, MatchedPath, RawPathParams, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::{json, Map, Value};
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::config::TrackingConfig;
use crate::identity::{hash_client_ip, hash_identifier, identify_client, resolve_client_ip};
use crate::logging::{redact_sensitive_fields, sanitize_log_value};
use crate::store::record::round2;
use crate::store::NewLogRecord;
use crate::tracking::RecordWriter;

const DEFAULT_ROLE: &str = "user";

/// Identity of the authenticated caller
///
/// Inserted into request extensions by the application's auth layer (which
/// must run before tracking), or into response extensions by a handler.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: String,
    /// Defaults to `"user"` when absent
    pub role: Option<String>,
}

/// State for the tracking middleware
#[derive(Clone)]
pub struct TrackingState {
    pub writer: RecordWriter,
    pub settings: Arc<TrackingConfig>,
}

impl TrackingState {
    pub fn new(writer: RecordWriter, settings: TrackingConfig) -> Self {
        Self {
            writer,
            settings: Arc::new(settings),
        }
    }

    /// Whether `path` is skipped: tracking disabled, configured exclusions,
    /// or the devtrack routes themselves
    pub fn is_excluded(&self, path: &str) -> bool {
        let settings = &self.settings;
        if !settings.enabled {
            return true;
        }

        let mount = settings.mount_path.trim_end_matches('/');
        if !mount.is_empty()
            && (path == mount || path.strip_prefix(mount).is_some_and(|rest| rest.starts_with('/')))
        {
            return true;
        }

        settings.exclude_paths.iter().any(|excluded| {
            if excluded.ends_with('/') {
                path.starts_with(excluded.as_str())
            } else {
                path == excluded
            }
        })
    }
}

/// Record every non-excluded request after its response is produced
///
/// Tracking never alters the response: capture problems end up in the stored
/// record and write failures are only logged.
pub async fn track_requests(
    State(state): State<TrackingState>,
    matched_path: Option<MatchedPath>,
    path_params: Option<RawPathParams>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if state.is_excluded(&path) {
        return next.run(request).await;
    }

    let started = Instant::now();
    let timestamp = Utc::now();

    let (parts, body) = request.into_parts();
    let (request_body, body) = capture_body(&parts.headers, body, &state.settings).await;

    let method = parts.method.to_string();
    let headers = parts.headers.clone();
    let query_params = parts
        .uri
        .query()
        .map(|q| collect_params(url::form_urlencoded::parse(q.as_bytes())))
        .unwrap_or_default();
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let request_user = parts.extensions.get::<AuthenticatedUser>().cloned();

    let response = next.run(Request::from_parts(parts, body)).await;

    let duration_ms = round2(started.elapsed().as_secs_f64() * 1000.0);
    let user = request_user.or_else(|| response.extensions().get::<AuthenticatedUser>().cloned());

    let client_ip = resolve_client_ip(&headers, peer);
    let identity = identify_client(&headers, user.as_ref().map(|u| u.id.as_str()), &client_ip);
    if let Some(identity) = &identity {
        tracing::trace!(
            client = %sanitize_log_value(&identity.to_string()),
            path = %path,
            "Identified client"
        );
    }

    let mut record = NewLogRecord::new(method, path.clone(), response.status().as_u16(), timestamp);
    record.path_pattern = matched_path
        .map(|m| m.as_str().to_string())
        .unwrap_or(path);
    record.client_ip = Some(hash_client_ip(&client_ip));
    record.duration_ms = Some(duration_ms);
    record.user_agent = header_str(&headers, header::USER_AGENT.as_str()).and_then(hash_identifier);
    record.referer = header_str(&headers, header::REFERER.as_str()).map(str::to_string);
    record.query_params = query_params;
    record.path_params = path_params
        .map(|params| {
            params
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect()
        })
        .unwrap_or_default();
    record.request_body = request_body;
    record.response_size = response_size(&response);
    record.user_id = user.as_ref().and_then(|u| hash_identifier(&u.id));
    record.role = user.map(|u| u.role.unwrap_or_else(|| DEFAULT_ROLE.to_string()));
    record.trace_id = Some(
        header_str(&headers, "x-request-id")
            .or_else(|| header_str(&headers, "x-trace-id"))
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
    );
    record.client_identifier_hash = identity.and_then(|i| i.hash());

    state.writer.record(record);
    response
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Query/form pairs as a JSON object; repeated keys collect into an array
fn collect_params<'a>(pairs: impl Iterator<Item = (Cow<'a, str>, Cow<'a, str>)>) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in pairs {
        let value = Value::String(value.into_owned());
        match map.get_mut(key.as_ref()) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key.into_owned(), value);
            }
        }
    }
    map
}

enum BodyKind {
    Json,
    Form,
    Other,
    Absent,
}

fn body_kind(headers: &HeaderMap) -> BodyKind {
    let Some(content_type) = header_str(headers, header::CONTENT_TYPE.as_str()) else {
        return BodyKind::Absent;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "application/json" => BodyKind::Json,
        "application/x-www-form-urlencoded" => BodyKind::Form,
        _ if essence.ends_with("+json") => BodyKind::Json,
        _ => BodyKind::Other,
    }
}

/// Buffer and parse small JSON/form bodies, handing back an equivalent body
/// for the inner service
async fn capture_body(headers: &HeaderMap, body: Body, settings: &TrackingConfig) -> (Value, Body) {
    let kind = body_kind(headers);
    if matches!(kind, BodyKind::Absent) {
        return (json!({}), body);
    }
    if matches!(kind, BodyKind::Other) {
        return (json!({"error": "Unsupported content type"}), body);
    }

    let content_length = header_str(headers, header::CONTENT_LENGTH.as_str())
        .and_then(|v| v.parse::<usize>().ok())
        .or_else(|| body.size_hint().exact().and_then(|n| usize::try_from(n).ok()));
    match content_length {
        Some(0) => return (json!({}), body),
        Some(len) if len <= settings.max_body_bytes => {}
        _ => return (json!({"error": "Request body too large to capture"}), body),
    }

    let mut frames = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut buffered = 0usize;
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(chunk) => {
                buffered += chunk.len();
                chunks.push(chunk);
                if buffered > settings.max_body_bytes {
                    // Announced length was wrong: replay what was read, then the rest
                    let replay = stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>))
                        .chain(frames);
                    return (
                        json!({"error": "Request body too large to capture"}),
                        Body::from_stream(replay),
                    );
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to buffer request body for tracking");
                let value = json!({"error": format!("Failed to read body: {}", e)});
                // The handler must observe the same read failure
                let replay = chunks.into_iter().map(Ok).chain(std::iter::once(Err(e)));
                return (value, Body::from_stream(stream::iter(replay)));
            }
        }
    }

    let bytes = Bytes::from(chunks.concat());
    let mut value = parse_body(&kind, &bytes);
    redact_sensitive_fields(&mut value, &settings.sensitive_fields);
    (value, Body::from(bytes))
}

fn parse_body(kind: &BodyKind, bytes: &Bytes) -> Value {
    if bytes.is_empty() {
        return json!({});
    }
    match kind {
        BodyKind::Json => serde_json::from_slice(bytes)
            .unwrap_or_else(|e| json!({"error": format!("Invalid JSON: {}", e)})),
        BodyKind::Form => Value::Object(collect_params(url::form_urlencoded::parse(bytes))),
        BodyKind::Other | BodyKind::Absent => json!({}),
    }
}

fn response_size(response: &Response) -> u64 {
    header_str(response.headers(), header::CONTENT_LENGTH.as_str())
        .and_then(|v| v.parse().ok())
        .or_else(|| response.body().size_hint().exact())
        .unwrap_or(0)
}
