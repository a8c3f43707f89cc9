//! The single query endpoint: dispatches on `?type=live|archive|list`
//! and, for `live`/`archive`, on whether the request carries a
//! WebSocket upgrade (spec.md §6 "HTTP query API").

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use metricsd_engine::Watcher;

use crate::response::{csv_body, csv_row, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RawParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub metric: Option<String>,
    pub channels: Option<String>,
    pub from: Option<i64>,
    pub length: Option<i64>,
    pub granularity: Option<i64>,
    pub offset: Option<i64>,
    pub pattern: Option<String>,
}

fn required_str(value: &Option<String>, field: &str) -> Result<String, ApiError> {
    match value.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(ApiError::bad_request(format!("{field} is required"))),
    }
}

fn required_i64(value: Option<i64>, field: &str) -> Result<i64, ApiError> {
    value.ok_or_else(|| ApiError::bad_request(format!("{field} is required")))
}

fn split_channels(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

fn plain_text(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

/// GET `/?type=...` — routes to the live/archive/list handlers.
pub async fn query_handler(
    State(state): State<AppState>,
    Query(params): Query<RawParams>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let kind = match required_str(&params.kind, "type") {
        Ok(k) => k,
        Err(e) => return e.into_response(),
    };

    let result = match kind.as_str() {
        "live" => handle_live(&state, &params, ws).await,
        "archive" => handle_archive(&state, &params, ws).await,
        "list" => handle_list(&state, &params),
        other => Err(ApiError::bad_request(format!("unknown type: {other}"))),
    };

    match result {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn handle_live(
    state: &AppState,
    params: &RawParams,
    ws: Option<WebSocketUpgrade>,
) -> Result<Response, ApiError> {
    let metric = required_str(&params.metric, "metric")?;
    let channels = split_channels(&required_str(&params.channels, "channels")?);

    if let Some(ws) = ws {
        let watcher = state.engine.live_watch(&metric, &channels)?;
        return Ok(ws.on_upgrade(move |socket| forward_watcher(socket, watcher)));
    }

    let (rows, oldest_ts) = state.engine.live_log(&metric, &channels)?;
    Ok(plain_text(csv_body(oldest_ts, 1, &rows)))
}

async fn handle_archive(
    state: &AppState,
    params: &RawParams,
    ws: Option<WebSocketUpgrade>,
) -> Result<Response, ApiError> {
    let metric = required_str(&params.metric, "metric")?;
    let channels = split_channels(&required_str(&params.channels, "channels")?);

    if let Some(ws) = ws {
        let offset = required_i64(params.offset, "offset")?;
        let granularity = required_i64(params.granularity, "granularity")?;
        let watcher = state.engine.watch(&metric, &channels, offset, granularity)?;
        return Ok(ws.on_upgrade(move |socket| forward_watcher(socket, watcher)));
    }

    let from = required_i64(params.from, "from")?;
    let length = required_i64(params.length, "length")?;
    let granularity = required_i64(params.granularity, "granularity")?;
    let rows = state.engine.log(&metric, &channels, from, length, granularity)?;
    let spacing = granularity * 60;
    Ok(plain_text(csv_body(from + spacing, spacing, &rows)))
}

fn handle_list(state: &AppState, params: &RawParams) -> Result<Response, ApiError> {
    let pattern = params.pattern.as_deref().unwrap_or("*");
    let names = state.engine.list_names(pattern)?;
    let mut body = names.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    Ok(plain_text(body))
}

/// Forwards every value a watcher produces to the socket as a CSV text
/// frame, in the strictly increasing `ts` order the engine guarantees
/// (spec.md §5 "Within a watcher channel"). Closes the watcher when
/// the socket goes away in either direction.
async fn forward_watcher(mut socket: WebSocket, mut watcher: Watcher) {
    loop {
        tokio::select! {
            row = watcher.recv() => {
                match row {
                    Some((ts, values)) => {
                        if socket.send(Message::Text(csv_row(ts, &values))).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                if incoming.is_none() {
                    break;
                }
            }
        }
    }
    watcher.close();
}
