use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{
    body::Body,
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::http1,
    service::service_fn,
    Method, Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::json;
use std::{convert::Infallible, fmt::Display, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

use checkin_timeline::{unix_timestamp, CheckIn, CheckInStatus};

use crate::db::{TimelineData, WindowKey};
use crate::error::{ApiError, Result};

const DEFAULT_WINDOW_SECS: i64 = 86_400;

pub async fn run_http_server(
    address: String,
    data: Arc<TimelineData>,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(&address).await?;
    info!("HTTP timeline API listening on http://{}", address);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let data = data.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let data = data.clone();
                async move { handle_request(req, data).await }
            });

            if let Err(err) = http1::Builder::new()
                .keep_alive(true)
                .serve_connection(io, service)
                .await
            {
                error!("Error serving connection: {:?}", err);
            }
        });
    }
}

/// Route one request. Generic over the body so it can be driven in-process.
pub async fn handle_request<B>(
    req: Request<B>,
    data: Arc<TimelineData>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: Display,
{
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().unwrap_or("");

    let response = match (&parts.method, path.as_str()) {
        (&Method::GET, "/health") => json_response(StatusCode::OK, json!({ "healthy": true })),
        (&Method::GET, "/api/timeline/config") => {
            respond(serve_window_config(&data, query), StatusCode::OK)
        }
        (method, path) if path.starts_with("/api/monitors/") => {
            match (method, monitor_route(path)) {
                (&Method::GET, Some((monitor_id, "timeline"))) => {
                    respond(serve_timeline(&data, monitor_id, query).await, StatusCode::OK)
                }
                (&Method::POST, Some((monitor_id, "checkins"))) => match body.collect().await {
                    Ok(collected) => respond(
                        record_check_in(&data, monitor_id, &collected.to_bytes()).await,
                        StatusCode::CREATED,
                    ),
                    Err(e) => {
                        error!("Error reading request body: {}", e);
                        json_response(
                            StatusCode::BAD_REQUEST,
                            json!({ "error": "unreadable request body" }),
                        )
                    }
                },
                _ => not_found(),
            }
        }
        _ => not_found(),
    };

    Ok(response)
}

/// Split `/api/monitors/{id}/{action}` into its id and action.
fn monitor_route(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix("/api/monitors/")?;
    let (monitor_id, action) = rest.split_once('/')?;
    if monitor_id.is_empty() || action.contains('/') {
        return None;
    }
    Some((monitor_id, action))
}

fn serve_window_config(data: &TimelineData, query: &str) -> Result<serde_json::Value> {
    let key = parse_window_query(query, unix_timestamp(), data.default_width())?;
    let config = data.window_config(&key)?;
    Ok(serde_json::to_value(config)?)
}

async fn serve_timeline(
    data: &TimelineData,
    monitor_id: &str,
    query: &str,
) -> Result<serde_json::Value> {
    let key = parse_window_query(query, unix_timestamp(), data.default_width())?;
    let timeline = data.timeline(monitor_id, &key).await?;
    Ok(serde_json::to_value(timeline)?)
}

#[derive(Debug, Deserialize)]
struct CheckInRequest {
    status: CheckInStatus,
    timestamp: Option<i64>,
}

async fn record_check_in(
    data: &TimelineData,
    monitor_id: &str,
    body: &[u8],
) -> Result<serde_json::Value> {
    let request: CheckInRequest = serde_json::from_slice(body)?;
    let check_in = CheckIn {
        monitor_id: monitor_id.to_string(),
        timestamp: request.timestamp.unwrap_or_else(unix_timestamp),
        status: request.status,
    };

    data.record_check_in(&check_in).await?;
    Ok(serde_json::to_value(check_in)?)
}

/// Parse `since`, `until`, `width` and `utc_offset` from a query string.
///
/// `until` defaults to `now` and `since` to one day before `until`.
fn parse_window_query(query: &str, now: i64, default_width: u32) -> Result<WindowKey> {
    let mut since = None;
    let mut until = None;
    let mut width = default_width;
    let mut utc_offset_secs = 0;

    for param in query.split('&') {
        if let Some((key, value)) = param.split_once('=') {
            match key {
                "since" => since = Some(parse_number::<i64>(key, value)?),
                "until" => until = Some(parse_number::<i64>(key, value)?),
                "width" => width = parse_number::<u32>(key, value)?,
                "utc_offset" => utc_offset_secs = parse_utc_offset(value)?,
                _ => {}
            }
        }
    }

    let until = until.unwrap_or(now);
    let since = match since {
        Some(since) => since,
        None => until.checked_sub(DEFAULT_WINDOW_SECS).ok_or_else(|| {
            ApiError::InvalidParameter(format!(
                "until={} leaves no room for a default window",
                until
            ))
        })?,
    };

    if since >= until {
        return Err(ApiError::InvalidParameter(format!(
            "since ({}) must be before until ({})",
            since, until
        )));
    }
    if width == 0 {
        return Err(ApiError::InvalidParameter("width must be positive".to_string()));
    }

    Ok(WindowKey {
        since,
        until,
        width,
        utc_offset_secs,
    })
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| ApiError::InvalidParameter(format!("{}={} is not a valid number", key, value)))
}

/// Parse `+HH:MM`, `-HH:MM`, `+HHMM`, `Z` or `UTC` into seconds east of UTC.
fn parse_utc_offset(value: &str) -> Result<i32> {
    let value = value
        .replace("%2B", "+")
        .replace("%2b", "+")
        .replace("%3A", ":")
        .replace("%3a", ":");
    let invalid = || ApiError::InvalidParameter(format!("utc_offset={} is not an offset", value));

    if value == "Z" || value.eq_ignore_ascii_case("utc") {
        return Ok(0);
    }

    let (sign, digits) = match value.as_bytes().first() {
        Some(b'+') => (1, &value[1..]),
        Some(b'-') => (-1, &value[1..]),
        _ => return Err(invalid()),
    };
    let digits = digits.replace(':', "");
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    Ok(sign * (hours * 3600 + minutes * 60))
}

fn respond(result: Result<serde_json::Value>, success: StatusCode) -> Response<Full<Bytes>> {
    match result {
        Ok(body) => json_response(success, body),
        Err(e) => {
            let status = e.status_code();
            if status.is_server_error() {
                error!("Request failed: {}", e);
            } else {
                info!("Rejected request: {}", e);
            }
            json_response(status, json!({ "error": e.to_string() }))
        }
    }
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn not_found() -> Response<Full<Bytes>> {
    json_response(StatusCode::NOT_FOUND, json!({ "error": "not found" }))
}
