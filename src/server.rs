// src/server.rs
// HTTP surface: liveness, test message and the chat webhook

use crate::alerts::dispatcher::MessageSender;
use crate::bot::handler::BotHandler;
use crate::bot::update::parse_update_bytes;
use crate::domain::errors::AppResult;
use chrono::Utc;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

pub struct ServerState {
    pub sender: Arc<dyn MessageSender>,
    /// Chat receiving `/test` messages
    pub destination: String,
    pub bot: Arc<BotHandler>,
}

impl ServerState {
    pub fn new(sender: Arc<dyn MessageSender>, destination: &str, bot: Arc<BotHandler>) -> Self {
        Self {
            sender,
            destination: destination.to_string(),
            bot,
        }
    }
}

/// Serve until `shutdown` flips to true
pub async fn serve(
    addr: SocketAddr,
    state: Arc<ServerState>,
    mut shutdown: watch::Receiver<bool>,
) -> AppResult<()> {
    let make_svc = make_service_fn(move |_conn| {
        let state = Arc::clone(&state);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let state = Arc::clone(&state);
                handle_request(req, state)
            }))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    log::info!("HTTP server listening on http://{}", addr);
    log::info!("Endpoints: GET /, GET /test, POST /webhook");

    server
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;

    log::info!("HTTP server stopped");
    Ok(())
}

pub async fn handle_request(
    req: Request<Body>,
    state: Arc<ServerState>,
) -> Result<Response<Body>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/") => json_response(
            StatusCode::OK,
            json!({ "status": "ok", "service": "saathi_bot", "time": Utc::now().to_rfc3339() }),
        ),
        (&Method::GET, "/test") => handle_test(&state).await,
        (&Method::POST, "/webhook") => handle_webhook(req, &state).await,
        _ => json_response(StatusCode::NOT_FOUND, json!({ "error": "not found" })),
    };
    Ok(response)
}

async fn handle_test(state: &ServerState) -> Response<Body> {
    let text = format!(
        "✅ Test message from saathi_bot at {}",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );

    match state.sender.send_text(&state.destination, &text).await {
        Ok(()) => json_response(StatusCode::OK, json!({ "sent": true })),
        Err(e) => {
            log::error!("Test message failed: {}", e);
            json_response(
                StatusCode::BAD_GATEWAY,
                json!({ "sent": false, "error": e.to_string() }),
            )
        }
    }
}

async fn handle_webhook(req: Request<Body>, state: &ServerState) -> Response<Body> {
    let body = match hyper::body::to_bytes(req.into_body()).await {
        Ok(body) => body,
        Err(e) => {
            log::warn!("Failed to read webhook body: {}", e);
            return json_response(StatusCode::BAD_REQUEST, json!({ "error": "unreadable body" }));
        }
    };

    match parse_update_bytes(&body) {
        Ok(Some(update)) => {
            log::debug!("Webhook update {}", update.update_id);
            state.bot.spawn(update);
            json_response(StatusCode::OK, json!({ "ok": true }))
        }
        Ok(None) => json_response(StatusCode::OK, json!({ "ok": true, "ignored": true })),
        Err(e) => {
            log::warn!("Rejected webhook payload: {}", e);
            json_response(StatusCode::BAD_REQUEST, json!({ "error": "invalid update" }))
        }
    }
}

fn json_response(status: StatusCode, body: Value) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
