use anyhow::{anyhow, Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono_tz::Tz;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::Config;
use crate::models::Caller;
use crate::reply::{Envelope, Reply};
use crate::session::{Services, SessionHandler};
use crate::validation::validate_email;
use crate::websocket::{Outbound, Outbox, SessionHub};

// State shared across handlers
pub struct AppState {
    pub services: Arc<Services>,
    pub hub: SessionHub,
    pub default_timezone: Tz,
}

/// Identity supplied by the authentication layer in front of the service.
#[derive(Debug, Default, Deserialize)]
pub struct Identity {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub timezone: Option<String>,
}

impl Identity {
    /// `None` unless the id is a UUID, the email is well formed and the
    /// timezone (when given) is a known IANA name.
    pub fn caller(&self, default_timezone: Tz) -> Option<Caller> {
        let id = Uuid::parse_str(self.user_id.as_deref()?.trim()).ok()?;
        let email = self.email.as_deref()?.trim();
        if !validate_email(email) {
            return None;
        }
        let timezone = match self.timezone.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.parse::<Tz>().ok()?,
            _ => default_timezone,
        };
        Some(Caller {
            id,
            email: email.to_string(),
            timezone,
        })
    }
}

// Health check endpoint
async fn health_check() -> &'static str {
    "taqvim is running"
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(identity): Query<Identity>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(caller) = identity.caller(state.default_timezone) else {
        warn!("Rejecting WebSocket upgrade without a valid identity");
        return (StatusCode::UNAUTHORIZED, "Missing or invalid identity").into_response();
    };
    info!("New WebSocket upgrade request from {}", caller.email);
    ws.on_upgrade(move |socket| handle_socket(socket, state, caller))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, caller: Caller) {
    let connection_id = Uuid::new_v4();
    let owner = caller.id;
    info!("Session[{}]: Connection established for {}", connection_id, caller.email);

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    // Forward queued messages (replies and broadcasts) to the socket
    let forwarder = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            if sink.send(Message::Text(outbound.text.into())).await.is_err() {
                break;
            }
            if let Some(written) = outbound.written {
                let _ = written.send(());
            }
        }
    });

    state.hub.register(owner, connection_id, tx.clone());
    let handler = SessionHandler::new(Arc::clone(&state.services), caller);
    let mut open = send_reply(&tx, connection_id, handler.welcome()).await;

    // One message at a time: the next is read only after this one is written
    while open {
        let Some(msg) = stream.next().await else {
            break;
        };
        let text = match msg {
            Ok(Message::Text(text)) => {
                debug!("Session[{}]: Received text message ({} bytes)", connection_id, text.len());
                text.as_str().to_owned()
            }
            Ok(Message::Binary(bin)) => {
                debug!("Session[{}]: Received binary message of {} bytes", connection_id, bin.len());
                match String::from_utf8(bin.to_vec()) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Session[{}]: Failed to decode binary as UTF-8: {}", connection_id, e);
                        let reply = Reply::error("validation_failure", "Could not decode binary data as UTF-8");
                        open = send_reply(&tx, connection_id, Envelope::new(reply, state.services.clock.now())).await;
                        continue;
                    }
                }
            }
            Ok(Message::Close(reason)) => {
                if let Some(r) = reason {
                    info!(
                        "Session[{}]: Connection closed by client with code {} and reason: {}",
                        connection_id, r.code, r.reason
                    );
                } else {
                    info!("Session[{}]: Connection closed by client", connection_id);
                }
                break;
            }
            Err(e) => {
                error!("Session[{}]: Communication error: {}", connection_id, e);
                break;
            }
            _ => {
                debug!("Session[{}]: Received ping/pong message", connection_id);
                continue;
            }
        };

        let outcome = handler.handle(&text).await;
        open = send_reply(&tx, connection_id, outcome.reply).await;
        if let Some(notification) = outcome.broadcast {
            let delivered = state.hub.broadcast(owner, connection_id, &notification.to_json());
            debug!("Session[{}]: Notification queued for {} other sessions", connection_id, delivered);
        }
    }

    state.hub.unregister(owner, connection_id);
    drop(tx);
    if let Err(e) = forwarder.await {
        debug!("Session[{}]: Forwarder ended abnormally: {}", connection_id, e);
    }
    info!("Session[{}]: Connection closed", connection_id);
}

/// Queue `envelope` and wait until the forwarder has written it. `false` once
/// the socket is gone.
async fn send_reply(tx: &Outbox, connection_id: Uuid, envelope: Envelope) -> bool {
    let (outbound, written) = Outbound::acked(envelope.to_json());
    if tx.send(outbound).is_err() || written.await.is_err() {
        error!("Session[{}]: Error sending response, socket is gone", connection_id);
        return false;
    }
    true
}

pub fn cors_layer(allowed_origin: Option<&str>) -> Result<CorsLayer> {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    Ok(match allowed_origin {
        Some(origin) => cors.allow_origin(
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("Invalid allowed_origin: {}", origin))?,
        ),
        None => cors.allow_origin(Any),
    })
}

pub fn router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(websocket_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_api_server(config: &Config, services: Arc<Services>) -> Result<()> {
    let state = Arc::new(AppState {
        services,
        hub: SessionHub::new(),
        default_timezone: config.interpreter.default_timezone,
    });
    let app = router(state, cors_layer(config.server.allowed_origin.as_deref())?);

    let addr: SocketAddr = config
        .server
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.server.bind_address))?;
    info!("API server starting on http://{}", addr);
    info!("WebSocket endpoint available at ws://{}/ws", addr);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow!("Failed to bind to address: {}", e))?;

    info!("API server successfully bound to {}. Waiting for connections...", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow!("Failed to start API server: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Asia::Tashkent;

    fn identity(user_id: &str, email: &str, timezone: Option<&str>) -> Identity {
        Identity {
            user_id: Some(user_id.to_string()),
            email: Some(email.to_string()),
            timezone: timezone.map(str::to_string),
        }
    }

    #[test]
    fn identity_requires_id_and_email() {
        let id = Uuid::new_v4().to_string();
        assert!(Identity::default().caller(Tashkent).is_none());
        assert!(identity("not-a-uuid", "a@example.com", None).caller(Tashkent).is_none());
        assert!(identity(&id, "nobody", None).caller(Tashkent).is_none());
    }

    #[test]
    fn identity_timezone_falls_back_to_default() {
        let id = Uuid::new_v4().to_string();
        let caller = identity(&id, "a@example.com", None).caller(Tashkent).unwrap();
        assert_eq!(caller.timezone, Tashkent);

        let caller = identity(&id, "a@example.com", Some("Europe/Moscow"))
            .caller(Tashkent)
            .unwrap();
        assert_eq!(caller.timezone, chrono_tz::Europe::Moscow);

        assert!(identity(&id, "a@example.com", Some("Mars/Base"))
            .caller(Tashkent)
            .is_none());
    }

    fn envelope() -> Envelope {
        Envelope::new(Reply::error("validation_failure", "nope"), chrono::Utc::now())
    }

    #[tokio::test]
    async fn replies_wait_for_the_write() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
        let written = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = Arc::clone(&written);
        tokio::spawn(async move {
            while let Some(outbound) = rx.recv().await {
                tokio::task::yield_now().await;
                log.lock().unwrap().push(outbound.text);
                if let Some(ack) = outbound.written {
                    let _ = ack.send(());
                }
            }
        });

        assert!(send_reply(&tx, Uuid::new_v4(), envelope()).await);
        assert_eq!(written.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replies_to_a_closed_socket_report_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
        // The forwarder gave up: frames are dropped unwritten.
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        assert!(!send_reply(&tx, Uuid::new_v4(), envelope()).await);

        let (tx, rx) = mpsc::unbounded_channel::<Outbound>();
        drop(rx);
        assert!(!send_reply(&tx, Uuid::new_v4(), envelope()).await);
    }

    #[test]
    fn cors_rejects_malformed_origins() {
        assert!(cors_layer(None).is_ok());
        assert!(cors_layer(Some("https://app.example.com")).is_ok());
        assert!(cors_layer(Some("bad\norigin")).is_err());
    }
}
