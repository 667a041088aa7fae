//! Progress push channels: Server-Sent Events and WebSocket.
//!
//! Both are passive: every connection is one [`ProgressHub`] subscription and
//! receives every [`ProgressEvent`] published after it connected, serialized
//! as JSON.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use tubemux_models::ProgressEvent;
use tubemux_progress::ProgressHub;

use crate::metrics;
use crate::state::AppState;

/// Global counter for active WebSocket connections.
static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

const WS_SEND_BUFFER_SIZE: usize = 32;
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const SSE_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// GET /api/download/events
pub async fn progress_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let hub = state.hub();
    let subscription = hub.subscribe();
    metrics::record_sse_connection();
    metrics::set_progress_subscribers(hub.subscriber_count());
    debug!(subscription = %subscription.id(), "SSE subscriber connected");

    let stream = subscription
        .into_stream()
        .map(|event| Event::default().json_data(event));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(SSE_KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

/// GET /ws/progress
pub async fn ws_progress(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let hub = state.hub().clone();

    ws.on_upgrade(|socket| async move {
        let count = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_ws_active_connections(count);
        metrics::record_ws_connection();

        handle_progress_socket(socket, &hub).await;

        let count = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_ws_active_connections(count);
        metrics::set_progress_subscribers(hub.subscriber_count());
    })
}

/// Queue a progress frame, waiting for room if the send buffer is full.
async fn send_ws_event(tx: &mpsc::Sender<Message>, event: &ProgressEvent) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(_) => return false,
    };
    match tx.try_send(Message::Text(json)) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(msg)) => {
            debug!("WebSocket send buffer full, applying backpressure");
            tx.send(msg).await.is_ok()
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Forward hub events to one socket until either side goes away.
///
/// A client that stops reading eventually fills the hub buffer, the hub drops
/// the subscription and the socket is closed.
async fn handle_progress_socket(socket: WebSocket, hub: &ProgressHub) {
    let (ws_sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);

    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let mut subscription = hub.subscribe();
    let subscription_id = subscription.id();
    metrics::set_progress_subscribers(hub.subscriber_count());
    info!(subscription = %subscription_id, "WebSocket progress subscriber connected");

    let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            event = subscription.recv() => {
                match event {
                    Some(event) => {
                        last_activity = Instant::now();
                        let kind = if event.is_active { "progress" } else { "finished" };
                        if !send_ws_event(&tx, &event).await {
                            break;
                        }
                        metrics::record_ws_message_sent(kind);
                    }
                    None => {
                        warn!(subscription = %subscription_id, "Dropped by progress hub, closing socket");
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if last_activity.elapsed() > WS_HEARTBEAT_INTERVAL / 2
                    && tx.send(Message::Ping(Vec::new())).await.is_err()
                {
                    warn!("Heartbeat failed, client disconnected");
                    break;
                }
            }
            client_msg = receiver.next() => {
                match client_msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => last_activity = Instant::now(),
                }
            }
        }
    }

    drop(subscription);
    drop(tx);
    let _ = send_task.await;
    info!(subscription = %subscription_id, "WebSocket progress subscriber disconnected");
}
