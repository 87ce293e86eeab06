//! WebSocket push channel.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, Uri},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info};

use crate::auth::extract_credential;
use crate::http::constants::{CLOSE_UNAUTHORIZED, CLOSE_UNAUTHORIZED_REASON};
use crate::push::PushHub;
use crate::state::ApiState;

/// Upgrade the request, checking the credential once before any frame flows.
///
/// Rejected clients still get the upgrade so they can read the close code.
pub(crate) async fn push_channel(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    uri: Uri,
    ws: WebSocketUpgrade,
) -> Response {
    let authorised = match extract_credential(&headers, &uri) {
        Some(credential) => state.verifier.verify(&credential).await,
        None => false,
    };
    let hub = state.push.clone();
    ws.on_upgrade(move |socket| async move {
        if authorised {
            stream_frames(socket, hub).await;
        } else {
            reject(socket).await;
        }
    })
}

async fn reject(mut socket: WebSocket) {
    info!("push channel credential rejected");
    let frame = CloseFrame {
        code: CLOSE_UNAUTHORIZED,
        reason: CLOSE_UNAUTHORIZED_REASON.into(),
    };
    if let Err(err) = socket.send(Message::Close(Some(frame))).await {
        debug!(error = %err, "failed to send unauthorized close frame");
    }
}

async fn stream_frames(socket: WebSocket, hub: PushHub) {
    let (connection_id, mut frames) = hub.register();
    let (mut sink, mut incoming) = socket.split();

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    // Dropped by the hub after a failed offer.
                    break;
                };
                if let Err(err) = sink.send(Message::Text(frame)).await {
                    debug!(connection_id, error = %err, "push send failed");
                    break;
                }
            }
            message = incoming.next() => match message {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    hub.unregister(connection_id);
    if let Err(err) = sink.close().await {
        debug!(connection_id, error = %err, "push socket close failed");
    }
}
