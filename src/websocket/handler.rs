use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::game::EngineError;
use crate::protocol::messages::{ClientCommand, ServerEvent};
use crate::protocol::ErrorCode;
use crate::server::GameServer;

/// Outbound frame queue per connection.
const OUTBOUND_QUEUE: usize = 128;

pub async fn websocket_handler(
    State(server): State<Arc<GameServer>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(server, socket))
}

async fn handle_socket(server: Arc<GameServer>, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_QUEUE);

    // Single writer task serializes every outbound event
    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    debug!(%err, "failed to serialize outbound event");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                Ok(command) => dispatch(&server, command, &out_tx).await,
                Err(err) => {
                    debug!(%err, "unparseable client command");
                    let _ = out_tx
                        .send(ServerEvent::Error {
                            code: ErrorCode::InvalidCommand,
                            message: ErrorCode::InvalidCommand.description().to_string(),
                        })
                        .await;
                }
            },
            Message::Close(_) => break,
            // Pings are answered by axum; binary frames are not part of
            // the protocol
            _ => {}
        }
    }

    // Dropping the sender ends the writer once its queue drains;
    // subscription forwarders notice on their next send.
    drop(out_tx);
    let _ = writer.await;
}

async fn dispatch(
    server: &Arc<GameServer>,
    command: ClientCommand,
    out: &mpsc::Sender<ServerEvent>,
) {
    let reply = match command {
        ClientCommand::StartSession { roster, config } => server
            .start_session(roster, config)
            .await
            .map(|(session_id, projection)| ServerEvent::SessionStarted {
                session_id,
                projection: Box::new(projection),
            }),
        ClientCommand::SubmitAction {
            session_id,
            user_id,
            action,
        } => server
            .submit_action(&session_id, &user_id, action)
            .await
            .map(|receipt| ServerEvent::ActionAccepted {
                action_id: receipt.action_id,
                kind: receipt.kind,
                phase_number: receipt.phase_number,
            }),
        ClientCommand::GetState {
            session_id,
            user_id,
        } => server
            .get_state(&session_id, &user_id)
            .await
            .map(|projection| ServerEvent::State(Box::new(projection))),
        ClientCommand::VoiceToken {
            session_id,
            user_id,
        } => server
            .voice_token(&session_id, &user_id)
            .await
            .map(|grant| ServerEvent::VoiceGrant {
                channel: grant.channel,
                token: grant.token,
                expires_at: grant.expires_at,
            }),
        ClientCommand::CancelSession {
            session_id,
            user_id,
        } => server
            .cancel_session(&session_id, &user_id)
            .await
            .map(|()| ServerEvent::Cancelled { session_id }),
        ClientCommand::Subscribe {
            session_id,
            user_id,
            after_sequence,
        } => {
            match server.subscribe(&session_id, &user_id, after_sequence).await {
                Ok(mut events) => {
                    // Forward the hub stream into this connection until
                    // either side goes away
                    let out = out.clone();
                    tokio::spawn(async move {
                        while let Some(event) = events.recv().await {
                            if out.send(event).await.is_err() {
                                break;
                            }
                        }
                    });
                    return;
                }
                Err(err) => Err(err),
            }
        }
    };

    match reply {
        Ok(event) => {
            let _ = out.send(event).await;
        }
        Err(err) => {
            let _ = out
                .send(ServerEvent::Error {
                    code: err.code(),
                    message: client_message(&err),
                })
                .await;
        }
    }
}

/// Client-facing message: precise for client mistakes, generic for
/// anything that might carry internal detail.
fn client_message(err: &EngineError) -> String {
    match err {
        EngineError::Internal(_) | EngineError::Store(_) => err.code().description().to_string(),
        other => other.to_string(),
    }
}
