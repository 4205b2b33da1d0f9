use std::{future, time::Duration};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::{debug, info, warn};

use crate::{
    dto::{
        protocol::{self, FffCommand, FffMessage},
        ws::{FffInboundMessage, FffOutboundMessage},
    },
    services::mobile_service::{FffAnswerSheet, TapOutcome},
    state::{
        SharedState,
        channel::{ChannelHandle, Topic},
    },
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors ending or disturbing a participant connection.
#[derive(Debug, Error)]
enum ConnError {
    /// Writer channel closed - connection should be terminated immediately.
    #[error("connection closed")]
    ConnectionClosed,
    /// The submission could not be written to the channel.
    #[error("submission not published: {0}")]
    Publish(#[from] protocol::ProtocolError),
}

/// Handle the full lifecycle of a participant's FFF WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let inbound = match FffInboundMessage::from_json_str(&initial_message) {
        Ok(message) => message,
        Err(err) => {
            warn!(error = %err, "failed to parse or validate participant message");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let FffInboundMessage::Identification { name } = inbound else {
        warn!("first message was not identification");
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    };
    let name = name.trim().to_string();

    let channel = ChannelHandle::new(state.channel());
    let mut commands = channel.subscribe();
    let mut sheet = FffAnswerSheet::new(name.clone(), state.config().fff_seconds);
    info!(participant = %name, "fff participant connected");

    if send_message_to_websocket(&outbound_tx, &FffOutboundMessage::Registered { name: name.clone() })
        .is_err()
    {
        finalize(writer_task, outbound_tx).await;
        return;
    }

    // Late joiners pick up a round that is already running.
    let greeting = latest_command(&channel)
        .filter(|command| matches!(command, FffCommand::StartRound { .. }))
        .and_then(|command| sheet.on_command(&command, Instant::now()))
        .unwrap_or(FffOutboundMessage::Waiting);
    if send_message_to_websocket(&outbound_tx, &greeting).is_err() {
        finalize(writer_task, outbound_tx).await;
        return;
    }

    loop {
        let deadline = sheet.deadline();
        tokio::select! {
            frame = receiver.next() => {
                let Some(frame) = frame else { break };
                match frame {
                    Ok(Message::Text(text)) => {
                        debug!(participant = %name, payload = %text, "received participant message");
                        if let Err(err) = handle_text(&text, &mut sheet, &channel, &outbound_tx) {
                            warn!(participant = %name, error = %err, "error while handling participant message");
                            if matches!(err, ConnError::ConnectionClosed) {
                                break;
                            }
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        let _ = outbound_tx.send(Message::Pong(payload));
                    }
                    Ok(Message::Close(frame)) => {
                        info!(participant = %name, "participant closed");
                        let _ = outbound_tx.send(Message::Close(frame));
                        break;
                    }
                    Ok(Message::Binary(_)) => {}
                    Ok(Message::Pong(_)) => {}
                    Err(err) => {
                        warn!(participant = %name, error = %err, "websocket error");
                        break;
                    }
                }
            }
            message = commands.recv() => {
                let Some(message) = message else { break };
                if message.topic != Topic::FffCommand {
                    continue;
                }
                let command = match protocol::decode::<FffMessage>(&message) {
                    Ok(decoded) => decoded.command,
                    Err(err) => {
                        warn!(error = %err, "ignoring malformed fff command");
                        continue;
                    }
                };
                if let Some(reply) = sheet.on_command(&command, Instant::now())
                    && send_message_to_websocket(&outbound_tx, &reply).is_err()
                {
                    break;
                }
            }
            _ = async {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => future::pending().await,
                }
            } => {
                if sheet.time_out() {
                    info!(participant = %name, "fff answer timed out");
                    if send_message_to_websocket(&outbound_tx, &FffOutboundMessage::TimeUp).is_err() {
                        break;
                    }
                }
            }
        }
    }

    info!(participant = %name, "fff participant disconnected");
    finalize(writer_task, outbound_tx).await;
}

/// Apply one text frame received after identification.
fn handle_text(
    text: &str,
    sheet: &mut FffAnswerSheet,
    channel: &ChannelHandle,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) -> Result<(), ConnError> {
    let message = match FffInboundMessage::from_json_str(text) {
        Ok(message) => message,
        Err(err) => {
            return send_message_to_websocket(
                outbound_tx,
                &FffOutboundMessage::Rejected {
                    reason: err.to_string(),
                },
            );
        }
    };

    match message {
        FffInboundMessage::Tap { option } => match sheet.tap(option, Instant::now()) {
            Ok(TapOutcome::Recorded { option, position }) => send_message_to_websocket(
                outbound_tx,
                &FffOutboundMessage::Recorded { option, position },
            ),
            Ok(TapOutcome::Ignored) => Ok(()),
            Ok(TapOutcome::Complete(submission)) => {
                channel.publish(Topic::FffSubmission, &submission)?;
                info!(
                    participant = %submission.name,
                    time = submission.time,
                    "fff ordering submitted"
                );
                send_message_to_websocket(
                    outbound_tx,
                    &FffOutboundMessage::Submitted {
                        answer_order: submission.answer_order,
                        time: submission.time,
                    },
                )
            }
            Err(err) => send_message_to_websocket(
                outbound_tx,
                &FffOutboundMessage::Rejected {
                    reason: err.to_string(),
                },
            ),
        },
        FffInboundMessage::Identification { .. } => {
            warn!(participant = %sheet.name(), "ignoring duplicate identification message");
            Ok(())
        }
        FffInboundMessage::Unknown => {
            debug!(participant = %sheet.name(), "ignoring unknown participant message");
            Ok(())
        }
    }
}

/// Latest round command stored on the channel, if it decodes.
fn latest_command(channel: &ChannelHandle) -> Option<FffCommand> {
    let raw = channel.latest(Topic::FffCommand)?;
    serde_json::from_str::<FffMessage>(&raw)
        .map(|message| message.command)
        .ok()
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Serialization failures are logged and swallowed; only a closed writer is reported.
fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), ConnError>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| ConnError::ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
