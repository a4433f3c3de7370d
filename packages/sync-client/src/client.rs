//! Room connection management
//!
//! One `RoomClient` owns one logical connection to one room. A supervisor
//! task runs the connect/pump/reconnect loop; commands flow in through an
//! unbounded channel and server events flow out through another, so the
//! caller never touches the socket directly.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::frame::coding::CloseCode,
    tungstenite::Message,
};
use tracing::{debug, info, warn};
use url::Url;

use unison_protocol::{ClientCommand, ServerEvent};

use crate::backoff::ReconnectPolicy;

/// Interval between application-level pings
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Errors surfaced by the room client
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Connection lifecycle and protocol events delivered to the caller
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Connection (re-)established
    Connected,

    /// A server event arrived
    Event(ServerEvent),

    /// Connection lost; a retry is scheduled after `delay`
    Reconnecting { attempt: u32, delay: Duration },

    /// Retry budget exhausted or leave requested; terminal
    Disconnected,
}

/// Handle to a room connection
///
/// Dropping the handle (or calling [`leave`](Self::leave)) cancels any
/// pending reconnect and closes the connection with a normal closure.
pub struct RoomClient {
    commands: mpsc::UnboundedSender<ClientCommand>,
    leave: watch::Sender<bool>,
}

impl RoomClient {
    /// Connect to a room, returning the handle and the event stream
    ///
    /// The connection is established in the background; the first
    /// [`ConnectionEvent::Connected`] confirms it.
    pub fn connect(
        base_url: &str,
        room_id: &str,
        client_id: &str,
        policy: ReconnectPolicy,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ConnectionEvent>), ClientError> {
        let url = build_ws_url(base_url, room_id, client_id)?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (leave_tx, leave_rx) = watch::channel(false);

        tokio::spawn(supervisor(url, policy, command_rx, event_tx, leave_rx));

        Ok((Self { commands: command_tx, leave: leave_tx }, event_rx))
    }

    /// Enqueue a command for delivery
    ///
    /// Commands sent while reconnecting are buffered and flushed once the
    /// connection is back.
    pub fn send(&self, command: ClientCommand) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::ConnectionClosed)
    }

    /// Leave the room: close with a normal closure and cancel any pending
    /// reconnect
    pub fn leave(&self) {
        let _ = self.leave.send(true);
    }
}

impl Drop for RoomClient {
    fn drop(&mut self) {
        let _ = self.leave.send(true);
    }
}

/// Build the connection URL with room and client identity
fn build_ws_url(base_url: &str, room_id: &str, client_id: &str) -> Result<Url, ClientError> {
    let mut url = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;

    match url.scheme() {
        "ws" | "wss" => {}
        "http" => {
            // Infallible for http/https per the Url contract
            let _ = url.set_scheme("ws");
        }
        "https" => {
            let _ = url.set_scheme("wss");
        }
        other => {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme: {}",
                other
            )));
        }
    }

    url.set_path("/ws");
    url.query_pairs_mut()
        .clear()
        .append_pair("room_id", room_id)
        .append_pair("client_id", client_id);

    Ok(url)
}

/// Why a connection session ended
enum SessionEnd {
    /// Caller asked to leave; do not reconnect
    Left,
    /// Transport dropped; reconnect per policy
    Lost,
}

/// Connect/pump/reconnect loop
async fn supervisor(
    url: Url,
    policy: ReconnectPolicy,
    mut commands: mpsc::UnboundedReceiver<ClientCommand>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    mut leave: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;

    loop {
        if *leave.borrow() {
            break;
        }

        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                info!(url = %url, "Connected to room");
                attempt = 0;
                if events.send(ConnectionEvent::Connected).is_err() {
                    break;
                }

                match run_session(stream, &mut commands, &events, &mut leave).await {
                    SessionEnd::Left => break,
                    SessionEnd::Lost => {}
                }
            }
            Err(e) => {
                warn!(error = %e, attempt = attempt, "Connection attempt failed");
            }
        }

        // Schedule the next attempt, or give up
        let Some(delay) = policy.delay_for(attempt) else {
            warn!(attempts = attempt, "Reconnect budget exhausted, giving up");
            break;
        };
        attempt += 1;

        if events
            .send(ConnectionEvent::Reconnecting { attempt, delay })
            .is_err()
        {
            break;
        }

        // A leave during the retry delay cancels the timer
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = leave.changed() => {
                if *leave.borrow() {
                    break;
                }
            }
        }
    }

    let _ = events.send(ConnectionEvent::Disconnected);
    debug!("Room client supervisor stopped");
}

/// Pump one established connection until it ends
async fn run_session<S>(
    stream: tokio_tungstenite::WebSocketStream<S>,
    commands: &mut mpsc::UnboundedReceiver<ClientCommand>,
    events: &mpsc::UnboundedSender<ConnectionEvent>,
    leave: &mut watch::Receiver<bool>,
) -> SessionEnd
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut sink, mut source) = stream.split();
    let mut ping_timer = tokio::time::interval(PING_INTERVAL);
    ping_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it
    ping_timer.tick().await;

    loop {
        tokio::select! {
            _ = leave.changed() => {
                if *leave.borrow() {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Left;
                }
            }

            Some(command) = commands.recv() => {
                let json = match serde_json::to_string(&command) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize command");
                        continue;
                    }
                };
                if sink.send(Message::Text(json)).await.is_err() {
                    return SessionEnd::Lost;
                }
            }

            _ = ping_timer.tick() => {
                let json = match serde_json::to_string(&ClientCommand::Ping) {
                    Ok(json) => json,
                    Err(_) => continue,
                };
                if sink.send(Message::Text(json)).await.is_err() {
                    return SessionEnd::Lost;
                }
            }

            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if events.send(ConnectionEvent::Event(event)).is_err() {
                                return SessionEnd::Left;
                            }
                        }
                        Err(e) => debug!(error = %e, "Ignoring unparseable server event"),
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    // A normal closure means the server ended the session
                    // deliberately (room left or deleted): do not reconnect
                    let normal = frame
                        .as_ref()
                        .map(|f| f.code == CloseCode::Normal)
                        .unwrap_or(false);
                    return if normal { SessionEnd::Left } else { SessionEnd::Lost };
                }
                None => return SessionEnd::Lost,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "WebSocket read error");
                    return SessionEnd::Lost;
                }
            },
        }
    }
}
