use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::time::interval;

use events::{event_channel, EventReceiver, RunEvent};
use node_core::SessionId;
use orchestrator::{CancelOutcome, Orchestrator, NO_ACTIVE_COMMAND};

use crate::messages::{ClientMessage, ServerMessage};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct WsState {
    pub orchestrator: Orchestrator,
}

impl WsState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-socket view of the session it drives.
struct Connection {
    state: Arc<WsState>,
    session: Option<SessionId>,
    events: Option<EventReceiver>,
}

impl Connection {
    fn new(state: Arc<WsState>) -> Self {
        Self {
            state,
            session: None,
            events: None,
        }
    }

    fn handle(&mut self, message: ClientMessage) -> Option<ServerMessage> {
        match message {
            ClientMessage::Ping => Some(ServerMessage::Pong),
            ClientMessage::StartUpgrade { session_id } => Some(self.start_upgrade(session_id)),
            ClientMessage::Cancel { session_id } => self.cancel(session_id),
        }
    }

    fn start_upgrade(&mut self, requested: Option<SessionId>) -> ServerMessage {
        if self.events.is_some() {
            return ServerMessage::Error {
                message: "A session is already running on this connection".to_string(),
            };
        }

        let session_id = requested.unwrap_or_default();
        let (tx, rx) = event_channel(session_id);
        match self.state.orchestrator.start_upgrade(tx) {
            Ok(_) => {
                tracing::info!(session_id = %session_id, "Upgrade session started");
                self.session = Some(session_id);
                self.events = Some(rx);
                ServerMessage::SessionStarted { session_id }
            }
            Err(e) => ServerMessage::Error {
                message: e.to_string(),
            },
        }
    }

    /// A successful cancel answers through the session's own `cancelled` event.
    ///
    /// Anything else is reported to the requester only, never on a session's
    /// stream: that stream's single terminal event belongs to the run.
    fn cancel(&mut self, requested: Option<SessionId>) -> Option<ServerMessage> {
        let outcome = match requested.or(self.session) {
            Some(session_id) => self.state.orchestrator.cancel(&session_id),
            None => CancelOutcome::NoActiveCommand,
        };

        match outcome {
            CancelOutcome::Cancelled => None,
            CancelOutcome::NoActiveCommand => Some(ServerMessage::Error {
                message: NO_ACTIVE_COMMAND.to_string(),
            }),
        }
    }

    /// Next event of the driven session; pending while there is none.
    async fn next_event(&mut self) -> RunEvent {
        loop {
            match self.events.as_mut() {
                Some(rx) => match rx.recv().await {
                    Some(event) => return event,
                    None => self.finish(),
                },
                None => std::future::pending::<()>().await,
            }
        }
    }

    fn finish(&mut self) {
        self.session = None;
        self.events = None;
    }

    fn disconnect(&mut self) {
        if let Some(session_id) = self.session.take() {
            tracing::debug!(session_id = %session_id, "Client went away, releasing session");
            self.state.orchestrator.disconnect(&session_id);
        }
        self.events = None;
    }
}

async fn send(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    sender.send(Message::Text(message.to_json().into())).await
}

async fn handle_socket(socket: WebSocket, state: Arc<WsState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut connection = Connection::new(state);

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.reset();

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if send(&mut sender, &ServerMessage::Pong).await.is_err() {
                    break;
                }
            }

            event = connection.next_event() => {
                let terminal = event.is_terminal();
                if send(&mut sender, &ServerMessage::Event { event }).await.is_err() {
                    break;
                }
                if terminal {
                    connection.finish();
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }

            msg = tokio::time::timeout(CLIENT_TIMEOUT + HEARTBEAT_INTERVAL, receiver.next()) => {
                match msg {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(message) => connection.handle(message),
                            Err(e) => Some(ServerMessage::Error {
                                message: format!("Invalid message: {}", e),
                            }),
                        };
                        if let Some(reply) = reply {
                            if send(&mut sender, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Some(Ok(Message::Close(_)))) => {
                        break;
                    }
                    Ok(Some(Ok(Message::Ping(data)))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Some(Ok(_))) => {}
                    Ok(Some(Err(_))) => {
                        break;
                    }
                    Ok(None) => {
                        break;
                    }
                    Err(_) => {
                        tracing::debug!("WebSocket client idle");
                    }
                }
            }
        }
    }

    connection.disconnect();
    tracing::debug!("WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::EventKind;
    use node_core::{StepDescriptor, UpgradeManifest};
    use orchestrator::{Elevation, HostProcessRunner};

    fn state(agent_update: Vec<StepDescriptor>) -> Arc<WsState> {
        let manifest = UpgradeManifest {
            agent_update,
            service_install: Vec::new(),
            companion_update: Vec::new(),
            restart: Vec::new(),
        };
        let orchestrator = Orchestrator::new(
            Arc::new(HostProcessRunner::new()),
            Elevation::none(),
            manifest,
        );
        Arc::new(WsState::new(orchestrator))
    }

    async fn wait_until_running(state: &WsState) {
        for _ in 0..500 {
            if state.orchestrator.active_sessions().iter().any(|s| s.running) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session never started its process");
    }

    async fn collect_until_terminal(connection: &mut Connection) -> Vec<RunEvent> {
        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), connection.next_event())
                .await
                .expect("terminal event");
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                return events;
            }
        }
    }

    #[test]
    fn test_heartbeat_interval() {
        assert_eq!(HEARTBEAT_INTERVAL, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_ping() {
        let mut connection = Connection::new(state(Vec::new()));
        assert!(matches!(
            connection.handle(ClientMessage::Ping),
            Some(ServerMessage::Pong)
        ));
    }

    #[tokio::test]
    async fn test_start_upgrade_streams_until_complete() {
        let mut connection = Connection::new(state(vec![
            StepDescriptor::new("Say hello", "echo").arg("hello")
        ]));

        let reply = connection.handle(ClientMessage::StartUpgrade { session_id: None });
        let session_id = match reply {
            Some(ServerMessage::SessionStarted { session_id }) => session_id,
            other => panic!("unexpected reply: {other:?}"),
        };

        let events = collect_until_terminal(&mut connection).await;
        assert!(events.iter().all(|e| e.session_id == session_id));
        assert!(events.iter().any(|e| e.data == "hello"));
        assert_eq!(events.last().unwrap().kind, EventKind::Complete);
    }

    #[tokio::test]
    async fn test_second_start_is_refused() {
        let state = state(vec![StepDescriptor::new("Wait", "sleep").arg("30")]);
        let mut connection = Connection::new(Arc::clone(&state));

        connection.handle(ClientMessage::StartUpgrade { session_id: None });
        let reply = connection.handle(ClientMessage::StartUpgrade { session_id: None });
        assert!(matches!(reply, Some(ServerMessage::Error { .. })));

        wait_until_running(&state).await;
        connection.disconnect();
    }

    #[tokio::test]
    async fn test_cancel_running_session() {
        let state = state(vec![StepDescriptor::new("Wait", "sleep").arg("30")]);
        let mut connection = Connection::new(Arc::clone(&state));

        connection.handle(ClientMessage::StartUpgrade { session_id: None });
        wait_until_running(&state).await;

        assert!(connection
            .handle(ClientMessage::Cancel { session_id: None })
            .is_none());

        let events = collect_until_terminal(&mut connection).await;
        assert_eq!(events.last().unwrap().kind, EventKind::Cancelled);
        assert!(state.orchestrator.active_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_without_session() {
        let mut connection = Connection::new(state(Vec::new()));

        match connection.handle(ClientMessage::Cancel { session_id: None }) {
            Some(ServerMessage::Error { message }) => assert_eq!(message, NO_ACTIVE_COMMAND),
            other => panic!("unexpected reply: {other:?}"),
        }

        match connection.handle(ClientMessage::Cancel {
            session_id: Some(SessionId::new()),
        }) {
            Some(ServerMessage::Error { message }) => assert_eq!(message, NO_ACTIVE_COMMAND),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_between_steps_keeps_session_stream_clean() {
        let state = state(Vec::new());
        let (tx, mut rx) = event_channel(SessionId::new());
        let id = tx.session_id();
        let session = state.orchestrator.registry().open(tx).unwrap();
        let mut connection = Connection::new(Arc::clone(&state));

        match connection.handle(ClientMessage::Cancel {
            session_id: Some(id),
        }) {
            Some(ServerMessage::Error { message }) => assert_eq!(message, NO_ACTIVE_COMMAND),
            other => panic!("unexpected reply: {other:?}"),
        }

        assert!(rx.drain().is_empty());
        assert!(!session.is_cancelled());
        assert!(state.orchestrator.registry().contains(&id));

        session.events().complete("done");
        let events = rx.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Complete);
    }

    #[tokio::test]
    async fn test_disconnect_cancels_session() {
        let state = state(vec![StepDescriptor::new("Wait", "sleep").arg("30")]);
        let mut connection = Connection::new(Arc::clone(&state));

        connection.handle(ClientMessage::StartUpgrade { session_id: None });
        wait_until_running(&state).await;
        connection.disconnect();

        assert!(state.orchestrator.active_sessions().is_empty());
    }
}
