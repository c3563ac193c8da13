//! Async driver for one room: a single task that feeds the controller from
//! the command channel and the relay, and carries out its effects.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    controller::{
        Command, ConnectionChange, Effect, InboundState, Notification, RoomController, RoomEvent,
    },
    env::{ReconnectSettings, Settings},
    errors::{ProtocolError, RoomError},
    game::GameState,
    identity::EventSigner,
    protocol::{ClientMessage, Event, Filter, RelayMessage, UnsignedEvent},
    room::RoomLink,
    session::{Inbound, ReconnectPolicy, RelaySession},
};

const SYNC_FAILED: &str = "Failed to sync game state";

#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub link: RoomLink,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectSettings,
}

impl RoomConfig {
    pub fn from_settings(link: RoomLink, settings: &Settings) -> Self {
        Self {
            link,
            connect_timeout: Duration::from_secs(settings.relay.connect_timeout_seconds),
            reconnect: settings.reconnect.clone(),
        }
    }
}

/// What the room task reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomUpdate {
    State(GameState),
    Notice(Notification),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Lost,
    Left,
}

/// Runs the room until the participant leaves, `shutdown` fires, the command
/// channel closes, or reconnecting is given up.
pub async fn run_room(
    config: RoomConfig,
    signer: Arc<dyn EventSigner>,
    mut commands: mpsc::Receiver<Command>,
    updates: mpsc::Sender<RoomUpdate>,
    shutdown: CancellationToken,
) -> Result<(), RoomError> {
    let room = config.link.room.clone();
    let mut task = RoomTask {
        controller: RoomController::new(signer.public_key().clone(), room.clone()),
        session: RelaySession::new(config.link.relay.clone(), config.connect_timeout),
        filter: Filter::game_room(&room),
        signer,
        updates,
    };
    let mut policy = ReconnectPolicy::from_settings(&config.reconnect);

    info!(
        "Joining room {} on {} as {}",
        room,
        config.link.relay,
        task.controller.me().short()
    );

    loop {
        if shutdown.is_cancelled() {
            task.dispatch(RoomEvent::Local(Command::Leave)).await;
            return Ok(());
        }

        let filter = task.filter.clone();
        match task.session.open(&filter).await {
            Ok(()) => {
                policy.reset();
                task.dispatch(RoomEvent::Connection(ConnectionChange::Connected))
                    .await;
                match task.pump(&mut commands, &shutdown).await {
                    Flow::Left => return Ok(()),
                    Flow::Lost | Flow::Continue => {
                        task.dispatch(RoomEvent::Connection(ConnectionChange::Lost))
                            .await;
                    }
                }
            }
            Err(e) => {
                warn!("Failed to connect to {}: {}", config.link.relay, e);
            }
        }

        let Some(delay) = policy.next_delay() else {
            let attempts = policy.attempts();
            error!(
                "Giving up on {} after {} reconnect attempts",
                config.link.relay, attempts
            );
            task.dispatch(RoomEvent::Connection(ConnectionChange::GaveUp { attempts }))
                .await;
            return Err(RoomError::ReconnectExhausted { attempts });
        };
        warn!(
            "Retrying connection to {} in {:?} (attempt {})",
            config.link.relay,
            delay,
            policy.attempts()
        );

        if task.wait(delay, &mut commands, &shutdown).await == Flow::Left {
            return Ok(());
        }
    }
}

struct RoomTask {
    controller: RoomController,
    session: RelaySession,
    filter: Filter,
    signer: Arc<dyn EventSigner>,
    updates: mpsc::Sender<RoomUpdate>,
}

impl RoomTask {
    /// Serves one live connection until it is lost or the participant leaves.
    async fn pump(
        &mut self,
        commands: &mut mpsc::Receiver<Command>,
        shutdown: &CancellationToken,
    ) -> Flow {
        loop {
            let flow = tokio::select! {
                _ = shutdown.cancelled() => {
                    self.dispatch(RoomEvent::Local(Command::Leave)).await
                }
                command = commands.recv() => {
                    // a dropped command channel means nobody can leave explicitly
                    let command = command.unwrap_or(Command::Leave);
                    self.dispatch(RoomEvent::Local(command)).await
                }
                inbound = self.session.recv() => match inbound {
                    Inbound::Message(message) => self.on_relay_message(message).await,
                    Inbound::Malformed(e) => {
                        warn!("Discarding malformed relay frame: {}", e);
                        Flow::Continue
                    }
                    Inbound::Lost(reason) => {
                        warn!("Lost relay connection: {}", reason.as_deref().unwrap_or("no reason given"));
                        Flow::Lost
                    }
                },
            };
            if flow != Flow::Continue {
                return flow;
            }
        }
    }

    /// Sleeps out a backoff delay while still honoring leave and shutdown.
    async fn wait(
        &mut self,
        delay: Duration,
        commands: &mut mpsc::Receiver<Command>,
        shutdown: &CancellationToken,
    ) -> Flow {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            let flow = tokio::select! {
                _ = &mut sleep => return Flow::Continue,
                _ = shutdown.cancelled() => {
                    self.dispatch(RoomEvent::Local(Command::Leave)).await
                }
                command = commands.recv() => {
                    let command = command.unwrap_or(Command::Leave);
                    self.dispatch(RoomEvent::Local(command)).await
                }
            };
            if flow == Flow::Left {
                return flow;
            }
        }
    }

    async fn on_relay_message(&mut self, message: RelayMessage) -> Flow {
        match message {
            RelayMessage::Event {
                subscription_id,
                event,
            } => {
                if !self.is_ours(&subscription_id) {
                    debug!("Ignoring event for subscription {}", subscription_id);
                    return Flow::Continue;
                }
                match self.accept_event(&event) {
                    Ok(state) => {
                        let inbound = InboundState {
                            author: event.pubkey.clone(),
                            state,
                        };
                        self.dispatch(RoomEvent::Inbound(inbound)).await
                    }
                    Err(e) => {
                        warn!("Discarding malformed game event {}: {}", event.id, e);
                        Flow::Continue
                    }
                }
            }
            RelayMessage::EndOfStoredEvents { subscription_id } if self.is_ours(&subscription_id) => {
                self.dispatch(RoomEvent::EndOfStoredEvents).await
            }
            RelayMessage::Ok {
                event_id,
                accepted,
                message,
            } => {
                if accepted {
                    debug!("Relay accepted {}", event_id);
                } else {
                    warn!("Relay rejected {}: {}", event_id, message);
                    self.emit(RoomUpdate::Notice(Notification::error(SYNC_FAILED)))
                        .await;
                }
                Flow::Continue
            }
            RelayMessage::Notice { message } => {
                info!("Relay notice: {}", message);
                Flow::Continue
            }
            RelayMessage::Closed {
                subscription_id,
                message,
            } if self.is_ours(&subscription_id) => {
                warn!("Relay closed our subscription: {}", message);
                self.session.mark_disconnected();
                Flow::Lost
            }
            other => {
                debug!("Ignoring relay frame {:?}", other);
                Flow::Continue
            }
        }
    }

    fn is_ours(&self, subscription_id: &str) -> bool {
        self.session.subscription_id() == Some(subscription_id)
    }

    fn accept_event(&self, event: &Event) -> Result<GameState, ProtocolError> {
        event.verify()?;
        let room = self.controller.room();
        if event.room_tag() != Some(room.as_str()) {
            return Err(ProtocolError::InvalidState(format!(
                "event is for room {:?}, not {}",
                event.room_tag(),
                room
            )));
        }
        event.decode_game_state()
    }

    async fn dispatch(&mut self, event: RoomEvent) -> Flow {
        let mut flow = Flow::Continue;
        for effect in self.controller.handle(event) {
            match effect {
                Effect::Publish(state) => self.publish(&state).await,
                Effect::StateChanged(state) => self.emit(RoomUpdate::State(state)).await,
                Effect::Notify(notification) => {
                    self.emit(RoomUpdate::Notice(notification)).await
                }
                Effect::Close => {
                    self.session.close().await;
                    flow = Flow::Left;
                }
            }
        }
        flow
    }

    async fn publish(&mut self, state: &GameState) {
        let unsigned = match UnsignedEvent::game_state(
            self.signer.public_key().clone(),
            self.controller.room(),
            state,
            Utc::now().timestamp(),
        ) {
            Ok(unsigned) => unsigned,
            Err(e) => {
                error!("Failed to encode game state v{}: {}", state.version, e);
                self.emit(RoomUpdate::Notice(Notification::error(SYNC_FAILED)))
                    .await;
                return;
            }
        };

        let event = match self.signer.sign(unsigned).await {
            Ok(event) => event,
            Err(e) => {
                error!("Failed to sign game state v{}: {}", state.version, e);
                self.emit(RoomUpdate::Notice(Notification::error(SYNC_FAILED)))
                    .await;
                return;
            }
        };

        debug!("Publishing v{} as {}", state.version, event.id);
        if let Err(e) = self.session.send(&ClientMessage::Event(event)).await {
            warn!("Failed to publish game state v{}: {}", state.version, e);
            self.emit(RoomUpdate::Notice(Notification::error(SYNC_FAILED)))
                .await;
        }
    }

    async fn emit(&self, update: RoomUpdate) {
        if self.updates.send(update).await.is_err() {
            debug!("Room update receiver dropped");
        }
    }
}
