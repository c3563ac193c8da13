#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use nostr_tictactoe::{GameState, RoomUpdate};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub const WAIT: Duration = Duration::from_secs(5);

type Store = Arc<Mutex<Vec<Value>>>;

/// Minimal in-process relay: stores every event, replays matching events on
/// `REQ` followed by `EOSE`, answers `OK`, and fans new events out to every
/// live subscription whose `#d` filter matches.
pub struct FakeRelay {
    pub url: String,
    store: Store,
    events: broadcast::Sender<Value>,
    kick: broadcast::Sender<()>,
    frames: mpsc::UnboundedReceiver<Value>,
}

impl FakeRelay {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store: Store = Arc::new(Mutex::new(Vec::new()));
        let (events, _) = broadcast::channel(64);
        let (kick, _) = broadcast::channel(4);
        let (frames_tx, frames) = mpsc::unbounded_channel();

        let accept_store = store.clone();
        let accept_events = events.clone();
        let accept_kick = kick.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(
                    stream,
                    accept_store.clone(),
                    accept_events.clone(),
                    accept_kick.subscribe(),
                    frames_tx.clone(),
                ));
            }
        });

        Self {
            url: format!("ws://{}", addr),
            store,
            events,
            kick,
            frames,
        }
    }

    /// Closes every connection open right now. Stored events survive and
    /// later connections are served normally.
    pub fn drop_connections(&self) {
        let _ = self.kick.send(());
    }

    /// Next client frame of any type.
    pub async fn next_frame(&mut self) -> Value {
        match tokio::time::timeout(WAIT, self.frames.recv()).await {
            Ok(Some(frame)) => frame,
            Ok(None) => panic!("relay stopped"),
            Err(_) => panic!("relay received no frame in time"),
        }
    }

    /// Every frame that arrives before the relay has been quiet for `idle`.
    pub async fn drain_frames(&mut self, idle: Duration) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = tokio::time::timeout(idle, self.frames.recv()).await {
            frames.push(frame);
        }
        frames
    }

    /// Publishes `event` as if another client had sent it.
    pub fn inject(&self, event: Value) {
        self.store.lock().unwrap().push(event.clone());
        let _ = self.events.send(event);
    }

    /// Next client frame of the given type (`"EVENT"`, `"REQ"`, `"CLOSE"`).
    pub async fn expect_frame(&mut self, kind: &str) -> Value {
        let wait = tokio::time::timeout(WAIT, async {
            loop {
                let frame = self.frames.recv().await.expect("relay stopped");
                if frame[0] == kind {
                    return frame;
                }
            }
        })
        .await;
        match wait {
            Ok(frame) => frame,
            Err(_) => panic!("relay did not receive a {} frame in time", kind),
        }
    }
}

fn in_rooms(event: &Value, rooms: &[String]) -> bool {
    event["tags"]
        .as_array()
        .map(|tags| {
            tags.iter().any(|tag| {
                tag[0] == "d" && tag[1].as_str().map_or(false, |d| rooms.iter().any(|r| r == d))
            })
        })
        .unwrap_or(false)
}

async fn serve(
    stream: TcpStream,
    store: Store,
    events: broadcast::Sender<Value>,
    mut kick: broadcast::Receiver<()>,
    frames: mpsc::UnboundedSender<Value>,
) {
    let Ok(ws_stream) = accept_async(stream).await else {
        return;
    };
    let (mut sink, mut source) = ws_stream.split();
    let mut events_rx = events.subscribe();
    let mut subscriptions: Vec<(String, Vec<String>)> = Vec::new();

    loop {
        tokio::select! {
            _ = kick.recv() => {
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
            message = source.next() => {
                let Some(Ok(message)) = message else { break };
                let Message::Text(text) = message else { continue };
                let frame: Value = serde_json::from_str(&text).unwrap();

                match frame[0].as_str() {
                    Some("REQ") => {
                        let subscription_id = frame[1].as_str().unwrap().to_string();
                        let rooms: Vec<String> =
                            serde_json::from_value(frame[2]["#d"].clone()).unwrap();
                        let stored: Vec<Value> = store
                            .lock()
                            .unwrap()
                            .iter()
                            .filter(|event| in_rooms(event, &rooms))
                            .cloned()
                            .collect();
                        for event in stored {
                            let out = json!(["EVENT", subscription_id, event]).to_string();
                            if sink.send(Message::Text(out)).await.is_err() {
                                return;
                            }
                        }
                        let eose = json!(["EOSE", subscription_id]).to_string();
                        if sink.send(Message::Text(eose)).await.is_err() {
                            return;
                        }
                        subscriptions.push((subscription_id, rooms));
                    }
                    Some("EVENT") => {
                        let event = frame[1].clone();
                        store.lock().unwrap().push(event.clone());
                        let ok = json!(["OK", event["id"], true, ""]).to_string();
                        if sink.send(Message::Text(ok)).await.is_err() {
                            return;
                        }
                        let _ = events.send(event);
                    }
                    Some("CLOSE") => {
                        subscriptions.retain(|(id, _)| frame[1] != id.as_str());
                    }
                    _ => {}
                }
                // logged after handling so a test that saw the frame also sees its effects
                let _ = frames.send(frame);
            }
            event = events_rx.recv() => {
                let Ok(event) = event else { break };
                for (subscription_id, rooms) in &subscriptions {
                    if in_rooms(&event, rooms) {
                        let out = json!(["EVENT", subscription_id, event]).to_string();
                        if sink.send(Message::Text(out)).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Reads room updates until a state satisfies `accept`, returning it along
/// with every state seen on the way.
pub async fn wait_for_state<F>(
    updates: &mut mpsc::Receiver<RoomUpdate>,
    mut accept: F,
) -> (GameState, Vec<GameState>)
where
    F: FnMut(&GameState) -> bool,
{
    let mut seen = Vec::new();
    let wait = tokio::time::timeout(WAIT, async {
        while let Some(update) = updates.recv().await {
            if let RoomUpdate::State(state) = update {
                seen.push(state.clone());
                if accept(&state) {
                    return Some(state);
                }
            }
        }
        None
    })
    .await;
    match wait {
        Ok(Some(state)) => (state, seen),
        Ok(None) => panic!("room task ended before the expected state arrived"),
        Err(_) => panic!("expected state did not arrive in time; saw {:?}", seen),
    }
}

/// Reads room updates until a notice with `message` arrives.
pub async fn wait_for_notice(updates: &mut mpsc::Receiver<RoomUpdate>, message: &str) {
    let wait = tokio::time::timeout(WAIT, async {
        while let Some(update) = updates.recv().await {
            if let RoomUpdate::Notice(notice) = update {
                if notice.message == message {
                    return true;
                }
            }
        }
        false
    })
    .await;
    assert_eq!(wait, Ok(true), "notice `{}` never arrived", message);
}
