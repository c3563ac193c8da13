pub mod reconnect;

use std::time::Duration;

use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    errors::{ProtocolError, SessionError},
    protocol::{ClientMessage, Filter, RelayMessage},
};

pub use reconnect::ReconnectPolicy;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsSink = SplitSink<WsStream, Message>;
pub type WsSource = SplitStream<WsStream>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,         // 초기 상태. 아직 연결을 시도하지 않음.
    Connecting,   // 웹소켓 핸드셰이크 진행 중.
    Subscribed,   // REQ 전송 완료. 방 이벤트 수신 중.
    Disconnected, // 연결 유실. 재연결 대상.
    Closed,       // 방을 떠나 정상 종료됨.
}

/// One item read from the relay.
#[derive(Debug)]
pub enum Inbound {
    Message(RelayMessage),
    /// Frame could not be decoded; the connection is still usable.
    Malformed(ProtocolError),
    /// Socket closed or failed. Carries the close reason when the relay gave one.
    Lost(Option<String>),
}

/// A single websocket connection to a relay carrying one room subscription.
pub struct RelaySession {
    url: Url,
    connect_timeout: Duration,
    state: SessionState,
    subscription_id: Option<String>,
    sink: Option<WsSink>,
    source: Option<WsSource>,
}

impl RelaySession {
    pub fn new(url: Url, connect_timeout: Duration) -> Self {
        Self {
            url,
            connect_timeout,
            state: SessionState::Idle,
            subscription_id: None,
            sink: None,
            source: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription_id.as_deref()
    }

    /// Connects and subscribes with `filter` under a fresh subscription id.
    pub async fn open(&mut self, filter: &Filter) -> Result<(), SessionError> {
        self.state = SessionState::Connecting;
        info!("Connecting to relay {}", self.url);

        let connected =
            tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str())).await;
        let (ws_stream, _) = match connected {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                self.mark_disconnected();
                return Err(e.into());
            }
            Err(_) => {
                self.mark_disconnected();
                return Err(SessionError::ConnectTimeout(self.connect_timeout));
            }
        };

        let (mut sink, source) = ws_stream.split();
        let subscription_id = Uuid::new_v4().simple().to_string();
        let req = ClientMessage::Req {
            subscription_id: subscription_id.clone(),
            filter: filter.clone(),
        };
        if let Err(e) = sink.send(Message::Text(req.to_json())).await {
            self.mark_disconnected();
            return Err(e.into());
        }

        info!("Subscribed to {} as {}", self.url, subscription_id);
        self.subscription_id = Some(subscription_id);
        self.sink = Some(sink);
        self.source = Some(source);
        self.state = SessionState::Subscribed;
        Ok(())
    }

    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), SessionError> {
        if self.state != SessionState::Subscribed {
            return Err(SessionError::NotConnected);
        }
        let Some(sink) = self.sink.as_mut() else {
            return Err(SessionError::NotConnected);
        };
        if let Err(e) = sink.send(Message::Text(message.to_json())).await {
            warn!("Relay send failed: {}", e);
            self.mark_disconnected();
            return Err(e.into());
        }
        Ok(())
    }

    /// Next relay frame. Cancel safe, so it can sit in a `select!`.
    pub async fn recv(&mut self) -> Inbound {
        loop {
            let next = match self.source.as_mut() {
                Some(source) => source.next().await,
                None => return Inbound::Lost(None),
            };

            match next {
                Some(Ok(Message::Text(text))) => {
                    return match RelayMessage::from_json(&text) {
                        Ok(message) => Inbound::Message(message),
                        Err(e) => Inbound::Malformed(e),
                    };
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|f| f.reason.to_string());
                    info!("Relay closed the connection: {:?}", reason);
                    self.mark_disconnected();
                    return Inbound::Lost(reason);
                }
                Some(Ok(other)) => {
                    debug!("Ignoring non-text frame ({} bytes)", other.len());
                }
                Some(Err(e)) => {
                    warn!("Relay connection error: {}", e);
                    self.mark_disconnected();
                    return Inbound::Lost(Some(e.to_string()));
                }
                None => {
                    self.mark_disconnected();
                    return Inbound::Lost(None);
                }
            }
        }
    }

    /// Drops the connection without telling the relay.
    pub fn mark_disconnected(&mut self) {
        self.sink = None;
        self.source = None;
        self.subscription_id = None;
        self.state = SessionState::Disconnected;
    }

    /// Sends `CLOSE` for the subscription (best effort) and shuts the socket.
    pub async fn close(&mut self) {
        if let (Some(subscription_id), Some(sink)) = (self.subscription_id.take(), self.sink.as_mut())
        {
            let close = ClientMessage::Close { subscription_id };
            if let Err(e) = sink.send(Message::Text(close.to_json())).await {
                debug!("CLOSE not delivered: {}", e);
            }
            if let Err(e) = sink.close().await {
                debug!("Socket close failed: {}", e);
            }
        }
        self.sink = None;
        self.source = None;
        self.state = SessionState::Closed;
        info!("Left relay {}", self.url);
    }
}
