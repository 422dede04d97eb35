//! Gemini Live session client.
//!
//! Implements [`BaseSession`] over the Live API's bidirectional WebSocket.
//!
//! # API Reference
//!
//! - Endpoint: `wss://generativelanguage.googleapis.com/ws/...BidiGenerateContent?key=<key>`
//! - Protocol: WebSocket with JSON frames (text or binary)
//! - Input audio: PCM 16-bit, 16kHz, mono, base64 encoded
//!
//! The first frame is always `setup`; the session counts as connected once the
//! service answers with `setupComplete`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;
use zeroize::Zeroize;

use super::config::{GEMINI_LIVE_URL, GeminiVoice, model_resource};
use super::messages::{ClientMessage, ServerMessage, SetupMessage};
use crate::core::events::{ControlEvent, RawEvent};
use crate::core::session::base::{
    BaseSession, ConnectionCallback, ConnectionState, EventCallback, ReconnectionConfig,
    SessionConfig, SessionError, SessionErrorCallback, SessionInput, SessionResult,
};

/// Channel capacity for WebSocket message sending.
const WS_CHANNEL_CAPACITY: usize = 256;

/// How long to wait for `setupComplete` after sending setup.
const SETUP_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `disconnect` waits for the connection task to close the socket.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Outbound frame, optionally echoed into the event stream once written.
#[derive(Debug)]
struct Outbound {
    message: ClientMessage,
    echo: Option<RawEvent>,
}

/// Why the message loop ended.
enum LoopExit {
    Shutdown,
    Lost(Option<String>),
}

// =============================================================================
// Gemini Live Client
// =============================================================================

/// Gemini Live session client.
///
/// All state shared with the connection task sits behind `Arc`s; the
/// `connected` flag allows lock-free readiness checks.
pub struct GeminiLiveSession {
    /// Configuration
    config: SessionConfig,
    /// Model resource name
    model: String,
    /// Parsed voice
    voice: GeminiVoice,
    /// Connection state
    state: Arc<RwLock<ConnectionState>>,
    /// Connected flag shared with the connection task
    connected: Arc<AtomicBool>,

    /// WebSocket sender channel
    ws_sender: Arc<Mutex<Option<mpsc::Sender<Outbound>>>>,

    /// Callbacks
    event_callback: Arc<Mutex<Option<EventCallback>>>,
    connection_callback: Arc<Mutex<Option<ConnectionCallback>>>,
    error_callback: Arc<Mutex<Option<SessionErrorCallback>>>,

    /// Connection task handle
    connection_handle: Option<JoinHandle<()>>,
    /// Stops the connection task
    shutdown: Option<CancellationToken>,

    /// Reconnection configuration
    reconnection_config: ReconnectionConfig,
    /// Set by `disconnect` to suppress reconnection
    intentional_disconnect: Arc<AtomicBool>,
}

impl std::fmt::Debug for GeminiLiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiLiveSession")
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("connected", &self.is_ready())
            .finish()
    }
}

impl Drop for GeminiLiveSession {
    fn drop(&mut self) {
        if let Some(token) = self.shutdown.take() {
            token.cancel();
        }
        self.config.api_key.zeroize();
    }
}

impl GeminiLiveSession {
    /// Get the model resource name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the configured voice.
    pub fn voice(&self) -> GeminiVoice {
        self.voice
    }

    /// Endpoint without credentials, safe to log.
    pub fn endpoint(&self) -> &str {
        self.config.endpoint.as_deref().unwrap_or(GEMINI_LIVE_URL)
    }

    /// Build the WebSocket URL carrying the API key.
    fn build_ws_url(&self) -> SessionResult<Url> {
        let mut url = Url::parse(self.endpoint())
            .map_err(|e| SessionError::InvalidConfiguration(format!("endpoint: {}", e)))?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(SessionError::InvalidConfiguration(format!(
                "endpoint scheme must be ws or wss, got '{}'",
                url.scheme()
            )));
        }
        url.query_pairs_mut().append_pair("key", &self.config.api_key);
        Ok(url)
    }

    /// Build the setup frame.
    fn build_setup(&self) -> ClientMessage {
        ClientMessage::Setup(SetupMessage::new(
            self.model.clone(),
            self.config.response_modality,
            Some(self.voice.as_str()),
            self.config.system_instruction.as_deref(),
            &self.config.functions,
        ))
    }

    /// Queue a frame for the connection task.
    async fn send_outbound(&self, outbound: Outbound) -> SessionResult<()> {
        let sender = self.ws_sender.lock().await.clone();
        match sender {
            Some(sender) => sender
                .send(outbound)
                .await
                .map_err(|e| SessionError::WebSocketError(e.to_string())),
            None => Err(SessionError::NotConnected),
        }
    }
}

/// Register a callback without blocking if the slot is briefly locked.
fn set_callback<T: Send + 'static>(slot: &Arc<Mutex<Option<T>>>, callback: T) {
    if let Ok(mut guard) = slot.try_lock() {
        *guard = Some(callback);
    } else {
        let slot = slot.clone();
        tokio::spawn(async move {
            *slot.lock().await = Some(callback);
        });
    }
}

async fn emit_event(cb: &Arc<Mutex<Option<EventCallback>>>, event: RawEvent) {
    let callback = cb.lock().await.clone();
    if let Some(callback) = callback {
        callback(event).await;
    }
}

async fn emit_connection(cb: &Arc<Mutex<Option<ConnectionCallback>>>, connected: bool) {
    let callback = cb.lock().await.clone();
    if let Some(callback) = callback {
        callback(connected).await;
    }
}

async fn emit_error(cb: &Arc<Mutex<Option<SessionErrorCallback>>>, error: SessionError) {
    let callback = cb.lock().await.clone();
    if let Some(callback) = callback {
        callback(error).await;
    }
}

/// Open the socket, send setup and wait for the acknowledgement.
async fn open_session(url: &Url, setup_json: &str) -> SessionResult<(WsSink, WsSource)> {
    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| match e {
            tungstenite::Error::Http(response)
                if matches!(response.status().as_u16(), 401 | 403) =>
            {
                SessionError::AuthenticationFailed(format!("HTTP {}", response.status()))
            }
            other => SessionError::ConnectionFailed(other.to_string()),
        })?;

    let (mut sink, mut stream) = ws_stream.split();
    sink.send(Message::Text(setup_json.to_string().into()))
        .await
        .map_err(|e| SessionError::WebSocketError(e.to_string()))?;

    tokio::time::timeout(SETUP_TIMEOUT, await_setup_complete(&mut stream))
        .await
        .map_err(|_| {
            SessionError::ConnectionFailed("timed out waiting for setup acknowledgement".to_string())
        })??;

    Ok((sink, stream))
}

async fn await_setup_complete(stream: &mut WsSource) -> SessionResult<()> {
    while let Some(msg) = stream.next().await {
        let data = match msg.map_err(|e| SessionError::WebSocketError(e.to_string()))? {
            Message::Text(text) => text.as_bytes().to_vec(),
            Message::Binary(data) => data.to_vec(),
            Message::Close(frame) => {
                let reason = frame
                    .map(|f| format!("{} ({})", f.reason.as_str(), u16::from(f.code)))
                    .unwrap_or_else(|| "no reason".to_string());
                return Err(SessionError::ConnectionFailed(format!(
                    "closed during setup: {}",
                    reason
                )));
            }
            _ => continue,
        };

        match ServerMessage::parse(&data) {
            Ok(message) if message.is_setup_complete() => return Ok(()),
            Ok(_) => tracing::debug!("Ignoring frame received before setup completed"),
            Err(e) => tracing::warn!("Failed to parse setup response: {}", e),
        }
    }
    Err(SessionError::ConnectionFailed(
        "connection closed during setup".to_string(),
    ))
}

#[async_trait]
impl BaseSession for GeminiLiveSession {
    fn new(config: SessionConfig) -> SessionResult<Self> {
        if config.api_key.is_empty() {
            return Err(SessionError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }

        let model = model_resource(&config.model);
        let voice = config
            .voice
            .as_deref()
            .map(GeminiVoice::from_str_or_default)
            .unwrap_or_default();
        let reconnection_config = config.reconnection.clone().unwrap_or_default();

        Ok(Self {
            config,
            model,
            voice,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            connected: Arc::new(AtomicBool::new(false)),
            ws_sender: Arc::new(Mutex::new(None)),
            event_callback: Arc::new(Mutex::new(None)),
            connection_callback: Arc::new(Mutex::new(None)),
            error_callback: Arc::new(Mutex::new(None)),
            connection_handle: None,
            shutdown: None,
            reconnection_config,
            intentional_disconnect: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn connect(&mut self) -> SessionResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        // A previous task may still be winding down.
        if let Some(handle) = self.connection_handle.take() {
            handle.abort();
        }

        self.intentional_disconnect.store(false, Ordering::SeqCst);
        *self.state.write().await = ConnectionState::Connecting;

        let url = self.build_ws_url()?;
        let setup_json = serde_json::to_string(&self.build_setup())
            .map_err(|e| SessionError::SerializationError(e.to_string()))?;

        let (ws_sink, ws_stream) = match open_session(&url, &setup_json).await {
            Ok(split) => split,
            Err(e) => {
                tracing::error!(endpoint = %self.endpoint(), "Failed to open Gemini Live session: {}", e);
                *self.state.write().await = ConnectionState::Failed;
                return Err(e);
            }
        };

        tracing::info!(model = %self.model, "Connected to Gemini Live API");

        let (tx, mut rx) = mpsc::channel::<Outbound>(WS_CHANNEL_CAPACITY);
        *self.ws_sender.lock().await = Some(tx);

        let shutdown = CancellationToken::new();
        self.shutdown = Some(shutdown.clone());

        let event_cb = self.event_callback.clone();
        let connection_cb = self.connection_callback.clone();
        let error_cb = self.error_callback.clone();
        let state = self.state.clone();
        let connected = self.connected.clone();
        let ws_sender = self.ws_sender.clone();
        let reconnection_config = self.reconnection_config.clone();
        let intentional_disconnect = self.intentional_disconnect.clone();

        self.connected.store(true, Ordering::SeqCst);
        *self.state.write().await = ConnectionState::Connected;
        emit_connection(&connection_cb, true).await;
        emit_event(&event_cb, RawEvent::Control(ControlEvent::SetupComplete)).await;

        let handle = tokio::spawn(async move {
            let mut sink = ws_sink;
            let mut stream = ws_stream;
            let mut reconnect_attempt: u32 = 0;

            'outer: loop {
                let exit = loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            if let Err(e) = sink.send(Message::Close(None)).await {
                                tracing::debug!("Failed to send close frame: {}", e);
                            }
                            break LoopExit::Shutdown;
                        }

                        Some(outbound) = rx.recv() => {
                            let json = match serde_json::to_string(&outbound.message) {
                                Ok(j) => j,
                                Err(e) => {
                                    tracing::error!("Failed to serialize client message: {}", e);
                                    continue;
                                }
                            };

                            if let Err(e) = sink.send(Message::Text(json.into())).await {
                                tracing::error!("Failed to send WebSocket message: {}", e);
                                break LoopExit::Lost(Some(e.to_string()));
                            }

                            if let Some(echo) = outbound.echo {
                                emit_event(&event_cb, echo).await;
                            }
                        }

                        msg = stream.next() => {
                            let data = match msg {
                                Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
                                Some(Ok(Message::Binary(data))) => data.to_vec(),
                                Some(Ok(Message::Ping(data))) => {
                                    if let Err(e) = sink.send(Message::Pong(data)).await {
                                        tracing::error!("Failed to send pong: {}", e);
                                    }
                                    continue;
                                }
                                Some(Ok(Message::Close(frame))) => {
                                    let reason = frame.map(|f| f.reason.as_str().to_string());
                                    tracing::info!(reason = ?reason, "WebSocket closed by server");
                                    break LoopExit::Lost(reason);
                                }
                                Some(Ok(_)) => continue,
                                Some(Err(e)) => {
                                    tracing::error!("WebSocket error: {}", e);
                                    break LoopExit::Lost(Some(e.to_string()));
                                }
                                None => break LoopExit::Lost(None),
                            };

                            reconnect_attempt = 0;
                            match ServerMessage::parse(&data) {
                                Ok(message) => {
                                    for event in message.into_raw_events() {
                                        emit_event(&event_cb, event).await;
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!("Failed to parse server message: {}", e);
                                    emit_error(&error_cb, SessionError::SerializationError(e.to_string())).await;
                                }
                            }
                        }
                    }
                };

                connected.store(false, Ordering::SeqCst);

                let reason = match exit {
                    LoopExit::Shutdown => {
                        tracing::info!("Intentional disconnect, not attempting reconnection");
                        *state.write().await = ConnectionState::Disconnected;
                        break 'outer;
                    }
                    LoopExit::Lost(reason) => reason,
                };

                emit_connection(&connection_cb, false).await;
                if let Some(reason) = reason.filter(|r| !r.is_empty()) {
                    emit_error(&error_cb, SessionError::ProviderError(reason)).await;
                }

                if intentional_disconnect.load(Ordering::SeqCst)
                    || !reconnection_config.should_retry(reconnect_attempt)
                {
                    if reconnection_config.enabled {
                        tracing::warn!(
                            "Max reconnection attempts ({}) reached",
                            reconnection_config.max_attempts
                        );
                    }
                    *state.write().await = ConnectionState::Disconnected;
                    break 'outer;
                }

                // Reconnect until an attempt succeeds or attempts run out.
                loop {
                    reconnect_attempt += 1;
                    *state.write().await = ConnectionState::Reconnecting;

                    let delay_ms = reconnection_config.calculate_delay(reconnect_attempt);
                    tracing::info!(
                        "Attempting reconnection {}/{} in {}ms",
                        reconnect_attempt,
                        reconnection_config.max_attempts,
                        delay_ms
                    );

                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            tracing::info!("Disconnect requested during reconnection delay");
                            *state.write().await = ConnectionState::Disconnected;
                            break 'outer;
                        }
                        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                    }

                    match open_session(&url, &setup_json).await {
                        Ok((new_sink, new_stream)) => {
                            tracing::info!("Reconnected to Gemini Live API");
                            sink = new_sink;
                            stream = new_stream;
                            connected.store(true, Ordering::SeqCst);
                            *state.write().await = ConnectionState::Connected;
                            emit_connection(&connection_cb, true).await;
                            emit_event(&event_cb, RawEvent::Control(ControlEvent::SetupComplete)).await;
                            continue 'outer;
                        }
                        Err(e) => {
                            tracing::error!("Reconnection attempt {} failed: {}", reconnect_attempt, e);
                            if !reconnection_config.should_retry(reconnect_attempt) {
                                emit_error(&error_cb, SessionError::ConnectionFailed(format!(
                                    "Connection lost after {} reconnection attempts",
                                    reconnect_attempt
                                ))).await;
                                *state.write().await = ConnectionState::Failed;
                                break 'outer;
                            }
                        }
                    }
                }
            }

            *ws_sender.lock().await = None;
            tracing::info!("Gemini Live connection task ended");
        });

        self.connection_handle = Some(handle);
        Ok(())
    }

    async fn disconnect(&mut self) -> SessionResult<()> {
        self.intentional_disconnect.store(true, Ordering::SeqCst);
        *self.ws_sender.lock().await = None;

        if let Some(token) = self.shutdown.take() {
            token.cancel();
        }

        let was_connected = self.connected.swap(false, Ordering::SeqCst);

        if let Some(mut handle) = self.connection_handle.take() {
            match tokio::time::timeout(DISCONNECT_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Connection task ended abnormally: {}", e),
                Err(_) => {
                    tracing::warn!("Connection task did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        *self.state.write().await = ConnectionState::Disconnected;
        if was_connected {
            emit_connection(&self.connection_callback, false).await;
            tracing::info!("Disconnected from Gemini Live API");
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn get_connection_state(&self) -> ConnectionState {
        match self.state.try_read() {
            Ok(state) => *state,
            Err(_) if self.is_ready() => ConnectionState::Connected,
            Err(_) => ConnectionState::Disconnected,
        }
    }

    async fn send(&mut self, input: SessionInput) -> SessionResult<()> {
        if !self.is_ready() {
            return Err(SessionError::NotConnected);
        }

        let outbound = match input {
            SessionInput::Audio { data, mime_type } => {
                if data.is_empty() {
                    return Err(SessionError::InvalidInput("audio chunk is empty".to_string()));
                }
                Outbound {
                    message: ClientMessage::audio(&data, &mime_type),
                    echo: None,
                }
            }
            SessionInput::Text {
                text,
                turn_complete,
            } => {
                if text.trim().is_empty() {
                    return Err(SessionError::InvalidInput("text is empty".to_string()));
                }
                Outbound {
                    message: ClientMessage::user_text(&text, turn_complete),
                    echo: Some(RawEvent::user_text(text, turn_complete)),
                }
            }
        };

        self.send_outbound(outbound).await
    }

    async fn send_tool_response(
        &mut self,
        call_id: &str,
        name: &str,
        response: serde_json::Value,
    ) -> SessionResult<()> {
        if !self.is_ready() {
            return Err(SessionError::NotConnected);
        }

        self.send_outbound(Outbound {
            message: ClientMessage::tool_response(call_id, name, response),
            echo: None,
        })
        .await
    }

    fn on_event(&mut self, callback: EventCallback) -> SessionResult<()> {
        set_callback(&self.event_callback, callback);
        Ok(())
    }

    fn on_connection_change(&mut self, callback: ConnectionCallback) -> SessionResult<()> {
        set_callback(&self.connection_callback, callback);
        Ok(())
    }

    fn on_error(&mut self, callback: SessionErrorCallback) -> SessionResult<()> {
        set_callback(&self.error_callback, callback);
        Ok(())
    }

    fn get_provider_info(&self) -> serde_json::Value {
        serde_json::json!({
            "provider": "gemini",
            "api_type": "WebSocket Live",
            "endpoint": self.endpoint(),
            "model": self.model,
            "voice": self.voice.as_str(),
            "response_modality": self.config.response_modality.as_str(),
            "functions": self.config.functions.iter().map(|f| f.name.clone()).collect::<Vec<_>>(),
            "reconnection": self.reconnection_config.enabled,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
