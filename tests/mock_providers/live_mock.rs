//! Live API WebSocket mock.
//!
//! Accepts connections, records the setup frame and every later client
//! frame, acknowledges setup, and answers each client frame with whatever
//! the configured responder returns.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

/// Produces the frames sent back for one client frame.
pub type Responder = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

/// Shared mock state.
pub struct LiveMockState {
    /// Query string of each accepted connection
    pub queries: Mutex<Vec<String>>,
    /// Setup frames, one per connection
    pub setups: Mutex<Vec<Value>>,
    /// Client frames after setup
    pub received: Mutex<Vec<Value>>,
    /// Frames sent right after `setupComplete`
    pub initial_frames: Mutex<Vec<Value>>,
    /// Close the connection after the initial frames
    pub close_after_initial: AtomicBool,
    /// Close instead of acknowledging setup
    pub reject_setup: AtomicBool,
    pub connection_count: AtomicU64,
    responder: Mutex<Option<Responder>>,
}

impl Default for LiveMockState {
    fn default() -> Self {
        Self {
            queries: Mutex::new(Vec::new()),
            setups: Mutex::new(Vec::new()),
            received: Mutex::new(Vec::new()),
            initial_frames: Mutex::new(Vec::new()),
            close_after_initial: AtomicBool::new(false),
            reject_setup: AtomicBool::new(false),
            connection_count: AtomicU64::new(0),
            responder: Mutex::new(None),
        }
    }
}

impl LiveMockState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer every user text with `"echo: <text>"` and a turn completion.
    pub fn echo() -> Arc<Self> {
        let state = Self::new();
        state.set_responder(Arc::new(|message: &Value| match super::client_text(message) {
            Some(text) => vec![
                super::model_text(&format!("echo: {}", text)),
                super::turn_complete(),
            ],
            None => Vec::new(),
        }));
        state
    }

    pub fn set_responder(&self, responder: Responder) {
        *self.responder.lock() = Some(responder);
    }

    pub fn push_initial(&self, frame: Value) {
        self.initial_frames.lock().push(frame);
    }

    pub fn received(&self) -> Vec<Value> {
        self.received.lock().clone()
    }

    pub fn setups(&self) -> Vec<Value> {
        self.setups.lock().clone()
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<LiveMockState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let query_state = state.clone();
    let ws_stream = accept_hdr_async(stream, move |request: &Request, response: Response| {
        query_state
            .queries
            .lock()
            .push(request.uri().query().unwrap_or_default().to_string());
        Ok(response)
    })
    .await?;
    let (mut write, mut read) = ws_stream.split();

    state.connection_count.fetch_add(1, Ordering::Relaxed);

    // First frame must be the setup
    let setup = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => break serde_json::from_str::<Value>(&text)?,
            Some(Ok(Message::Binary(data))) => break serde_json::from_slice::<Value>(&data)?,
            Some(Ok(_)) => continue,
            _ => return Ok(()),
        }
    };
    state.setups.lock().push(setup);

    if state.reject_setup.load(Ordering::Relaxed) {
        write.send(Message::Close(None)).await?;
        return Ok(());
    }

    write
        .send(Message::Text(json!({ "setupComplete": {} }).to_string().into()))
        .await?;

    let initial = state.initial_frames.lock().clone();
    for frame in initial {
        write.send(Message::Text(frame.to_string().into())).await?;
    }

    if state.close_after_initial.load(Ordering::Relaxed) {
        write.send(Message::Close(None)).await?;
        return Ok(());
    }

    while let Some(msg) = read.next().await {
        let message = match msg {
            Ok(Message::Text(text)) => serde_json::from_str::<Value>(&text)?,
            Ok(Message::Binary(data)) => serde_json::from_slice::<Value>(&data)?,
            Ok(Message::Ping(data)) => {
                write.send(Message::Pong(data)).await?;
                continue;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                eprintln!("Live mock WebSocket error: {}", e);
                break;
            }
            _ => continue,
        };

        state.received.lock().push(message.clone());

        let responder = state.responder.lock().clone();
        if let Some(responder) = responder {
            for frame in responder(&message) {
                write.send(Message::Text(frame.to_string().into())).await?;
            }
        }
    }

    Ok(())
}

/// Bind to an ephemeral port and serve in the background.
///
/// Returns the `ws://` URL of the server.
pub async fn spawn_live_mock(state: Arc<LiveMockState>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let state = state.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, state).await {
                    eprintln!("Live mock connection error: {}", e);
                }
            });
        }
    });

    format!("ws://{}/ws/live", addr)
}
