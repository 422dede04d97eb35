pub mod dispatch;
pub mod events;
pub mod relay;
pub mod session;
pub mod transcript;

// Re-export commonly used types for convenience
pub use events::{
    ControlEvent, EventLog, FunctionCallRequest, LoggedEvent, ModelPart, RawEvent, TextPart,
};

pub use session::{
    BaseSession, BoxedSession, ConnectionState, FunctionDeclaration, GeminiLiveSession,
    ReconnectionConfig, ResponseModality, SessionConfig, SessionError, SessionInput,
    SessionProvider, SessionResult, create_session, get_supported_session_providers,
};

pub use dispatch::{
    DispatchNotice, DispatchOutcome, DispatchRecord, DispatchStore, Dispatcher,
    SEND_MESSAGE_FUNCTION, idempotency_key,
};

pub use relay::{HttpRelayClient, RelayClient, RelayError, RelayResponse};

pub use transcript::{
    ConversationEntry, EntryKind, MarkdownExporter, Role, TranscriptExporter, compose, reduce,
};
