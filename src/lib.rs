pub mod bridge;
pub mod config;
pub mod core;

// Re-export commonly used items for convenience
pub use bridge::{BridgeState, SessionBridge};
pub use config::BridgeConfig;
pub use core::*;
