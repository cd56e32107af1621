pub mod error;
pub mod types;

pub mod client;
pub mod engine;
pub mod executor;
pub mod listener;
pub mod registration;

pub use client::{Client, ClientOptions};
pub use error::{ClientError, ErrorCode, ListenError, ListenResult, Result};
pub use registration::ListenerRegistration;
