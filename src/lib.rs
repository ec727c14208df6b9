pub mod apply;
pub mod client;
pub mod config;
pub mod controls;
pub mod dispatch;
pub mod dom;
pub mod engine;
pub mod error;
pub mod event;
pub mod host;
pub mod indicator;
pub mod markers;
pub mod repeat;
pub mod session;
pub mod transport;
pub mod wire;

// Re-export commonly used types for tests
pub use client::{spawn, ClientHandle};
pub use config::ClientConfig;
pub use controls::WidgetRegistry;
pub use engine::{Engine, OutgoingRequest};
pub use error::{ClientError, ErrorKind, ErrorReport};
pub use event::{Event, EventInit, EventKind};
pub use host::{Host, LoggingHost, RecordingHost, UiEffect};
pub use transport::{HttpTransport, RetryPolicy, Transport, TransportError};
