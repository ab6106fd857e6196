pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod legacy;
pub mod live;
pub mod protocol;
pub mod render;
pub mod session;
pub mod socketio;

pub use config::{Config, PollPolicy};
pub use error::{Result, WebchatError};
pub use protocol::{ClientEvent, Message, ServerEvent, User, UserMode};
pub use render::{View, ViewUpdate};
pub use session::Session;
pub use socketio::{Emit, EventChannel, Inbound};
