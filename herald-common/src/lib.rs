pub mod logging;
pub mod message;

pub use message::Message;
pub use tracing;
