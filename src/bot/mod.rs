pub mod commands;
pub mod console;
pub mod handlers;
pub mod session;
#[cfg(feature = "telegram")]
pub mod telegram;

pub use commands::{Command, ParseError};
pub use handlers::{BotService, MessageContext, Participant};
pub use session::{RevealAnswer, SessionState, Sessions};
