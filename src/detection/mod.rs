//! Bot detection
//!
//! A fixed, ordered registry of User-Agent substrings and the classifier that
//! matches inbound requests against it. User-agent parsing for the `os` and
//! `browser` display fields lives here too, though it never affects whether a
//! request counts as a bot.

pub mod classifier;
pub mod registry;
pub mod user_agent;

pub use classifier::{Classification, Classifier};
pub use registry::{BotSignature, Glyph, Registry};
pub use user_agent::{ParsedAgent, UserAgentParser};
