//! Normalized email model and provider-payload parsing.

pub mod body;
pub mod message;

pub use body::extract_text;
pub use message::{Headers, NormalizedEmail, RawMessage, normalize_address, reply_subject};
