//! PostgreSQL wire protocol messages and codecs.

pub mod backend;
pub mod codec;
pub mod frontend;
pub mod types;
