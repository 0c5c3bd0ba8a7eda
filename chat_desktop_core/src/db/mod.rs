pub use chat::ChatDatabase;
pub use error::Error;

pub mod error;

pub mod chat;
