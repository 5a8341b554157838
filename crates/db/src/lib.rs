pub mod connection;
pub mod migrations;
pub mod outbox;

pub use connection::{connect, connect_with_settings, DbPool};
pub use outbox::{InMemoryOutbox, Outbox, OutboxError, SqlOutbox};
