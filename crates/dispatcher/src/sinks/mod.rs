//! Sink implementations
//!
//! Contains StdoutSink and NewRelicInfraSink plus the pieces the HTTP sink
//! is built from (retrying client, payload envelope, describer).

pub mod describe;
mod new_relic_infra;
pub mod payload;
pub mod retry;
mod stdout;

pub use self::describe::{DefaultDescriber, ObjectDescriber};
pub use self::new_relic_infra::{
    format_entity_id, NewRelicInfraSettings, NewRelicInfraSink, DEFAULT_AGENT_HTTP_TIMEOUT,
};
pub use self::retry::{RetryPolicy, RetryingClient};
pub use self::stdout::StdoutSink;
