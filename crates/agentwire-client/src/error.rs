//! Error types for the client runtime.

use agentwire_codec::CodecError;
use agentwire_event::InputError;
use thiserror::Error;

/// Errors a producer can surface while a run is being driven.
///
/// All of these are fatal to the run: the runtime converts them into a
/// single synthetic `RUN_ERROR` and closes the stream.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Connection or read failure talking to the endpoint.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("endpoint returned HTTP {status}")]
    Http {
        /// The response status code.
        status: u16,
    },

    /// A wire frame could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The run input failed validation before anything was sent.
    #[error("invalid run input: {0}")]
    Input(#[from] InputError),

    /// Producer-specific failure, for in-process agents.
    #[error("agent failed: {0}")]
    Producer(String),
}
