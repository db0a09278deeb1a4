//! Wire protocol for the render server.
//!
//! Frames are a 4-byte little-endian length prefix followed by a JSON
//! body. One job per connection: the client sends a [`Job`], the server
//! answers with a [`Reply`] and closes.

use std::io::{Read, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use dotrender_core::{Error, Format, RenderRequest};

use crate::error::{ServerError, ServerResult};

/// Reject frames larger than this to bound memory per connection.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Job sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    /// Render a request through the server's engine.
    Render { request: RenderRequest },

    /// Liveness probe.
    Ping,

    /// Shut the listener down.
    Stop,
}

/// Reply sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    /// Render completed.
    Success { format: Format, data: Vec<u8> },

    /// Render failed with a typed engine error.
    Failure(WireError),

    /// Response to [`Job::Ping`].
    Pong,

    /// Acknowledgement of [`Job::Stop`].
    Stopping,
}

/// Engine error in wire form, mirroring the core taxonomy so failures
/// survive the process boundary with their type intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireError {
    Configuration { message: String },
    MissingDependency { artifact: String, message: String },
    Execution { message: String, context: Option<String> },
    Timeout { millis: u64 },
    PoolExhausted,
    Io { message: String },
}

impl From<&Error> for WireError {
    fn from(err: &Error) -> Self {
        match err {
            Error::Configuration(message) => WireError::Configuration {
                message: message.clone(),
            },
            Error::MissingDependency { artifact, message } => WireError::MissingDependency {
                artifact: artifact.clone(),
                message: message.clone(),
            },
            Error::Execution { message, context } => WireError::Execution {
                message: message.clone(),
                context: context.clone(),
            },
            Error::Timeout(duration) => WireError::Timeout {
                millis: duration.as_millis() as u64,
            },
            Error::PoolExhausted => WireError::PoolExhausted,
            Error::Io(e) => WireError::Io {
                message: e.to_string(),
            },
        }
    }
}

impl From<WireError> for Error {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Configuration { message } => Error::Configuration(message),
            WireError::MissingDependency { artifact, message } => {
                Error::MissingDependency { artifact, message }
            }
            WireError::Execution { message, context } => Error::Execution { message, context },
            WireError::Timeout { millis } => Error::Timeout(Duration::from_millis(millis)),
            WireError::PoolExhausted => Error::PoolExhausted,
            WireError::Io { message } => Error::Io(std::io::Error::other(message)),
        }
    }
}

/// Write one length-prefixed JSON frame.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> ServerResult<()> {
    let body = serde_json::to_vec(message)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(ServerError::Protocol(format!(
            "outgoing frame too large: {} bytes",
            body.len()
        )));
    }
    writer.write_all(&(body.len() as u32).to_le_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed JSON frame.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> ServerResult<T> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ServerError::Protocol(format!(
            "incoming frame too large: {len} bytes"
        )));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(serde_json::from_slice(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn job_frame_roundtrip() {
        let job = Job::Render {
            request: RenderRequest::new("graph g {a--b}", Format::SvgStandalone),
        };

        let mut buf = Vec::new();
        write_frame(&mut buf, &job).unwrap();

        let decoded: Job = read_frame(&mut Cursor::new(buf)).unwrap();
        match decoded {
            Job::Render { request } => {
                assert_eq!(request.source, "graph g {a--b}");
                assert_eq!(request.format, Format::SvgStandalone);
            }
            other => panic!("wrong job type: {other:?}"),
        }
    }

    #[test]
    fn wire_error_preserves_type_and_text() {
        let original = Error::Execution {
            message: "exit status 1".into(),
            context: Some("dot -Tsvg".into()),
        };
        let restored: Error = WireError::from(&original).into();
        match restored {
            Error::Execution { message, context } => {
                assert_eq!(message, "exit status 1");
                assert_eq!(context.as_deref(), Some("dot -Tsvg"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let timeout: Error = WireError::from(&Error::Timeout(Duration::from_secs(3))).into();
        assert!(matches!(timeout, Error::Timeout(d) if d == Duration::from_secs(3)));
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(u32::MAX).to_le_bytes());
        buf.extend_from_slice(b"{}");
        let result: ServerResult<Job> = read_frame(&mut Cursor::new(buf));
        assert!(matches!(result, Err(ServerError::Protocol(_))));
    }
}
