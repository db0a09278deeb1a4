//! Client-side engine proxying renders to a running server.

use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;

use dotrender_core::{Engine, EngineResult, Error, RenderRequest, Result};

use crate::protocol::{Job, Reply, read_frame, write_frame};

/// Engine that forwards render requests to a render server over TCP.
///
/// Implements the same synchronous contract as every other engine; the
/// network round trip is invisible to callers and to the selector.
pub struct ServerEngine {
    port: u16,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl ServerEngine {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            connect_timeout: Duration::from_secs(2),
            io_timeout: Duration::from_secs(60),
        }
    }

    /// Override the per-job read/write deadline.
    #[must_use]
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    fn connect(&self) -> Result<TcpStream> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.port));
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(|e| {
            Error::Execution {
                message: format!("cannot reach render server on port {}: {e}", self.port),
                context: None,
            }
        })?;
        stream.set_read_timeout(Some(self.io_timeout))?;
        stream.set_write_timeout(Some(self.io_timeout))?;
        Ok(stream)
    }
}

impl Engine for ServerEngine {
    fn render(&self, request: &RenderRequest) -> Result<EngineResult> {
        let mut stream = self.connect()?;

        // The output destination is a local path; keep it on this side
        // rather than having the server write into its own filesystem.
        let mut forwarded = request.clone();
        forwarded.output = None;

        write_frame(&mut stream, &Job::Render { request: forwarded })
            .map_err(|e| Error::execution(format!("failed to send render job: {e}")))?;
        let reply: Reply = read_frame(&mut stream)
            .map_err(|e| Error::execution(format!("failed to read render reply: {e}")))?;

        match reply {
            Reply::Success { format, data } => {
                let result = EngineResult::new(format, data);
                if let Some(ref path) = request.output {
                    std::fs::write(path, &result.data)?;
                }
                Ok(result)
            }
            Reply::Failure(wire_error) => Err(wire_error.into()),
            other => Err(Error::execution(format!(
                "unexpected reply to render job: {other:?}"
            ))),
        }
    }

    fn name(&self) -> &str {
        "server"
    }
}

/// Whether a render server answers on `port`.
pub fn ping(port: u16) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let Ok(mut stream) = TcpStream::connect_timeout(&addr, Duration::from_secs(1)) else {
        return false;
    };
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));

    if write_frame(&mut stream, &Job::Ping).is_err() {
        return false;
    }
    matches!(read_frame::<_, Reply>(&mut stream), Ok(Reply::Pong))
}
