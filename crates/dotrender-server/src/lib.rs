//! Out-of-process render server.
//!
//! Exposes an in-process engine (typically a [`dotrender_core::PoolEngine`])
//! over a local TCP listener so other processes can submit render jobs.
//! The listener accepts framed [`protocol::Job`]s and proxies them to the
//! engine on the blocking thread pool; [`client::ServerEngine`] is the
//! matching in-process client.

pub mod client;
pub mod error;
pub mod protocol;

use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::net::TcpListener;

use dotrender_core::Engine;

pub use client::ServerEngine;
pub use error::{ServerError, ServerResult};

/// What to do when the configured port already has a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundPortPolicy {
    /// Treat a live listener on the port as the server being available.
    #[default]
    Reuse,
    /// Fail startup.
    Fail,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on (loopback only). Port 0 picks a free port.
    pub port: u16,
    /// Policy for an already-bound port.
    pub bound_port_policy: BoundPortPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 10234,
            bound_port_policy: BoundPortPolicy::Reuse,
        }
    }
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_bound_port_policy(mut self, policy: BoundPortPolicy) -> Self {
        self.bound_port_policy = policy;
        self
    }
}

/// Handle to a running (or reused) render server.
#[derive(Debug)]
pub struct ServerHandle {
    port: u16,
    /// Listener thread, present only when this handle owns the listener.
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Start a listener for `engine` on a dedicated thread.
    ///
    /// If the port is already bound, the existing listener is probed with
    /// a ping: under [`BoundPortPolicy::Reuse`] a live render server
    /// counts as success (the returned handle owns no thread), otherwise
    /// startup fails with [`ServerError::PortInUse`].
    pub fn spawn(config: ServerConfig, engine: Arc<dyn Engine>) -> ServerResult<Self> {
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let thread = std::thread::Builder::new()
            .name("dotrender-server".to_string())
            .spawn(move || run_listener(config.port, engine, ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(port)) => {
                tracing::info!(port, "render server listening");
                Ok(Self {
                    port,
                    thread: Some(thread),
                })
            }
            Ok(Err(bind_err)) => {
                let _ = thread.join();
                if bind_err.kind() == std::io::ErrorKind::AddrInUse
                    && client::ping(config.port)
                {
                    match config.bound_port_policy {
                        BoundPortPolicy::Reuse => {
                            tracing::info!(port = config.port, "reusing existing render server");
                            Ok(Self {
                                port: config.port,
                                thread: None,
                            })
                        }
                        BoundPortPolicy::Fail => Err(ServerError::PortInUse(config.port)),
                    }
                } else {
                    Err(ServerError::Io(bind_err))
                }
            }
            Err(_) => Err(ServerError::Protocol(
                "listener thread exited before reporting readiness".into(),
            )),
        }
    }

    /// The port the server is reachable on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Block until the listener exits on its own (after a `Stop` job
    /// from any client).
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    /// Stop the listener and wait for it to exit. Idempotent; a handle
    /// that reused an existing listener leaves it running.
    pub fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = stop_server(self.port);
            let _ = thread.join();
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Ask the server on `port` to shut down.
///
/// A port with no listener is a no-op, so this is safe to call
/// unconditionally before binding.
pub fn stop_server(port: u16) -> ServerResult<()> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let mut stream = match TcpStream::connect_timeout(&addr, Duration::from_secs(1)) {
        Ok(stream) => stream,
        // Nothing listening; stopping is a no-op.
        Err(_) => return Ok(()),
    };
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    stream.set_write_timeout(Some(Duration::from_secs(2)))?;

    protocol::write_frame(&mut stream, &protocol::Job::Stop)?;
    // Best effort: the listener may close before acknowledging.
    let _ = protocol::read_frame::<_, protocol::Reply>(&mut stream);
    Ok(())
}

/// Listener body running on the server thread.
fn run_listener(
    port: u16,
    engine: Arc<dyn Engine>,
    ready_tx: std::sync::mpsc::Sender<std::io::Result<u16>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    runtime.block_on(async move {
        let listener = match TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await {
            Ok(listener) => listener,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };
        let local_port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };
        let _ = ready_tx.send(Ok(local_port));

        let (stop_tx, mut stop_rx) = tokio::sync::mpsc::channel::<()>(1);
        loop {
            tokio::select! {
                _ = stop_rx.recv() => {
                    tracing::info!(port = local_port, "render server stopping");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!("accept failed: {e}");
                            continue;
                        }
                    };
                    tracing::debug!(%peer, "accepted render connection");
                    let engine = Arc::clone(&engine);
                    let stop_tx = stop_tx.clone();
                    tokio::task::spawn_blocking(move || {
                        if let Err(e) = handle_connection(stream, engine, stop_tx) {
                            tracing::warn!("connection handling failed: {e}");
                        }
                    });
                }
            }
        }
    });
}

/// Serve one job on a blocking thread, then close the connection.
fn handle_connection(
    stream: tokio::net::TcpStream,
    engine: Arc<dyn Engine>,
    stop_tx: tokio::sync::mpsc::Sender<()>,
) -> ServerResult<()> {
    let stream = stream.into_std()?;
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_secs(30)))?;
    stream.set_write_timeout(Some(Duration::from_secs(30)))?;
    let mut stream = stream;

    let job: protocol::Job = protocol::read_frame(&mut stream)?;
    match job {
        protocol::Job::Ping => {
            protocol::write_frame(&mut stream, &protocol::Reply::Pong)?;
        }
        protocol::Job::Stop => {
            protocol::write_frame(&mut stream, &protocol::Reply::Stopping)?;
            let _ = stop_tx.blocking_send(());
        }
        protocol::Job::Render { request } => {
            let reply = match engine.render(&request) {
                Ok(result) => protocol::Reply::Success {
                    format: result.format,
                    data: result.data,
                },
                Err(err) => {
                    tracing::debug!(error = %err, "render job failed");
                    protocol::Reply::Failure(protocol::WireError::from(&err))
                }
            };
            protocol::write_frame(&mut stream, &reply)?;
        }
    }
    Ok(())
}
