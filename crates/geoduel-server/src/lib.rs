//! GeoDuel production server.
//!
//! Production runtime wrapping [`geoduel_core`]'s Sans-IO logic with real
//! I/O: Quinn for QUIC transport, Tokio for the async runtime, system time
//! and cryptographic RNG for the environment.
//!
//! # Architecture
//!
//! - [`ServerDriver`]: action-based orchestrator (pure logic, no I/O)
//! - [`Server`]: production runtime that executes driver actions
//! - [`QuinnTransport`]: QUIC transport via the Quinn library
//! - [`SystemEnv`]: production environment (real time, crypto RNG)
//!
//! Each client holds one QUIC connection. The server opens a single
//! unidirectional outbound stream per connection (all server-to-client
//! frames flow through it, preserving order) and accepts client-initiated
//! bidirectional streams for inbound frames. A 1-second tick task drives
//! connection timeouts, heartbeats, and invitation expiry.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod archive;
mod driver;
mod error;
mod server_error;
mod system_env;
mod transport;

use std::{collections::HashMap, sync::Arc, time::Duration};

pub use archive::{ArchiveError, MatchArchive, MatchSummary, MemoryArchive};
use bytes::BytesMut;
pub use driver::{LogLevel, ServerAction, ServerConfig as DriverConfig, ServerDriver, ServerEvent};
pub use error::ServerError;
use geoduel_core::{env::Environment, quiz::FixedDeck};
use geoduel_proto::{Frame, FrameHeader};
pub use server_error::DriverError;
pub use system_env::SystemEnv;
use tokio::sync::RwLock;
pub use transport::{QuinnConnection, QuinnTransport};

/// Interval between driver ticks (timeouts, heartbeats, invite expiry).
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// The driver instantiation the production runtime uses.
type ProductionDriver = ServerDriver<SystemEnv, FixedDeck, MemoryArchive>;

/// Shared per-connection transport state.
///
/// Holds connection and stream maps for frame routing. All server-to-client
/// frames for one session go through its single outbound stream, ensuring
/// ordering.
struct SharedState {
    /// Session id -> QUIC connection (for closing)
    connections: RwLock<HashMap<u64, QuinnConnection>>,
    /// Session id -> persistent outbound stream
    outbound_streams: RwLock<HashMap<u64, tokio::sync::Mutex<quinn::SendStream>>>,
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:4433")
    pub bind_address: String,
    /// Path to TLS certificate (PEM format)
    pub cert_path: Option<String>,
    /// Path to TLS private key (PEM format)
    pub key_path: Option<String>,
    /// Driver configuration (timeouts, limits)
    pub driver: DriverConfig,
    /// Questions dealt per quiz match
    pub questions_per_match: u32,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4433".to_string(),
            cert_path: None,
            key_path: None,
            driver: DriverConfig::default(),
            questions_per_match: 5,
        }
    }
}

/// Production GeoDuel server.
///
/// Wraps `ServerDriver` with Quinn QUIC transport and the system
/// environment.
pub struct Server {
    /// The action-based server driver
    driver: ProductionDriver,
    /// QUIC endpoint
    transport: QuinnTransport,
    /// Environment
    env: SystemEnv,
}

impl Server {
    /// Create and bind a new server.
    pub fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let questions = FixedDeck::with_match_length(config.questions_per_match);
        let archive = MemoryArchive::new();
        let driver = ServerDriver::new(env.clone(), questions, archive, config.driver);

        let transport =
            QuinnTransport::bind(&config.bind_address, config.cert_path, config.key_path)?;

        Ok(Self { driver, transport, env })
    }

    /// Run the server, accepting connections and processing frames.
    ///
    /// Runs until the endpoint is closed or an unrecoverable error occurs.
    pub async fn run(self) -> Result<(), ServerError> {
        let Self { driver, transport, env } = self;

        tracing::info!("Server starting on {}", transport.local_addr()?);

        let driver = Arc::new(tokio::sync::Mutex::new(driver));
        let shared = Arc::new(SharedState {
            connections: RwLock::new(HashMap::new()),
            outbound_streams: RwLock::new(HashMap::new()),
        });

        // Periodic tick: connection timeouts, heartbeats, invite expiry.
        {
            let driver = Arc::clone(&driver);
            let shared = Arc::clone(&shared);
            let env = env.clone();

            tokio::spawn(async move {
                loop {
                    env.sleep(TICK_INTERVAL).await;

                    let mut driver = driver.lock().await;
                    match driver.process_event(ServerEvent::Tick) {
                        Ok(actions) => {
                            if let Err(e) = execute_actions(&mut driver, actions, &shared).await {
                                tracing::warn!("Tick action failed: {}", e);
                            }
                        },
                        Err(e) => tracing::warn!("Tick processing error: {}", e),
                    }
                }
            });
        }

        loop {
            match transport.accept().await {
                Ok(conn) => {
                    let driver = Arc::clone(&driver);
                    let shared = Arc::clone(&shared);
                    let env = env.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, driver, shared, env).await {
                            tracing::error!("Connection error: {}", e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }
}

/// Handle a single QUIC connection.
async fn handle_connection(
    conn: QuinnConnection,
    driver: Arc<tokio::sync::Mutex<ProductionDriver>>,
    shared: Arc<SharedState>,
    env: SystemEnv,
) -> Result<(), ServerError> {
    let session_id = env.random_u64();

    tracing::debug!("New connection {} from {}", session_id, conn.remote_addr());

    let outbound_stream = conn
        .open_uni()
        .await
        .map_err(|e| ServerError::Internal(format!("failed to open outbound stream: {e}")))?;

    {
        let mut connections = shared.connections.write().await;
        connections.insert(session_id, conn.clone());
    }

    {
        let mut streams = shared.outbound_streams.write().await;
        streams.insert(session_id, tokio::sync::Mutex::new(outbound_stream));
    }

    {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(ServerEvent::ConnectionAccepted { session_id })?;
        execute_actions(&mut driver, actions, &shared).await?;
    }

    loop {
        match conn.accept_bi().await {
            Ok((send, recv)) => {
                let driver = Arc::clone(&driver);
                let shared = Arc::clone(&shared);

                tokio::spawn(async move {
                    if let Err(e) = handle_stream(session_id, send, recv, driver, &shared).await {
                        tracing::debug!("Stream error: {}", e);
                    }
                });
            },
            Err(e) => {
                tracing::debug!("Connection closed: {}", e);
                break;
            },
        }
    }

    {
        let mut connections = shared.connections.write().await;
        connections.remove(&session_id);
    }

    {
        let mut streams = shared.outbound_streams.write().await;
        streams.remove(&session_id);
    }

    {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(ServerEvent::ConnectionClosed {
            session_id,
            reason: "connection closed".to_string(),
        })?;
        execute_actions(&mut driver, actions, &shared).await?;
    }

    Ok(())
}

/// Handle a single inbound stream: read frames and feed them to the driver.
async fn handle_stream(
    session_id: u64,
    send: quinn::SendStream,
    mut recv: quinn::RecvStream,
    driver: Arc<tokio::sync::Mutex<ProductionDriver>>,
    shared: &Arc<SharedState>,
) -> Result<(), ServerError> {
    drop(send); // responses go through the persistent outbound stream

    let mut buf = BytesMut::with_capacity(4096);

    loop {
        buf.clear();
        buf.resize(FrameHeader::SIZE, 0);

        match recv.read_exact(&mut buf[..FrameHeader::SIZE]).await {
            Ok(()) => {},
            Err(e) => {
                tracing::debug!("Read error: {}", e);
                break;
            },
        }

        let payload_size = match FrameHeader::from_bytes(&buf[..FrameHeader::SIZE]) {
            Ok(header) => header.payload_size() as usize,
            Err(e) => {
                tracing::warn!("Invalid frame header: {}", e);
                break;
            },
        };

        if payload_size > 0 {
            buf.resize(FrameHeader::SIZE + payload_size, 0);
            if let Err(e) = recv.read_exact(&mut buf[FrameHeader::SIZE..]).await {
                tracing::debug!("Payload read error: {}", e);
                break;
            }
        }

        let frame = match Frame::decode(&buf) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("Frame decode error: {}", e);
                break;
            },
        };

        let mut driver = driver.lock().await;
        match driver.process_event(ServerEvent::FrameReceived { session_id, frame }) {
            Ok(actions) => {
                execute_actions(&mut driver, actions, shared).await?;
            },
            Err(e) => {
                tracing::warn!("Frame processing error: {}", e);
            },
        }
    }

    Ok(())
}

/// Execute server actions against the transport.
async fn execute_actions(
    driver: &mut ProductionDriver,
    actions: Vec<ServerAction>,
    shared: &SharedState,
) -> Result<(), ServerError> {
    for action in actions {
        match action {
            ServerAction::SendToSession { session_id, frame } => {
                let mut buf = Vec::new();
                frame.encode(&mut buf)?;

                let streams = shared.outbound_streams.read().await;
                if let Some(stream_mutex) = streams.get(&session_id) {
                    let mut stream = stream_mutex.lock().await;
                    if let Err(e) = stream.write_all(&buf).await {
                        tracing::warn!("SendToSession write failed for {}: {}", session_id, e);
                    }
                } else {
                    tracing::debug!("SendToSession: session {} not found", session_id);
                }
            },

            ServerAction::Broadcast { frame } => {
                let sessions: Vec<u64> = driver.session_ids().collect();

                let mut buf = Vec::new();
                frame.encode(&mut buf)?;

                let streams = shared.outbound_streams.read().await;
                for session_id in sessions {
                    if let Some(stream_mutex) = streams.get(&session_id) {
                        let mut stream = stream_mutex.lock().await;
                        if let Err(e) = stream.write_all(&buf).await {
                            tracing::warn!("Broadcast write failed for {}: {}", session_id, e);
                        }
                    }
                }
            },

            ServerAction::CloseConnection { session_id, reason } => {
                tracing::info!("Closing connection {}: {}", session_id, reason);
                let mut connections = shared.connections.write().await;
                if let Some(conn) = connections.remove(&session_id) {
                    conn.close(0u32.into(), reason.as_bytes());
                }
            },

            ServerAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
        }
    }

    Ok(())
}
