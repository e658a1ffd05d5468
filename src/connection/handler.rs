//! Connection Handler
//!
//! Each client connection runs its own loop: read bytes, decode every complete
//! frame in the buffer, execute it, write the encoded reply.
//!
//! ## Lifecycle
//!
//! ```text
//! 1. Client connects
//!        │
//!        ▼
//! 2. Read into buffer ◄──────────────┐
//!        │                           │
//!        ▼                           │
//! 3. Decode frame ── incomplete ─────┘
//!        │
//!        ▼
//! 4. Execute, write reply ───────────┘ (next frame or next read)
//!        │
//!        ▼ command error / parse error / EOF
//! 5. Handler task ends
//! ```
//!
//! ## Buffer Management
//!
//! TCP is a stream, so a read may end mid-frame or carry several frames. Bytes
//! accumulate in a `BytesMut` buffer; decoded frames are split off the front.
//! The buffer is capped, and a client that exceeds the cap is disconnected.

use crate::commands::{CommandError, CommandExecutor};
use crate::protocol::{ParseError, RespParser, RespValue};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Limits applied to each connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    /// Largest number of unparsed bytes a client may have buffered
    pub max_buffer_size: usize,
    /// Deepest array nesting the decoder accepts
    pub max_nesting_depth: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_buffer_size: 64 * 1024,
            max_nesting_depth: crate::protocol::parser::DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A frame broke a decoder limit
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// The client sent a command that could not be executed
    #[error("Command error: {0}")]
    CommandError(#[from] CommandError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// End of stream with a partial frame buffered
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Drives a single client connection over any byte stream.
pub struct ConnectionHandler<S> {
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Unparsed incoming bytes
    buffer: BytesMut,

    executor: CommandExecutor,

    parser: RespParser,

    limits: ConnectionLimits,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        addr: SocketAddr,
        executor: CommandExecutor,
        stats: Arc<ConnectionStats>,
        limits: ConnectionLimits,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE.min(limits.max_buffer_size)),
            executor,
            parser: RespParser::with_max_depth(limits.max_nesting_depth),
            limits,
            stats,
        }
    }

    /// Runs the connection until the client leaves or an error ends it.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(ConnectionError::ClientDisconnected) => {
                info!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Closing connection"),
        }

        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(command) = self.try_parse_command()? {
                let response = self.executor.execute(command)?;
                self.stats.command_processed();
                self.send_response(&response).await?;
            }

            self.read_more_data().await?;
        }
    }

    /// Splits one complete frame off the front of the buffer.
    fn try_parse_command(&mut self) -> Result<Option<RespValue>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer)? {
            Some((value, consumed)) => {
                self.buffer.advance(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Decoded frame"
                );
                Ok(Some(value))
            }
            None => {
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete frame, need more data"
                );
                Ok(None)
            }
        }
    }

    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= self.limits.max_buffer_size {
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            return Err(if self.buffer.is_empty() {
                ConnectionError::ClientDisconnected
            } else {
                ConnectionError::UnexpectedEof
            });
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    async fn send_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.encode();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(client = %self.addr, bytes = bytes.len(), "Sent response");
        Ok(())
    }
}

/// Runs a [`ConnectionHandler`] to completion.
///
/// The outcome is logged by the handler itself, so errors are not returned.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    executor: CommandExecutor,
    stats: Arc<ConnectionStats>,
    limits: ConnectionLimits,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, executor, stats, limits);
    let _ = handler.run().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_test::io::Builder;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn handler_for<S>(
        stream: S,
        limits: ConnectionLimits,
    ) -> (ConnectionHandler<S>, Arc<ConnectionStats>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let executor = CommandExecutor::new(Arc::new(Store::new()));
        let stats = Arc::new(ConnectionStats::new());
        let handler =
            ConnectionHandler::new(stream, test_addr(), executor, Arc::clone(&stats), limits);
        (handler, stats)
    }

    #[tokio::test]
    async fn test_ping_then_disconnect() {
        let mock = Builder::new()
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .build();
        let (handler, stats) = handler_for(mock, ConnectionLimits::default());

        let result = handler.run().await;

        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
        assert_eq!(stats.bytes_written.load(Ordering::Relaxed), 7);
    }

    #[tokio::test]
    async fn test_pipelined_commands_in_one_read() {
        let mock = Builder::new()
            .read(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n")
            .write(b"+OK\r\n")
            .write(b"$3\r\nbar\r\n")
            .build();
        let (handler, stats) = handler_for(mock, ConnectionLimits::default());

        let _ = handler.run().await;

        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_frame_split_across_reads() {
        let mock = Builder::new()
            .read(b"*2\r\n$3\r\nGET")
            .read(b"\r\n$3\r\nfoo\r\n")
            .write(b"$-1\r\n")
            .build();
        let (handler, _) = handler_for(mock, ConnectionLimits::default());

        assert!(matches!(
            handler.run().await,
            Err(ConnectionError::ClientDisconnected)
        ));
    }

    #[tokio::test]
    async fn test_bulk_payload_with_crlf_split_across_reads() {
        // The first CRLF ends a bulk string whose declared length is not yet
        // buffered, so the value is truncated and the tail decodes on its own.
        let mock = Builder::new()
            .read(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$7\r\nab\r\n")
            .write(b"+OK\r\n")
            .read(b"cde\r\n*2\r\n$3\r\nGET\r\n$1\r\nk\r\n")
            .write(b"-unknown type prefix 'c'\r\n")
            .write(b"$2\r\nab\r\n")
            .build();
        let (handler, stats) = handler_for(mock, ConnectionLimits::default());

        assert!(matches!(
            handler.run().await,
            Err(ConnectionError::ClientDisconnected)
        ));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_decode_error_is_sent_as_reply() {
        let mock = Builder::new()
            .read(b":nope\r\n")
            .write(b"-cannot convert nope to int\r\n")
            .build();
        let (handler, _) = handler_for(mock, ConnectionLimits::default());

        assert!(matches!(
            handler.run().await,
            Err(ConnectionError::ClientDisconnected)
        ));
    }

    #[tokio::test]
    async fn test_command_error_closes_connection() {
        let mock = Builder::new()
            .read(b"*1\r\n$4\r\nNOPE\r\n*1\r\n$4\r\nPING\r\n")
            .build();
        let (handler, stats) = handler_for(mock, ConnectionLimits::default());

        let result = handler.run().await;

        assert!(matches!(
            result,
            Err(ConnectionError::CommandError(CommandError::UnknownCommand(_)))
        ));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 0);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_eof_mid_frame() {
        let mock = Builder::new().read(b"*1\r\n").build();
        let (handler, _) = handler_for(mock, ConnectionLimits::default());

        assert!(matches!(
            handler.run().await,
            Err(ConnectionError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_buffer_limit() {
        let mock = Builder::new().read(b"+aaaaaaaaaaaaaaaa").build();
        let limits = ConnectionLimits {
            max_buffer_size: 8,
            ..Default::default()
        };
        let (handler, _) = handler_for(mock, limits);

        assert!(matches!(
            handler.run().await,
            Err(ConnectionError::BufferFull)
        ));
    }

    #[tokio::test]
    async fn test_nesting_limit() {
        let mock = Builder::new().read(b"*1\r\n*1\r\n*1\r\n:1\r\n").build();
        let limits = ConnectionLimits {
            max_nesting_depth: 2,
            ..Default::default()
        };
        let (handler, _) = handler_for(mock, limits);

        assert!(matches!(
            handler.run().await,
            Err(ConnectionError::ParseError(ParseError::NestingTooDeep(2)))
        ));
    }

    async fn create_test_server() -> (SocketAddr, Arc<Store>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = Arc::new(Store::new());
        let stats = Arc::new(ConnectionStats::new());

        let store_clone = Arc::clone(&store);
        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let executor = CommandExecutor::new(Arc::clone(&store_clone));
                let stats = Arc::clone(&stats);
                tokio::spawn(handle_connection(
                    stream,
                    client_addr,
                    executor,
                    stats,
                    ConnectionLimits::default(),
                ));
            }
        });

        (addr, store)
    }

    #[tokio::test]
    async fn test_set_px_then_get_over_tcp() {
        let (addr, store) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 64];

        client
            .write_all(b"*5\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n$2\r\nPX\r\n$3\r\n100\r\n")
            .await
            .unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+OK\r\n");

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n")
            .await
            .unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"$3\r\nbar\r\n");

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_connections_share_one_store() {
        let (addr, _) = create_test_server().await;
        let mut writer = TcpStream::connect(addr).await.unwrap();
        let mut reader = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 64];

        writer
            .write_all(b"*3\r\n$3\r\nset\r\n$1\r\nk\r\n$1\r\nv\r\n")
            .await
            .unwrap();
        let n = writer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+OK\r\n");

        reader
            .write_all(b"*2\r\n$3\r\nget\r\n$1\r\nk\r\n")
            .await
            .unwrap();
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"$1\r\nv\r\n");
    }
}
