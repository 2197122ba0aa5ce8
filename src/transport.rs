//! Transport seam between a session and the network.
//!
//! A session never opens sockets itself: it calls a [`TransportFactory`]
//! for each login attempt and drives the returned [`Transport`]. The
//! bundled [`TlsTransport`] speaks TLS to the production chat endpoint;
//! tests substitute an in-process implementation.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls;
use tokio_rustls::TlsConnector;

use crate::action::Action;

/// Production chat endpoint used by [`TlsTransport::twitch`].
pub const TWITCH_CHAT_ADDR: &str = "irc.chat.twitch.tv:6697";

/// Hands inbound transport activity back to the session that owns the
/// transport.
///
/// Cheap to clone. Delivery becomes a no-op once the session is gone, so a
/// transport (or its read task) outliving the session is harmless.
#[derive(Clone)]
pub struct TransportSink {
    actions: UnboundedSender<Action>,
}

impl TransportSink {
    pub(crate) fn new(actions: UnboundedSender<Action>) -> Self {
        Self { actions }
    }

    /// Delivers raw bytes received from the server.
    pub fn data_received(&self, data: &str) {
        let _ = self.actions.send(Action::ProcessMessagesReceived {
            data: data.to_string(),
        });
    }

    /// Reports that the server closed its end of the connection.
    pub fn closed(&self) {
        let _ = self.actions.send(Action::ServerDisconnected);
    }
}

/// A connection to the chat server.
///
/// The session holds at most one transport at a time and tears it down on
/// logout, peer close, or handshake timeout.
#[async_trait]
pub trait Transport: Send {
    /// Establishes the connection, delivering inbound activity to `sink`.
    /// Returns false when the connection could not be established.
    async fn connect(&mut self, sink: TransportSink) -> bool;

    /// Queues raw bytes to be sent to the server.
    async fn send(&mut self, data: &str);

    /// Closes the connection.
    async fn disconnect(&mut self);
}

/// Creates a fresh [`Transport`] for each login attempt.
pub type TransportFactory = Box<dyn Fn() -> Box<dyn Transport> + Send>;

/// TLS transport to a chat server, verified against the webpki roots.
pub struct TlsTransport {
    addr: String,
    host: String,
    writer: Option<WriteHalf<TlsStream<TcpStream>>>,
    read_task: Option<JoinHandle<()>>,
}

impl TlsTransport {
    /// Transport to `addr` (`host:port`), using `host` for SNI and
    /// certificate verification.
    pub fn new(addr: &str) -> Self {
        let host = addr.split(':').next().unwrap_or(addr).to_string();
        Self {
            addr: addr.to_string(),
            host,
            writer: None,
            read_task: None,
        }
    }

    /// Transport to the production Twitch chat endpoint.
    pub fn twitch() -> Self {
        Self::new(TWITCH_CHAT_ADDR)
    }

    /// Factory producing one [`TlsTransport`] per login attempt.
    pub fn factory(addr: &str) -> TransportFactory {
        let addr = addr.to_string();
        Box::new(move || Box::new(TlsTransport::new(&addr)))
    }

    async fn try_connect(&mut self, sink: TransportSink) -> Result<()> {
        let tcp = TcpStream::connect(&self.addr).await?;
        let root_store =
            rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(config));
        let server_name = rustls::pki_types::ServerName::try_from(self.host.clone())?;
        let stream = connector.connect(server_name, tcp).await?;
        let (reader, writer) = tokio::io::split(stream);
        self.writer = Some(writer);
        self.read_task = Some(tokio::spawn(read_loop(reader, sink)));
        Ok(())
    }
}

#[async_trait]
impl Transport for TlsTransport {
    async fn connect(&mut self, sink: TransportSink) -> bool {
        match self.try_connect(sink).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(addr = %self.addr, %error, "chat server connection failed");
                false
            }
        }
    }

    async fn send(&mut self, data: &str) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(error) = writer.write_all(data.as_bytes()).await {
                tracing::warn!(%error, "chat server write failed");
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
    }
}

impl Drop for TlsTransport {
    fn drop(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
    }
}

async fn read_loop(mut reader: ReadHalf<TlsStream<TcpStream>>, sink: TransportSink) {
    let mut buffer = vec![0u8; 4096];
    loop {
        match reader.read(&mut buffer).await {
            Ok(0) | Err(_) => break,
            Ok(count) => sink.data_received(&String::from_utf8_lossy(&buffer[..count])),
        }
    }
    sink.closed();
}
