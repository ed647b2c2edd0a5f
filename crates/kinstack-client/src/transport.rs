//! Framed byte-stream transport over TCP or TLS.
//!
//! Every message travels as a nine-byte frame header, the encoded message
//! and the raw value. Exactly one request is in flight per transport. Any
//! I/O or framing failure closes the transport; reconnecting is the pool's
//! business.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use kinstack_proto::{FRAME_HEADER_LEN, FrameHeader, FrameLimits, Message, WireMessage};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, trace};

use crate::error::{DeviceError, DeviceResult};

/// A duplex byte stream a device can be reached over.
pub trait DeviceStream: AsyncRead + AsyncWrite + Unpin + Send + std::fmt::Debug {}

impl<T> DeviceStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + std::fmt::Debug {}

/// Length-prefixed framing over a [`DeviceStream`].
#[derive(Debug)]
pub struct FramedTransport {
    stream: Option<Box<dyn DeviceStream>>,
    limits: FrameLimits,
    peer: String,
}

impl FramedTransport {
    /// Wrap a connected stream.
    pub fn new(stream: impl DeviceStream + 'static, limits: FrameLimits, peer: impl Into<String>) -> Self {
        Self {
            stream: Some(Box::new(stream)),
            limits,
            peer: peer.into(),
        }
    }

    /// Remote address, for logging.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Whether the stream is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Frame limits applied to both directions.
    #[must_use]
    pub fn limits(&self) -> FrameLimits {
        self.limits
    }

    /// Write one frame and flush.
    pub async fn send(&mut self, message: &Message, value: &[u8]) -> DeviceResult<()> {
        let result = self.send_frame(message, value).await;
        if result.is_err() {
            self.stream = None;
        }
        result
    }

    /// Read exactly one frame.
    pub async fn recv(&mut self) -> DeviceResult<(Message, Bytes)> {
        let result = self.recv_frame().await;
        if result.is_err() {
            self.stream = None;
        }
        result
    }

    /// Shut the stream down. Later calls fail with
    /// [`DeviceError::ConnectionClosed`].
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(peer = %self.peer, error = %e, "error shutting down device stream");
            }
        }
    }

    async fn send_frame(&mut self, message: &Message, value: &[u8]) -> DeviceResult<()> {
        let stream = self.stream.as_mut().ok_or(DeviceError::ConnectionClosed)?;
        let encoded = message.encode_to_bytes();
        let header = FrameHeader {
            message_len: frame_len("message", encoded.len())?,
            value_len: frame_len("value", value.len())?,
        };
        header.validate(&self.limits)?;
        trace!(
            peer = %self.peer,
            message_len = header.message_len,
            value_len = header.value_len,
            "sending frame"
        );
        stream.write_all(&header.encode()).await?;
        stream.write_all(&encoded).await?;
        if !value.is_empty() {
            stream.write_all(value).await?;
        }
        stream.flush().await?;
        Ok(())
    }

    async fn recv_frame(&mut self) -> DeviceResult<(Message, Bytes)> {
        let stream = self.stream.as_mut().ok_or(DeviceError::ConnectionClosed)?;
        let mut raw = [0u8; FRAME_HEADER_LEN];
        read_exact(stream, &mut raw).await?;
        let header = FrameHeader::decode(&raw)?;
        header.validate(&self.limits)?;
        trace!(
            peer = %self.peer,
            message_len = header.message_len,
            value_len = header.value_len,
            "received frame header"
        );

        let mut message = BytesMut::zeroed(header.message_len as usize);
        read_exact(stream, &mut message).await?;
        let mut value = BytesMut::zeroed(header.value_len as usize);
        if !value.is_empty() {
            read_exact(stream, &mut value).await?;
        }
        let message = Message::decode(message.freeze())?;
        Ok((message, value.freeze()))
    }
}

async fn read_exact(stream: &mut Box<dyn DeviceStream>, buf: &mut [u8]) -> DeviceResult<()> {
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(DeviceError::ConnectionClosed),
        Err(e) => Err(e.into()),
    }
}

fn frame_len(section: &'static str, len: usize) -> DeviceResult<u32> {
    u32::try_from(len)
        .map_err(|_| DeviceError::InvalidArgument(format!("{section} of {len} bytes cannot be framed")))
}

// ---------------------------------------------------------------------------
// Connecting
// ---------------------------------------------------------------------------

/// Open a TCP connection within `timeout`.
pub async fn connect_tcp(addr: &str, timeout: Duration) -> DeviceResult<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| DeviceError::Timeout("tcp connect"))??;
    stream.set_nodelay(true)?;
    debug!(addr, "connected to device");
    Ok(stream)
}

/// Open a TLS connection within `timeout`, verifying the server as
/// `server_name` under `config`.
pub async fn connect_tls(
    addr: &str,
    server_name: &str,
    config: Arc<ClientConfig>,
    timeout: Duration,
) -> DeviceResult<TlsStream<TcpStream>> {
    let name = ServerName::try_from(server_name.to_owned())
        .map_err(|e| DeviceError::InvalidArgument(format!("invalid server name {server_name}: {e}")))?;
    let tcp = connect_tcp(addr, timeout).await?;
    let connector = TlsConnector::from(config);
    let stream = tokio::time::timeout(timeout, connector.connect(name, tcp))
        .await
        .map_err(|_| DeviceError::Timeout("tls handshake"))??;
    debug!(addr, "tls session established");
    Ok(stream)
}

/// Build a TLS client configuration.
///
/// Trust comes from the PEM certificates in `ca_file`, or from nothing at
/// all when `skip_verify` is set (self-signed lab devices).
pub fn tls_client_config(ca_file: Option<&Path>, skip_verify: bool) -> DeviceResult<Arc<ClientConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| anyhow::anyhow!("tls protocol versions: {e}"))?;

    let config = if skip_verify {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
            .with_no_client_auth()
    } else {
        let mut roots = RootCertStore::empty();
        if let Some(path) = ca_file {
            let certs = CertificateDer::pem_file_iter(path)
                .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
            for cert in certs {
                let cert = cert.map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))?;
                roots
                    .add(cert)
                    .map_err(|e| anyhow::anyhow!("adding CA from {}: {e}", path.display()))?;
            }
        }
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    Ok(Arc::new(config))
}

/// Certificate verifier that accepts any server certificate but still checks
/// handshake signatures.
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
