//! The single authenticated tunnel session.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use quinn::VarInt;
use quinn::crypto::rustls::QuicClientConfig;
use skiff_core::defaults::{DEFAULT_HANDSHAKE_TIMEOUT_SECS, MAX_CONTROL_FRAME_BYTES};
use skiff_proto::{Address, ParseResult, parse_status, write_client_hello, write_stream_request};
use tracing::{debug, info};

use crate::congestion::ControllerFactory;
use crate::error::{ConnectionError, StreamError};
use crate::stream::TunnelStream;
use crate::transport::TransportParameters;
use crate::trust::TrustContext;

const CLOSE_CODE_NORMAL: u32 = 0;
const READ_CHUNK: usize = 512;

/// A live QUIC connection to the remote endpoint.
///
/// `open_stream` may be called from many tasks at once. The session is
/// closed by [`Session::close`] or, failing that, when dropped.
#[derive(Debug)]
pub struct Session {
    connection: quinn::Connection,
    endpoint: quinn::Endpoint,
    remote: SocketAddr,
    closed: AtomicBool,
}

impl Session {
    /// Establish the session with a single attempt.
    ///
    /// `controller` is asked for exactly one controller, sized from the
    /// uplink rate in `params`. The whole attempt (resolution, handshake and
    /// hello) is bounded by the handshake timeout.
    pub async fn connect(
        remote: &str,
        identity: &str,
        extra: &[u8],
        trust: TrustContext,
        params: &TransportParameters,
        controller: &dyn ControllerFactory,
    ) -> Result<Self, ConnectionError> {
        let timeout = Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS);
        tokio::time::timeout(
            timeout,
            Self::connect_inner(remote, identity, extra, trust, params, controller),
        )
        .await
        .map_err(|_| ConnectionError::Timeout(timeout))?
    }

    async fn connect_inner(
        remote: &str,
        identity: &str,
        extra: &[u8],
        trust: TrustContext,
        params: &TransportParameters,
        controller: &dyn ControllerFactory,
    ) -> Result<Self, ConnectionError> {
        let addr = tokio::net::lookup_host(remote)
            .await
            .map_err(|source| ConnectionError::Resolve {
                addr: remote.to_string(),
                source,
            })?
            .next()
            .ok_or_else(|| ConnectionError::NoAddress(remote.to_string()))?;

        let bind: SocketAddr = if addr.is_ipv6() {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        };
        let endpoint = quinn::Endpoint::client(bind).map_err(ConnectionError::Endpoint)?;

        let crypto = QuicClientConfig::try_from(trust.tls)?;
        let mut client_config = quinn::ClientConfig::new(Arc::new(crypto));
        let congestion = controller.make_controller(params.up_bps);
        client_config.transport_config(Arc::new(params.to_transport_config(congestion)));

        debug!(remote = %addr, sni = %trust.server_name, "starting QUIC handshake");
        let connection = endpoint
            .connect_with(client_config, addr, &trust.server_name)?
            .await?;

        let session = Self {
            connection,
            endpoint,
            remote: addr,
            closed: AtomicBool::new(false),
        };
        session
            .hello(identity, extra, params)
            .await
            .map_err(|e| match e {
                StreamError::Rejected(msg) => ConnectionError::Rejected(msg),
                other => ConnectionError::Hello(other),
            })?;

        info!(remote = %addr, name = %identity, "session established");
        Ok(session)
    }

    async fn hello(
        &self,
        identity: &str,
        extra: &[u8],
        params: &TransportParameters,
    ) -> Result<(), StreamError> {
        let (mut send, mut recv) = self.connection.open_bi().await?;
        let mut buf = BytesMut::with_capacity(32 + identity.len() + extra.len());
        write_client_hello(
            &mut buf,
            params.up_bps,
            params.down_bps,
            identity.as_bytes(),
            extra,
        )
        .map_err(StreamError::ProtoWrite)?;
        send.write_all(&buf).await?;

        let (ok, message, _) = read_status(&mut recv).await?;
        if let Err(e) = send.finish() {
            debug!(error = %e, "failed to finish hello stream");
        }
        if !ok {
            return Err(StreamError::Rejected(message));
        }
        Ok(())
    }

    /// Open a tunnel stream towards `target`.
    pub async fn open_stream(&self, target: &Address) -> Result<TunnelStream, StreamError> {
        if self.is_closed() {
            return Err(StreamError::SessionClosed);
        }
        let (mut send, mut recv) = self.connection.open_bi().await?;

        let mut buf = BytesMut::with_capacity(32);
        write_stream_request(&mut buf, &target.as_ref()).map_err(StreamError::ProtoWrite)?;
        send.write_all(&buf).await?;

        let (ok, message, pending) = read_status(&mut recv).await?;
        if !ok {
            return Err(StreamError::Rejected(message));
        }
        Ok(TunnelStream::new(send, recv, pending))
    }

    pub fn remote_address(&self) -> SocketAddr {
        self.remote
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the session. Later calls do nothing.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.connection
            .close(VarInt::from_u32(CLOSE_CODE_NORMAL), b"client closing");
        info!(remote = %self.remote, "session closed");
    }

    /// Resolves when the connection is gone, for whatever reason.
    pub async fn closed(&self) -> quinn::ConnectionError {
        self.connection.closed().await
    }

    /// Wait for close frames to be delivered, bounded by `timeout`.
    pub async fn wait_idle(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.endpoint.wait_idle()).await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read one status frame; bytes past the frame are returned as `pending`.
async fn read_status(
    recv: &mut quinn::RecvStream,
) -> Result<(bool, String, Bytes), StreamError> {
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let parsed = match parse_status(&buf) {
            ParseResult::Complete(status) => {
                Some((status.ok, status.message_lossy(), status.frame_len))
            }
            ParseResult::Incomplete(_) => None,
            ParseResult::Invalid(e) => return Err(StreamError::Proto(e)),
        };
        if let Some((ok, message, frame_len)) = parsed {
            buf.advance(frame_len);
            return Ok((ok, message, buf.freeze()));
        }
        if buf.len() >= MAX_CONTROL_FRAME_BYTES {
            return Err(StreamError::FrameTooLarge(MAX_CONTROL_FRAME_BYTES));
        }
        match recv.read(&mut chunk).await? {
            Some(n) => buf.extend_from_slice(&chunk[..n]),
            None => return Err(StreamError::UnexpectedEof),
        }
    }
}
