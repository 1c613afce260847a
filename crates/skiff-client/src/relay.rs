//! Local SOCKS5 front-end that relays each accepted connection through its
//! own tunnel stream.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use skiff_config::ResolvedClient;
use skiff_core::defaults::{
    DEFAULT_RELAY_BUFFER_SIZE, DEFAULT_SHUTDOWN_TIMEOUT_SECS, DEFAULT_TCP_NO_DELAY,
};
use skiff_core::io::relay_bidirectional;
use skiff_proto::Address;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::{RelayError, StreamError};
use crate::observer::RelayObserver;
use crate::session::Session;
use crate::socks5::{
    REPLY_GENERAL_FAILURE, REPLY_HOST_UNREACHABLE, REPLY_NETWORK_UNREACHABLE, REPLY_SUCCEEDED,
    accept_connect, send_reply,
};
use crate::stream::TunnelStream;

/// Source of tunnel streams for the relay.
#[async_trait]
pub trait StreamOpener: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn open_stream(&self, target: &Address) -> Result<Self::Stream, StreamError>;

    /// Resolves once the underlying session is gone. Relays still running
    /// at that point are ended with [`StreamError::SessionClosed`].
    async fn closed(&self);
}

#[async_trait]
impl StreamOpener for Session {
    type Stream = TunnelStream;

    async fn open_stream(&self, target: &Address) -> Result<TunnelStream, StreamError> {
        Session::open_stream(self, target).await
    }

    async fn closed(&self) {
        Session::closed(self).await;
    }
}

/// Per-connection relay settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOptions {
    pub buffer_size: usize,
    pub tcp_no_delay: bool,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_RELAY_BUFFER_SIZE,
            tcp_no_delay: DEFAULT_TCP_NO_DELAY,
        }
    }
}

impl RelayOptions {
    pub fn from_resolved(config: &ResolvedClient) -> Self {
        Self {
            buffer_size: config.relay_buffer_size,
            tcp_no_delay: config.tcp_no_delay,
        }
    }
}

/// A bound SOCKS5 listener, ready to accept.
pub struct RelayServer<O> {
    listener: TcpListener,
    opener: Arc<O>,
    observer: Arc<dyn RelayObserver>,
    options: RelayOptions,
    tracker: TaskTracker,
}

impl<O: StreamOpener> RelayServer<O> {
    pub async fn bind(
        listen: &str,
        opener: Arc<O>,
        observer: Arc<dyn RelayObserver>,
        options: RelayOptions,
    ) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(listen)
            .await
            .map_err(|source| RelayError::Bind {
                addr: listen.to_string(),
                source,
            })?;
        Ok(Self {
            listener,
            opener,
            observer,
            options,
            tracker: TaskTracker::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Tracker of the per-connection tasks. It is closed when [`run`]
    /// returns, so [`drain`] on it completes once they have all finished.
    ///
    /// [`run`]: RelayServer::run
    pub fn tracker(&self) -> TaskTracker {
        self.tracker.clone()
    }

    /// Spawn connection tasks on `tracker` instead of a private one.
    pub fn with_tracker(mut self, tracker: TaskTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Accept until `shutdown` is cancelled.
    ///
    /// Accept errors are logged and skipped. Connections already handed to
    /// a task keep running after this returns.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), RelayError> {
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let opener = self.opener.clone();
                            let observer = self.observer.clone();
                            let options = self.options;
                            self.tracker.spawn(async move {
                                handle_connection(stream, peer, opener, observer, options).await;
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("relay shutting down");
                    break;
                }
            }
        }
        self.tracker.close();
        Ok(())
    }
}

/// Wait for every task of a closed `tracker` to finish, bounded by `timeout`.
///
/// Returns false if some were still running when the timeout elapsed.
pub async fn drain(tracker: &TaskTracker, timeout: Duration) -> bool {
    if tracker.is_empty() {
        return true;
    }
    info!("waiting for {} active connections to drain", tracker.len());
    match tokio::time::timeout(timeout, tracker.wait()).await {
        Ok(()) => {
            info!("all connections drained");
            true
        }
        Err(_) => {
            warn!(
                remaining = tracker.len(),
                "shutdown timeout, abandoning remaining connections"
            );
            false
        }
    }
}

/// Bind `listen` and relay connections through `opener` until `shutdown`,
/// then give in-flight connections a bounded time to finish.
pub async fn serve<O: StreamOpener>(
    listen: &str,
    opener: Arc<O>,
    observer: Arc<dyn RelayObserver>,
    options: RelayOptions,
    shutdown: CancellationToken,
) -> Result<(), RelayError> {
    let server = RelayServer::bind(listen, opener, observer, options).await?;
    info!(listen = %listen, "SOCKS5 server up and running");
    let tracker = server.tracker();
    server.run(shutdown).await?;
    drain(&tracker, Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS)).await;
    Ok(())
}

async fn handle_connection<O: StreamOpener>(
    mut stream: TcpStream,
    peer: SocketAddr,
    opener: Arc<O>,
    observer: Arc<dyn RelayObserver>,
    options: RelayOptions,
) {
    if options.tcp_no_delay
        && let Err(e) = stream.set_nodelay(true)
    {
        debug!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
    }

    let target = match accept_connect(&mut stream).await {
        Ok(target) => target,
        Err(e) => {
            let e = RelayError::from(e);
            debug!(peer = %peer, error = %e, error_type = e.error_type(), "SOCKS5 negotiation failed");
            return;
        }
    };
    let target_label = target.to_string();

    observer.on_open(peer, &target_label);
    let result = relay_connection(&mut stream, &target, opener.as_ref(), options).await;
    observer.on_close(peer, &target_label, result.as_ref().err());
}

async fn relay_connection<O: StreamOpener>(
    stream: &mut TcpStream,
    target: &Address,
    opener: &O,
    options: RelayOptions,
) -> Result<(), RelayError> {
    let tunnel = match opener.open_stream(target).await {
        Ok(tunnel) => tunnel,
        Err(e) => {
            let _ = send_reply(stream, reply_code_for_stream_error(&e)).await;
            return Err(e.into());
        }
    };
    send_reply(stream, REPLY_SUCCEEDED).await?;

    tokio::select! {
        result = relay_bidirectional(stream, tunnel, options.buffer_size) => {
            let stats = result?;
            debug!(
                target = %target,
                uploaded = stats.uploaded,
                downloaded = stats.downloaded,
                "relay finished"
            );
            Ok(())
        }
        _ = opener.closed() => Err(StreamError::SessionClosed.into()),
    }
}

fn reply_code_for_stream_error(error: &StreamError) -> u8 {
    match error {
        StreamError::Rejected(_) => REPLY_HOST_UNREACHABLE,
        StreamError::SessionClosed | StreamError::Open(_) => REPLY_NETWORK_UNREACHABLE,
        _ => REPLY_GENERAL_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
    use tokio::sync::mpsc;

    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    enum Event {
        Open(SocketAddr, String),
        Close(SocketAddr, String, Option<&'static str>),
    }

    struct RecordingObserver(mpsc::UnboundedSender<Event>);

    impl RelayObserver for RecordingObserver {
        fn on_open(&self, local: SocketAddr, target: &str) {
            let _ = self.0.send(Event::Open(local, target.to_string()));
        }

        fn on_close(&self, local: SocketAddr, target: &str, cause: Option<&RelayError>) {
            let _ = self.0.send(Event::Close(
                local,
                target.to_string(),
                cause.map(RelayError::error_type),
            ));
        }
    }

    struct FakeOpener {
        refuse: bool,
        remotes: mpsc::UnboundedSender<(Address, DuplexStream)>,
        session: CancellationToken,
    }

    impl FakeOpener {
        fn new(refuse: bool, remotes: mpsc::UnboundedSender<(Address, DuplexStream)>) -> Self {
            Self {
                refuse,
                remotes,
                session: CancellationToken::new(),
            }
        }
    }

    #[async_trait]
    impl StreamOpener for FakeOpener {
        type Stream = DuplexStream;

        async fn open_stream(&self, target: &Address) -> Result<DuplexStream, StreamError> {
            if self.refuse {
                return Err(StreamError::Rejected("blocked".into()));
            }
            let (local, remote) = duplex(1024);
            let _ = self.remotes.send((target.clone(), remote));
            Ok(local)
        }

        async fn closed(&self) {
            self.session.cancelled().await;
        }
    }

    struct Harness {
        addr: SocketAddr,
        events: mpsc::UnboundedReceiver<Event>,
        remotes: mpsc::UnboundedReceiver<(Address, DuplexStream)>,
        session: CancellationToken,
        shutdown: CancellationToken,
        tracker: TaskTracker,
        server: tokio::task::JoinHandle<Result<(), RelayError>>,
    }

    async fn start(refuse: bool) -> Harness {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (remote_tx, remotes) = mpsc::unbounded_channel();
        let opener = Arc::new(FakeOpener::new(refuse, remote_tx));
        let session = opener.session.clone();
        let server = RelayServer::bind(
            "127.0.0.1:0",
            opener,
            Arc::new(RecordingObserver(event_tx)),
            RelayOptions::default(),
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();
        let tracker = server.tracker();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(server.run(shutdown.clone()));
        Harness {
            addr,
            events,
            remotes,
            session,
            shutdown,
            tracker,
            server,
        }
    }

    async fn socks_connect(addr: SocketAddr, domain: &str, port: u16) -> (TcpStream, u8) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut request = vec![5, 1, 0, 5, 1, 0, 3, domain.len() as u8];
        request.extend_from_slice(domain.as_bytes());
        request.extend_from_slice(&port.to_be_bytes());
        stream.write_all(&request).await.unwrap();

        let mut reply = [0u8; 12];
        stream.read_exact(&mut reply).await.unwrap();
        (stream, reply[3])
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn clean_relay_reports_open_then_close() {
        let mut h = start(false).await;
        let (mut client, reply) = socks_connect(h.addr, "example.org", 80).await;
        let client_addr = client.local_addr().unwrap();
        assert_eq!(reply, REPLY_SUCCEEDED);
        assert_eq!(
            next_event(&mut h.events).await,
            Event::Open(client_addr, "example.org:80".into())
        );

        let (target, mut remote) = h.remotes.recv().await.unwrap();
        assert_eq!(target.to_string(), "example.org:80");

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        remote.write_all(b"pong").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        client.shutdown().await.unwrap();
        remote.shutdown().await.unwrap();
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();

        assert_eq!(
            next_event(&mut h.events).await,
            Event::Close(client_addr, "example.org:80".into(), None)
        );
        h.shutdown.cancel();
        h.server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn refused_stream_replies_and_closes_with_cause() {
        let mut h = start(true).await;
        let (client, reply) = socks_connect(h.addr, "blocked.example", 443).await;
        let client_addr = client.local_addr().unwrap();
        assert_eq!(reply, REPLY_HOST_UNREACHABLE);

        assert_eq!(
            next_event(&mut h.events).await,
            Event::Open(client_addr, "blocked.example:443".into())
        );
        assert_eq!(
            next_event(&mut h.events).await,
            Event::Close(client_addr, "blocked.example:443".into(), Some("rejected"))
        );
    }

    #[tokio::test]
    async fn broken_tunnel_closes_with_cause_and_listener_survives() {
        let mut h = start(false).await;
        let (mut client, _) = socks_connect(h.addr, "a.example", 1).await;
        assert!(matches!(next_event(&mut h.events).await, Event::Open(_, _)));

        let (_, remote) = h.remotes.recv().await.unwrap();
        drop(remote);
        // Down direction sees EOF; the next upload hits the dead stream.
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        let _ = client.write_all(b"late data").await;

        match next_event(&mut h.events).await {
            Event::Close(_, target, Some(_)) => assert_eq!(target, "a.example:1"),
            other => panic!("unexpected event {other:?}"),
        }

        let (_client, reply) = socks_connect(h.addr, "b.example", 2).await;
        assert_eq!(reply, REPLY_SUCCEEDED);
        match next_event(&mut h.events).await {
            Event::Open(_, target) => assert_eq!(target, "b.example:2"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn session_close_ends_stalled_relay() {
        let mut h = start(false).await;
        let (client, reply) = socks_connect(h.addr, "idle.example", 9).await;
        let client_addr = client.local_addr().unwrap();
        assert_eq!(reply, REPLY_SUCCEEDED);
        assert!(matches!(next_event(&mut h.events).await, Event::Open(_, _)));

        // Neither side moves any bytes; only the session going away can end it.
        let (_, _remote) = h.remotes.recv().await.unwrap();
        h.session.cancel();

        assert_eq!(
            next_event(&mut h.events).await,
            Event::Close(client_addr, "idle.example:9".into(), Some("stream"))
        );
        drop(client);
    }

    #[tokio::test]
    async fn shutdown_drains_in_flight_relays() {
        let mut h = start(false).await;
        let (_client, _) = socks_connect(h.addr, "slow.example", 7).await;
        assert!(matches!(next_event(&mut h.events).await, Event::Open(_, _)));
        let (_, _remote) = h.remotes.recv().await.unwrap();

        h.shutdown.cancel();
        h.server.await.unwrap().unwrap();
        assert!(h.tracker.is_closed());
        assert!(!drain(&h.tracker, Duration::from_millis(50)).await);

        h.session.cancel();
        assert!(drain(&h.tracker, Duration::from_secs(5)).await);
        assert!(matches!(
            h.events.try_recv(),
            Ok(Event::Close(_, _, Some("stream")))
        ));
    }

    #[tokio::test]
    async fn failed_negotiation_emits_no_events() {
        let mut h = start(false).await;
        let mut client = TcpStream::connect(h.addr).await.unwrap();
        client.write_all(&[4, 1, 0]).await.unwrap();
        let mut rest = Vec::new();
        let _ = client.read_to_end(&mut rest).await;

        h.shutdown.cancel();
        h.server.await.unwrap().unwrap();
        assert!(drain(&h.tracker, Duration::from_secs(5)).await);
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn bind_conflict_is_fatal() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (event_tx, _events) = mpsc::unbounded_channel();
        let result = serve(
            &addr,
            Arc::new(FakeOpener::new(false, tx)),
            Arc::new(RecordingObserver(event_tx)),
            RelayOptions::default(),
            CancellationToken::new(),
        )
        .await;
        match result {
            Err(e) => assert!(e.is_fatal()),
            Ok(()) => panic!("bind should fail"),
        }
    }
}
