//! Skiff tunnel client.
//!
//! Resolves configuration, opens one authenticated QUIC session to the
//! remote endpoint and serves a local SOCKS5 listener whose connections are
//! each carried on their own stream of that session.

pub mod cli;
pub mod congestion;
mod error;
mod observer;
mod relay;
mod session;
pub mod socks5;
mod stream;
mod transport;
mod trust;

pub use cli::ClientArgs;
pub use congestion::{BrutalFactory, ControllerFactory, SharedController};
pub use error::{ClientError, ConnectionError, RelayError, Socks5Error, StreamError, TrustError};
pub use observer::{LogObserver, RelayObserver};
pub use relay::{RelayOptions, RelayServer, StreamOpener, serve};
pub use session::Session;
pub use stream::TunnelStream;
pub use transport::TransportParameters;
pub use trust::{TrustContext, build_trust, resolve_sni};

use std::sync::Arc;
use std::time::Duration;

use skiff_config::{Config, ResolvedClient};
use skiff_core::defaults::DEFAULT_SHUTDOWN_TIMEOUT_SECS;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

const CLOSE_LINGER: Duration = Duration::from_secs(1);

/// Run the client with the given configuration until `shutdown` fires.
pub async fn run(config: Config, shutdown: CancellationToken) -> Result<(), ClientError> {
    let resolved = skiff_config::resolve(&config.client)?;
    let controller = congestion::for_kind(resolved.congestion);
    run_resolved(&resolved, controller.as_ref(), Arc::new(LogObserver), shutdown).await
}

/// Run with an already resolved configuration and explicit collaborators.
///
/// Steps are strictly ordered: trust, transport parameters, session, then
/// the listener. A failure at any step returns before the next one starts.
/// The session is closed on every path out of this function, and every
/// relayed connection has reported its close before it returns (bounded by
/// the shutdown timeout).
pub async fn run_resolved(
    resolved: &ResolvedClient,
    controller: &dyn ControllerFactory,
    observer: Arc<dyn RelayObserver>,
    shutdown: CancellationToken,
) -> Result<(), ClientError> {
    info!(
        server = %resolved.server,
        listen = %resolved.listen,
        name = %resolved.name,
        up_mbps = resolved.up_mbps,
        down_mbps = resolved.down_mbps,
        congestion = ?resolved.congestion,
        "client configuration"
    );

    let trust = build_trust(resolved)?;
    let params = TransportParameters::from_resolved(resolved);
    let session = Arc::new(
        Session::connect(
            &resolved.server,
            &resolved.name,
            &resolved.auth,
            trust,
            &params,
            controller,
        )
        .await?,
    );

    let tracker = TaskTracker::new();
    let result = serve_session(resolved, session.clone(), observer, &tracker, shutdown).await;
    session.close();
    tracker.close();
    relay::drain(&tracker, Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS)).await;
    session.wait_idle(CLOSE_LINGER).await;
    result
}

async fn serve_session(
    resolved: &ResolvedClient,
    session: Arc<Session>,
    observer: Arc<dyn RelayObserver>,
    tracker: &TaskTracker,
    shutdown: CancellationToken,
) -> Result<(), ClientError> {
    let options = RelayOptions::from_resolved(resolved);
    let server = RelayServer::bind(&resolved.listen, session.clone(), observer, options)
        .await?
        .with_tracker(tracker.clone());
    info!(listen = %resolved.listen, "SOCKS5 server up and running");

    tokio::select! {
        result = server.run(shutdown) => Ok(result?),
        reason = session.closed() => {
            warn!(error = %reason, "session lost");
            Err(ConnectionError::Lost(reason).into())
        }
    }
}
