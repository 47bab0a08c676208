use std::{
    future::Future,
    io,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{ConnectInfo, Request, State, WebSocketUpgrade},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::ValueEnum;
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    select,
};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{Instrument, info, info_span, warn};

use crate::{
    executor::Executor,
    handler::{serve_socket, serve_stream},
    shutdown::{Drain, DrainHandle},
};

pub const WS_PATH: &str = "/ws";

/// How clients reach the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// Newline-delimited JSON over a plain TCP socket, no replies.
    Tcp,
    /// HTTP upgraded to a WebSocket at `/ws`, every command acknowledged.
    #[value(name = "websocket", alias = "ws")]
    WebSocket,
}

/// Decides which browser origins may open a WebSocket.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    allow_any: bool,
    allowed: Vec<String>,
}

impl OriginPolicy {
    /// Accepts only requests without an `Origin` header and same-origin pages.
    pub fn same_origin() -> Self {
        Self::default()
    }

    pub fn allow_any() -> Self {
        Self {
            allow_any: true,
            allowed: Vec::new(),
        }
    }

    pub fn with_allowed<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed.extend(
            origins
                .into_iter()
                .map(|origin| origin.into().trim_end_matches('/').to_string()),
        );
        self
    }

    pub fn allows(&self, origin: Option<&str>, host: Option<&str>) -> bool {
        // Non-browser clients do not send an Origin header.
        let Some(origin) = origin else {
            return true;
        };
        if self.allow_any {
            return true;
        }

        let origin = origin.trim_end_matches('/');
        if self
            .allowed
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(origin))
        {
            return true;
        }

        match (origin.split_once("://"), host) {
            (Some((_, authority)), Some(host)) => authority.eq_ignore_ascii_case(host),
            _ => false,
        }
    }
}

/// Knobs shared by both transports.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Directory served on every non-`/ws` path. WebSocket transport only.
    pub static_dir: Option<PathBuf>,
    pub origin_policy: OriginPolicy,
    pub grace_period: Duration,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            static_dir: None,
            origin_policy: OriginPolicy::same_origin(),
            grace_period: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen: SocketAddr,
    pub transport: Transport,
    pub options: RelayOptions,
}

/// A bound relay of either transport.
pub enum Relay {
    Tcp(TcpRelay),
    WebSocket(WsRelay),
}

impl Relay {
    /// Binds the listen address. Failing here is the only fatal server error.
    pub async fn bind(config: RelayConfig, executor: Executor) -> Result<Self> {
        let listener = TcpListener::bind(config.listen)
            .await
            .with_context(|| format!("failed to bind {}", config.listen))?;

        Ok(match config.transport {
            Transport::Tcp => {
                if config.options.static_dir.is_some() {
                    warn!("static files are only served by the websocket transport");
                }
                Relay::Tcp(TcpRelay::new(listener, executor, config.options))
            }
            Transport::WebSocket => {
                Relay::WebSocket(WsRelay::new(listener, executor, config.options))
            }
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Relay::Tcp(relay) => relay.local_addr(),
            Relay::WebSocket(relay) => relay.local_addr(),
        }
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self {
            Relay::Tcp(relay) => relay.run_until(shutdown).await,
            Relay::WebSocket(relay) => relay.run_until(shutdown).await,
        }
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = ?err, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = ?err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Raw-socket relay: newline-framed commands, no acknowledgements.
pub struct TcpRelay {
    listener: TcpListener,
    executor: Executor,
    grace_period: Duration,
}

impl TcpRelay {
    pub fn new(listener: TcpListener, executor: Executor, options: RelayOptions) -> Self {
        Self {
            listener,
            executor,
            grace_period: options.grace_period,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let TcpRelay {
            listener,
            executor,
            grace_period,
        } = self;
        let drain = Drain::new();
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("relay shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &executor, &drain);
                }
            }
        }

        drop(listener);
        finish_drain(drain, grace_period).await;
        Ok(())
    }
}

fn handle_accept_result(
    result: io::Result<(TcpStream, SocketAddr)>,
    executor: &Executor,
    drain: &Drain,
) {
    match result {
        Ok((stream, peer)) => spawn_stream_handler(stream, peer, executor.clone(), drain.handle()),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_stream_handler(
    stream: TcpStream,
    peer: SocketAddr,
    executor: Executor,
    mut drain: DrainHandle,
) {
    let span = info_span!("connection", peer = %peer);
    tokio::spawn(
        async move {
            info!("client connected");
            let mut reader = BufReader::new(stream);
            match serve_stream(&mut reader, &executor, drain.cancelled()).await {
                Ok(()) => info!("client disconnected"),
                Err(err) => warn!(error = %err, "client connection closed with error"),
            }
        }
        .instrument(span),
    );
}

/// HTTP relay: WebSocket command channel at [`WS_PATH`], optional static files elsewhere.
pub struct WsRelay {
    listener: TcpListener,
    executor: Executor,
    options: RelayOptions,
    drain: Drain,
}

#[derive(Clone)]
struct AppState {
    executor: Executor,
    drain: DrainHandle,
}

impl WsRelay {
    pub fn new(listener: TcpListener, executor: Executor, options: RelayOptions) -> Self {
        Self {
            listener,
            executor,
            options,
            drain: Drain::new(),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The HTTP application served by this relay.
    pub fn router(&self) -> Router {
        let state = AppState {
            executor: self.executor.clone(),
            drain: self.drain.handle(),
        };
        let policy = Arc::new(self.options.origin_policy.clone());

        let router = Router::new()
            .route(WS_PATH, get(ws_handler))
            .route_layer(middleware::from_fn_with_state(policy, check_origin))
            .with_state(state);

        let router = match &self.options.static_dir {
            Some(dir) => router.fallback_service(ServeDir::new(dir)),
            None => router,
        };

        router.layer(TraceLayer::new_for_http())
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        let WsRelay {
            listener,
            options,
            drain,
            ..
        } = self;
        let trigger = drain.trigger();

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("relay shutting down");
            // Upgraded sockets are detached from the HTTP server; stop them directly.
            trigger.fire();
        })
        .await
        .context("http server failed")?;

        finish_drain(drain, options.grace_period).await;
        Ok(())
    }
}

async fn check_origin(
    State(policy): State<Arc<OriginPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let headers = request.headers();
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());

    if !policy.allows(origin, host) {
        warn!(origin, "rejected websocket upgrade from disallowed origin");
        return StatusCode::FORBIDDEN.into_response();
    }

    next.run(request).await
}

async fn ws_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let AppState { executor, drain } = state;
    let span = info_span!("connection", peer = %peer);

    ws.on_upgrade(move |socket| {
        async move {
            let mut drain = drain;
            info!("websocket connected");
            match serve_socket(socket, &executor, drain.cancelled()).await {
                Ok(()) => info!("websocket disconnected"),
                Err(err) => warn!(error = %err, "websocket closed with error"),
            }
        }
        .instrument(span)
    })
}

async fn finish_drain(drain: Drain, grace_period: Duration) {
    if !drain.finish(grace_period).await {
        warn!(
            grace_secs = grace_period.as_secs_f64(),
            "connections still open after grace period"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_without_origin_are_allowed() {
        assert!(OriginPolicy::same_origin().allows(None, Some("10.0.0.2:8080")));
    }

    #[test]
    fn same_origin_pages_are_allowed() {
        let policy = OriginPolicy::same_origin();
        assert!(policy.allows(Some("http://10.0.0.2:8080"), Some("10.0.0.2:8080")));
        assert!(policy.allows(Some("http://LOCALHOST:8080/"), Some("localhost:8080")));
    }

    #[test]
    fn foreign_origins_are_denied_by_default() {
        let policy = OriginPolicy::same_origin();
        assert!(!policy.allows(Some("https://evil.example"), Some("10.0.0.2:8080")));
        assert!(!policy.allows(Some("null"), Some("10.0.0.2:8080")));
        assert!(!policy.allows(Some("http://10.0.0.2:8080"), None));
    }

    #[test]
    fn allow_list_and_allow_any() {
        let policy = OriginPolicy::same_origin().with_allowed(["https://remote.example/"]);
        assert!(policy.allows(Some("https://remote.example"), Some("10.0.0.2:8080")));
        assert!(!policy.allows(Some("https://other.example"), Some("10.0.0.2:8080")));

        assert!(OriginPolicy::allow_any().allows(Some("https://other.example"), None));
    }
}
