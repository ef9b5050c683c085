/// Single-use transport session.
///
/// `send` spawns one task that walks
/// `Resolving -> Connecting -> [Handshaking] -> Writing -> Reading -> Finished`
/// and hands its result to a [`PendingResponse`] exactly once.
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, lookup_host};
use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, OnceCell, oneshot};
use tokio_native_tls::{TlsConnector, TlsStream};
use tracing::{debug, warn};

use super::http::{self, HttpRequest, HttpResponse, Method};
use super::{Scheme, SessionStage, TransportError, Url};
use crate::config::TransportConfig;

pub type SessionResult = Result<HttpResponse, TransportError>;

/// Shared by every session: the runtime they run on, TLS settings and limits.
/// Read-only once built.
pub struct TransportContext {
    runtime: Handle,
    tls: TlsConnector,
    config: TransportConfig,
}

impl TransportContext {
    /// System trust store with hostname verification. Must be called from
    /// inside a tokio runtime; sessions are spawned onto that runtime.
    pub fn new(config: TransportConfig) -> Result<Arc<Self>, TransportError> {
        let connector = native_tls::TlsConnector::new().map_err(|e| {
            TransportError::new(SessionStage::Created, format!("TLS setup failed: {e}"))
        })?;
        Self::with_tls(config, connector)
    }

    pub fn with_tls(
        config: TransportConfig,
        connector: native_tls::TlsConnector,
    ) -> Result<Arc<Self>, TransportError> {
        let runtime = Handle::try_current().map_err(|_| {
            TransportError::new(SessionStage::Created, "no async runtime to run sessions on")
        })?;

        Ok(Arc::new(Self {
            runtime,
            tls: TlsConnector::from(connector),
            config,
        }))
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

/// One request/response exchange. `send` consumes the session.
pub struct HttpSession {
    context: Arc<TransportContext>,
    headers: Vec<(String, String)>,
}

impl HttpSession {
    pub fn new(context: Arc<TransportContext>) -> Self {
        Self {
            context,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Build the request and start resolving `url.host` right away.
    pub fn send(self, method: Method, url: &Url, body: impl Into<Vec<u8>>) -> PendingResponse {
        let mut request = HttpRequest::new(method, url, body.into());
        for (name, value) in &self.headers {
            request.set_header(name, value);
        }

        let stages = StageLog::new();
        let (tx, rx) = oneshot::channel();
        let exchange = Exchange {
            context: self.context.clone(),
            url: url.clone(),
            request,
            stages: stages.clone(),
        };

        self.context.runtime.spawn(async move {
            let result = exchange.run().await;
            if let Err(e) = &result {
                warn!("{} {} failed while {}", exchange.request.method, exchange.url, e);
            }
            exchange.stages.enter(SessionStage::Finished);
            if tx.send(result).is_err() {
                debug!("Session result for {} dropped by caller", exchange.url);
            }
        });

        PendingResponse {
            receiver: AsyncMutex::new(rx),
            outcome: OnceCell::new(),
            stages,
        }
    }
}

/// Handle on an in-flight session. The result is produced once; every
/// call to [`outcome`](Self::outcome) observes that same value.
pub struct PendingResponse {
    receiver: AsyncMutex<oneshot::Receiver<SessionResult>>,
    outcome: OnceCell<SessionResult>,
    stages: StageLog,
}

impl PendingResponse {
    pub async fn outcome(&self) -> &SessionResult {
        self.outcome
            .get_or_init(|| async {
                let mut receiver = self.receiver.lock().await;
                (&mut *receiver).await.unwrap_or_else(|_| Err(lost_result()))
            })
            .await
    }

    pub async fn into_result(self) -> SessionResult {
        if let Some(outcome) = self.outcome.into_inner() {
            return outcome;
        }
        self.receiver
            .into_inner()
            .await
            .unwrap_or_else(|_| Err(lost_result()))
    }

    /// Stages entered so far, in order.
    pub fn stages(&self) -> Vec<SessionStage> {
        self.stages.snapshot()
    }

    pub fn stage(&self) -> SessionStage {
        self.stages.current()
    }
}

fn lost_result() -> TransportError {
    TransportError::new(SessionStage::Finished, "session ended without a result")
}

#[derive(Clone)]
struct StageLog(Arc<Mutex<Vec<SessionStage>>>);

impl StageLog {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(vec![SessionStage::Created])))
    }

    fn enter(&self, stage: SessionStage) {
        debug!("Session stage: {}", stage);
        self.0.lock().unwrap_or_else(|e| e.into_inner()).push(stage);
    }

    fn snapshot(&self) -> Vec<SessionStage> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn current(&self) -> SessionStage {
        self.snapshot()
            .last()
            .copied()
            .unwrap_or(SessionStage::Created)
    }
}

struct Exchange {
    context: Arc<TransportContext>,
    url: Url,
    request: HttpRequest,
    stages: StageLog,
}

impl Exchange {
    async fn run(&self) -> SessionResult {
        let addrs = self.resolve().await?;
        let tcp = self.connect(&addrs).await?;
        match self.url.scheme {
            Scheme::Http => self.transfer(tcp).await,
            Scheme::Https => {
                let tls = self.handshake(tcp).await?;
                self.transfer(tls).await
            }
        }
    }

    async fn resolve(&self) -> Result<Vec<SocketAddr>, TransportError> {
        const STAGE: SessionStage = SessionStage::Resolving;
        self.stages.enter(STAGE);

        let host = self.url.bare_host();
        let port = self.url.port;
        let addrs: Vec<SocketAddr> = within(STAGE, self.config().resolve_timeout, async {
            lookup_host((host, port))
                .await
                .map(|found| found.collect())
                .map_err(|e| TransportError::new(STAGE, format!("cannot resolve {host}: {e}")))
        })
        .await?;

        if addrs.is_empty() {
            return Err(TransportError::new(STAGE, format!("no addresses for {host}")));
        }
        debug!("Resolved {} to {} address(es)", host, addrs.len());
        Ok(addrs)
    }

    async fn connect(&self, addrs: &[SocketAddr]) -> Result<TcpStream, TransportError> {
        const STAGE: SessionStage = SessionStage::Connecting;
        self.stages.enter(STAGE);

        let mut last_error = None;
        for &addr in addrs {
            let attempt = within(STAGE, self.config().connect_timeout, async {
                TcpStream::connect(addr)
                    .await
                    .map_err(|e| TransportError::new(STAGE, format!("{addr}: {e}")))
            })
            .await;

            match attempt {
                Ok(stream) => {
                    debug!("Connected to {}", addr);
                    return Ok(stream);
                }
                Err(e) => {
                    debug!("Connect attempt failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        let detail = last_error.map(|e| e.message().to_string()).unwrap_or_default();
        Err(TransportError::new(
            STAGE,
            format!("all {} address(es) failed, last error {}", addrs.len(), detail),
        ))
    }

    async fn handshake(&self, tcp: TcpStream) -> Result<TlsStream<TcpStream>, TransportError> {
        const STAGE: SessionStage = SessionStage::Handshaking;
        self.stages.enter(STAGE);

        let host = self.url.bare_host();
        within(STAGE, self.config().handshake_timeout, async {
            self.context
                .tls
                .connect(host, tcp)
                .await
                .map_err(|e| TransportError::new(STAGE, format!("TLS with {host} failed: {e}")))
        })
        .await
    }

    async fn transfer<S>(&self, mut stream: S) -> SessionResult
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.stages.enter(SessionStage::Writing);
        let bytes = self.request.to_bytes();
        within(SessionStage::Writing, self.config().write_timeout, async {
            stream
                .write_all(&bytes)
                .await
                .map_err(io_error(SessionStage::Writing))?;
            stream.flush().await.map_err(io_error(SessionStage::Writing))
        })
        .await?;

        self.stages.enter(SessionStage::Reading);
        let method = self.request.method;
        let response = within(SessionStage::Reading, self.config().read_timeout, async {
            http::read_response(&mut stream, method)
                .await
                .map_err(io_error(SessionStage::Reading))
        })
        .await?;

        debug!(
            "{} {} -> {} ({} bytes)",
            method,
            self.url,
            response.status,
            response.body.len()
        );
        Ok(response)
    }

    fn config(&self) -> &TransportConfig {
        &self.context.config
    }
}

async fn within<T, F>(stage: SessionStage, limit: Option<Duration>, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or_else(|_| Err(TransportError::timed_out(stage, limit))),
        None => fut.await,
    }
}

fn io_error(stage: SessionStage) -> impl Fn(std::io::Error) -> TransportError {
    move |e| TransportError::new(stage, e.to_string())
}
