pub mod cache;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use self::cache::{CacheStorage, CachedResponse};

/// Versioned precache partition; bump the suffix to invalidate shipped
/// shell assets.
pub const PRECACHE: &str = "learnify-v1";
pub const RUNTIME_CACHE: &str = "learnify-runtime-v1";

/// Shell manifest cached at install time.
pub const PRECACHE_URLS: &[&str] = &["/", "/index.html", "/manifest.json"];

const API_PREFIX: &str = "/api/";
const OFFLINE_MESSAGE: &str = "You are currently offline. Some features may be limited.";
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Origin the gateway forwards to. A trait seam so request policies can be
/// exercised without a live network.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn fetch(
        &self,
        method: &Method,
        path: &str,
        body: Bytes,
    ) -> Result<CachedResponse, AppError>;
}

pub struct HttpUpstream {
    client: reqwest::Client,
    origin: String,
}

impl HttpUpstream {
    pub fn new(origin: impl Into<String>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            origin: origin.into(),
        })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(
        &self,
        method: &Method,
        path: &str,
        body: Bytes,
    ) -> Result<CachedResponse, AppError> {
        let url = format!("{}{}", self.origin, path);

        let response = self
            .client
            .request(method.clone(), &url)
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response.bytes().await?;

        Ok(CachedResponse::new(status, content_type, bytes))
    }
}

/// Control messages from the application. Fire-and-forget, no response.
#[derive(Debug)]
pub enum GatewayMessage {
    /// Force immediate activation of a waiting update.
    SkipWaiting,
    /// Wipe every cache partition by name, unconditionally.
    ClearCache,
}

/// HTTP-level interception: network-first for `/api/` reads, cache-first
/// for everything else, pass-through for non-GET. Entirely independent of
/// the store's domain-object cache; the runtime partition has no ttl.
pub struct Gateway {
    upstream: Arc<dyn Upstream>,
    caches: Mutex<CacheStorage>,
    active: AtomicBool,
}

impl Gateway {
    pub fn new(upstream: Arc<dyn Upstream>) -> Self {
        Gateway {
            upstream,
            caches: Mutex::new(CacheStorage::default()),
            active: AtomicBool::new(false),
        }
    }

    fn caches(&self) -> MutexGuard<'_, CacheStorage> {
        self.caches.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Install: precache the shell manifest, then activate immediately
    /// instead of waiting for a previous instance to wind down.
    pub async fn install(&self) -> Result<(), AppError> {
        for path in PRECACHE_URLS {
            let response = self.upstream.fetch(&Method::GET, path, Bytes::new()).await?;
            self.caches().put(PRECACHE, path, response);
        }
        info!("precached {} shell asset(s)", PRECACHE_URLS.len());
        self.activate();
        Ok(())
    }

    /// Activation prunes partitions left behind by older versions and takes
    /// over request handling.
    pub fn activate(&self) {
        let removed = self.caches().retain_partitions(&[PRECACHE, RUNTIME_CACHE]);
        for name in removed {
            info!("deleting stale cache partition: {}", name);
        }
        self.active.store(true, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn handle_message(&self, message: GatewayMessage) {
        match message {
            GatewayMessage::SkipWaiting => self.activate(),
            GatewayMessage::ClearCache => {
                self.caches().clear();
                info!("cleared all cache partitions");
            }
        }
    }

    pub async fn run_control_loop(self: Arc<Self>, mut rx: mpsc::Receiver<GatewayMessage>) {
        while let Some(message) = rx.recv().await {
            self.handle_message(message);
        }
    }

    pub fn cache_put(&self, partition: &str, key: &str, response: CachedResponse) {
        self.caches().put(partition, key, response);
    }

    pub fn cached(&self, partition: &str, key: &str) -> Option<CachedResponse> {
        self.caches().match_in(partition, key).cloned()
    }

    pub fn partition_names(&self) -> Vec<String> {
        self.caches().partition_names()
    }

    pub async fn handle_request(&self, method: Method, path: &str, body: Bytes) -> CachedResponse {
        if method != Method::GET {
            return self.pass_through(&method, path, body).await;
        }
        if path.starts_with(API_PREFIX) {
            self.network_first(path).await
        } else {
            self.cache_first(path).await
        }
    }

    /// Non-read requests are forwarded untouched and never cached.
    async fn pass_through(&self, method: &Method, path: &str, body: Bytes) -> CachedResponse {
        match self.upstream.fetch(method, path, body).await {
            Ok(response) => response,
            Err(e) => {
                warn!("pass-through {} {} failed: {}", method, path, e);
                bad_gateway()
            }
        }
    }

    /// API reads: try the network, cache successful responses (status 200
    /// only), fall back to cache, and synthesize an offline error as the
    /// last resort.
    async fn network_first(&self, path: &str) -> CachedResponse {
        match self.upstream.fetch(&Method::GET, path, Bytes::new()).await {
            Ok(response) => {
                if response.status == 200 {
                    self.caches().put(RUNTIME_CACHE, path, response.clone());
                }
                response
            }
            Err(e) => {
                debug!("network-first fetch for {} failed: {}", path, e);
                if let Some(cached) = self.caches().match_any(path).cloned() {
                    debug!("serving {} from cache", path);
                    return cached;
                }
                offline_response()
            }
        }
    }

    /// Static assets: a cached response returns immediately with no network
    /// call; a miss goes upstream and caches status-200 responses.
    async fn cache_first(&self, path: &str) -> CachedResponse {
        if let Some(cached) = self.caches().match_any(path).cloned() {
            return cached;
        }

        match self.upstream.fetch(&Method::GET, path, Bytes::new()).await {
            Ok(response) => {
                if response.status == 200 {
                    self.caches().put(RUNTIME_CACHE, path, response.clone());
                }
                response
            }
            Err(e) => {
                warn!("cache-first fetch for {} failed: {}", path, e);
                bad_gateway()
            }
        }
    }
}

fn offline_response() -> CachedResponse {
    let body = serde_json::json!({
        "error": "Offline",
        "message": OFFLINE_MESSAGE,
    });
    CachedResponse::new(503, "application/json", body.to_string())
}

fn bad_gateway() -> CachedResponse {
    CachedResponse::new(502, "text/plain", Bytes::from_static(b"upstream unreachable"))
}

pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new().fallback(intercept).with_state(gateway)
}

async fn intercept(State(gateway): State<Arc<Gateway>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };

    let response = gateway.handle_request(parts.method, &path, bytes).await;
    into_http(response)
}

fn into_http(cached: CachedResponse) -> Response {
    let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::BAD_GATEWAY);
    (
        status,
        [(header::CONTENT_TYPE, cached.content_type)],
        Body::from(cached.body),
    )
        .into_response()
}

/// Runs the gateway on its own thread with a current-thread runtime: a
/// second, isolated execution context. The returned sender is the only
/// channel between it and the rest of the application.
pub fn spawn(origin: String, addr: SocketAddr) -> Result<mpsc::Sender<GatewayMessage>, AppError> {
    let (tx, rx) = mpsc::channel(16);
    let upstream = HttpUpstream::new(origin)?;

    std::thread::Builder::new()
        .name("gateway".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("failed to build gateway runtime: {}", e);
                    return;
                }
            };
            runtime.block_on(run(Arc::new(upstream), addr, rx));
        })
        .map_err(|e| AppError::Config(format!("failed to spawn gateway thread: {}", e)))?;

    Ok(tx)
}

/// Gateway main loop: install, serve, and react to control messages.
pub async fn run(
    upstream: Arc<dyn Upstream>,
    addr: SocketAddr,
    rx: mpsc::Receiver<GatewayMessage>,
) {
    let gateway = Arc::new(Gateway::new(upstream));

    if let Err(e) = gateway.install().await {
        warn!("precache install failed, continuing without shell assets: {}", e);
        gateway.activate();
    }

    tokio::spawn(gateway.clone().run_control_loop(rx));

    let app = router(gateway);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("gateway failed to bind {}: {}", addr, e);
            return;
        }
    };
    info!("gateway listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        error!("gateway server error: {}", e);
    }
}
