//! HTTP host for development, preview and production
//!
//! Routes per mode:
//! - development: `/<id>/<version>/*` static from `<dist>`, `/.server-function/*`,
//!   `/server-function/*`
//! - preview: client assets from `<dist>/client` at `/`, `/.server-function/*`,
//!   `/server-function/*`
//! - production: `/<id>/<version>/*` static only
//!
//! `/.server-function/mf-manifest.json` is answered from the in-memory current
//! bundle and `/.server-function/status` reports the latest build.

use crate::bundle::builder::BundleBuilder;
use crate::bundle::manifest::MANIFEST_FILE;
use crate::bundle::pipeline::{BuildPipeline, BuildTrigger};
use crate::bundle::store::{BundleStore, PublishedBundle};
use crate::bundle::watcher::{fingerprint, Fingerprint, SourceWatcher};
use crate::config::{Mode, ServerConfig};
use crate::error::{FederationError, Result};
use crate::federation::host::WasmHost;
use crate::federation::loader::RuntimeLoader;
use crate::federation::remote::{HttpRemote, RemoteSource, StoreRemote};
use crate::server::adapter::{invoke_function, AdapterState, FUNCTION_PREFIX};
use crate::server::assets::{serve_index, serve_path, StaticDir};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde_json::json;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tracing::{info, warn};

/// Route prefix of the published bundle.
pub const BUNDLE_PREFIX: &str = "/.server-function";

/// State of the `/.server-function/*` routes.
#[derive(Clone)]
struct BundleRouteState {
    store: Arc<BundleStore>,
    pipeline: Option<Arc<BuildPipeline>>,
    files: StaticDir,
}

/// Everything one host process runs.
pub struct FunctionHost {
    config: ServerConfig,
    store: Arc<BundleStore>,
    pipeline: Option<Arc<BuildPipeline>>,
    loader: Arc<RuntimeLoader>,
    shutdown_tx: watch::Sender<bool>,
}

impl FunctionHost {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let host = WasmHost::new(config.limits.clone())?;
        let store = Arc::new(BundleStore::new(config.server_dir(), config.retain_builds));
        let remote_name = config.remote_name();

        let pipeline = if config.mode.serves_functions() {
            let builder = BundleBuilder::new(
                &config.functions_dir,
                config.server_dir(),
                &remote_name,
                host.clone(),
            );
            let pipeline = BuildPipeline::new(builder, store.clone(), config.extension.clone())
                .with_client_dir(config.client_dir());
            Some(Arc::new(pipeline))
        } else {
            None
        };

        let remote: Arc<dyn RemoteSource> = match &config.remote_url {
            Some(url) => Arc::new(HttpRemote::new(&remote_name, url, config.remote_timeout)?),
            None => Arc::new(StoreRemote::new(&remote_name, store.clone())),
        };
        let loader = Arc::new(RuntimeLoader::new(host, config.freshness).with_remote(remote));

        if let Some(pipeline) = &pipeline {
            let loader = loader.clone();
            pipeline.on_publish(Arc::new(move |_: &PublishedBundle| loader.invalidate()));
        }

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            store,
            pipeline,
            loader,
            shutdown_tx,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<BundleStore> {
        &self.store
    }

    pub fn pipeline(&self) -> Option<&Arc<BuildPipeline>> {
        self.pipeline.as_ref()
    }

    pub fn loader(&self) -> &Arc<RuntimeLoader> {
        &self.loader
    }

    /// Sender that stops the server and background tasks when set to `true`.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    /// Router for the configured mode.
    pub fn router(&self) -> Router {
        let mode = self.config.mode;
        let mut router = Router::new();

        if mode.serves_functions() {
            let adapter = AdapterState::new(self.loader.clone(), self.config.remote_name());
            router = router
                .merge(
                    Router::new()
                        .route(&format!("{}/*name", FUNCTION_PREFIX), any(invoke_function))
                        .with_state(adapter),
                )
                .merge(
                    Router::new()
                        .route(&format!("{}/*path", BUNDLE_PREFIX), get(bundle_asset))
                        .with_state(BundleRouteState {
                            store: self.store.clone(),
                            pipeline: self.pipeline.clone(),
                            files: StaticDir::new(self.config.server_dir()),
                        }),
                );
        }

        match mode {
            Mode::Development | Mode::Production => {
                let prefix = self.config.static_prefix();
                router = router.merge(
                    Router::new()
                        .route(&format!("{}/", prefix), get(serve_index))
                        .route(&format!("{}/*path", prefix), get(serve_path))
                        .with_state(StaticDir::new(&self.config.dist_dir)),
                );
            }
            Mode::Preview => {
                let client = StaticDir::new(self.config.client_dir());
                router = router.fallback(move |req: Request<Body>| {
                    let client = client.clone();
                    async move { client.serve(req.uri().path()).await }
                });
            }
        }

        let prefix = mode.log_prefix();
        router.layer(
            ServiceBuilder::new().layer(axum::middleware::from_fn(
                move |req: Request<Body>, next: Next| async move {
                    log_and_cors(prefix, req, next).await
                },
            )),
        )
    }

    /// Initial build and background tasks for the configured mode.
    pub async fn start_background(&self) -> Result<Vec<JoinHandle<()>>> {
        let mut tasks = Vec::new();
        let Some(pipeline) = &self.pipeline else {
            return Ok(tasks);
        };

        let watch_sources = match self.config.mode {
            Mode::Development => true,
            Mode::Preview => self.config.watch,
            Mode::Production => false,
        };
        // Taken before the initial build reads the tree.
        let baseline = if watch_sources {
            let root = self.config.functions_dir.clone();
            let snapshot = tokio::task::spawn_blocking(move || fingerprint(&root))
                .await
                .map_err(|e| {
                    FederationError::server_task_failed("source fingerprint", e.to_string())
                })?;
            Some(snapshot)
        } else {
            None
        };

        let report = pipeline.rebuild_now().await;
        if !report.is_success() {
            warn!("Initial build failed; serving the last published bundle if any");
            if self.store.current().is_none() {
                if let Err(e) = self.store.restore() {
                    warn!(error = %e, "No previous bundle to restore");
                }
            }
        }

        if let Some(baseline) = baseline {
            let (trigger, worker) = pipeline.spawn_worker(self.shutdown_tx.subscribe());
            tasks.push(worker);
            tasks.push(self.spawn_watcher(trigger, baseline));
        }

        Ok(tasks)
    }

    fn spawn_watcher(&self, trigger: BuildTrigger, baseline: Fingerprint) -> JoinHandle<()> {
        let mut watcher = SourceWatcher::new(
            self.config.functions_dir.clone(),
            trigger,
            self.shutdown_tx.subscribe(),
        )
        .with_poll_interval(self.config.poll_interval)
        .with_baseline(baseline);
        tokio::spawn(async move { watcher.run().await })
    }

    /// Bind, serve until Ctrl-C or shutdown, then stop background tasks.
    pub async fn run(self) -> Result<()> {
        let tasks = self.start_background().await?;
        let router = self.router();
        let addr = self.config.http_addr;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| FederationError::server_bind_failed(addr.to_string(), e.to_string()))?;

        print_banner(&self.config, addr);

        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl-C, shutting down");
                let _ = shutdown_tx.send(true);
            }
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
            })
            .await
            .map_err(|e| FederationError::server_task_failed("http server", e.to_string()))?;

        let _ = self.shutdown_tx.send(true);
        for task in tasks {
            let _ = task.await;
        }
        info!("Server stopped");
        Ok(())
    }
}

async fn bundle_asset(State(state): State<BundleRouteState>, Path(path): Path<String>) -> Response {
    match path.as_str() {
        MANIFEST_FILE => match state.store.current() {
            Some(bundle) => (
                [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
                bundle.manifest_json.clone(),
            )
                .into_response(),
            None => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "no bundle published yet" })),
            )
                .into_response(),
        },
        "status" => match &state.pipeline {
            Some(pipeline) => Json(pipeline.last_report()).into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        },
        _ => state.files.serve(&path).await,
    }
}

/// Request logging plus permissive CORS
async fn log_and_cors(prefix: &'static str, req: Request<Body>, next: Next) -> Response {
    info!(target: "pulse_remote::access", "[{}] [{}] Received: {}", prefix, req.method(), req.uri());

    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, PATCH, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
    response
}

/// First non-loopback IPv4 address of this machine, if any.
///
/// Connecting a UDP socket sends nothing; it only selects the outbound route.
pub fn local_network_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_loopback() && !ip.is_unspecified()).then_some(ip)
}

fn print_banner(config: &ServerConfig, addr: SocketAddr) {
    let port = addr.port();
    let path = match config.mode {
        Mode::Preview => "/".to_string(),
        Mode::Development | Mode::Production => format!("{}/", config.static_prefix()),
    };

    println!();
    println!("  Pulse {} ({})", env!("CARGO_PKG_VERSION"), config.mode);
    println!();
    println!("  Local:    http://localhost:{}{}", port, path);
    match local_network_ip() {
        Some(ip) => println!("  Network:  http://{}:{}{}", ip, port, path),
        None => println!("  Network:  unavailable"),
    }
    if config.mode.serves_functions() {
        println!();
        println!("  Remote:     {}", config.remote_name());
        println!(
            "  Manifest:   http://localhost:{}{}/{}",
            port, BUNDLE_PREFIX, MANIFEST_FILE
        );
        println!("  Functions:  http://localhost:{}{}/<name>", port, FUNCTION_PREFIX);
    }
    println!();
}
