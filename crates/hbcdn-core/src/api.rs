//! Read-only download API.
//!
//! Three endpoints on a dedicated thread with its own runtime: the store-db
//! hash, the download counter, and the download redirect. Every response is
//! marked `Cache-Control: no-store`.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use md5::{Digest, Md5};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{json, Value};
use tracing::{debug, error};

use hbcdn_domain::{json_ascii, version_key};

use crate::catalog::{CatalogDb, DownloadRow};
use crate::export::cdn_url;

#[derive(Clone)]
pub struct ApiContext {
    pub catalog: CatalogDb,
    pub store_db_path: PathBuf,
    pub base_url: String,
    pub share_dir: PathBuf,
}

/// Running API server; dropping it shuts the listener down.
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ApiServer {
    pub fn start(ctx: ApiContext, host: &str, port: u16) -> Result<Self> {
        let listener = std::net::TcpListener::bind((host, port))
            .with_context(|| format!("failed to bind the API to {host}:{port}"))?;
        listener
            .set_nonblocking(true)
            .context("failed to configure the API listener")?;
        let addr = listener.local_addr().context("failed to read the API address")?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let state = Arc::new(ctx);
        let thread = thread::Builder::new()
            .name("hbcdn-api".to_string())
            .spawn(move || serve(listener, state, shutdown_rx))
            .context("failed to spawn the API thread")?;

        debug!("download API listening on {addr}");
        Ok(Self {
            addr,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn serve(
    listener: std::net::TcpListener,
    state: Arc<ApiContext>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to build the API runtime: {err}");
            return;
        }
    };
    runtime.block_on(async move {
        let listener = match tokio::net::TcpListener::from_std(listener) {
            Ok(listener) => listener,
            Err(err) => {
                error!("failed to adopt the API listener: {err}");
                return;
            }
        };
        let app = router(state);
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(err) = served {
            error!("download API stopped with an error: {err}");
        }
    });
}

fn router(state: Arc<ApiContext>) -> Router {
    Router::new()
        .route("/api.php", get(api_php))
        .route("/download.php", get(download_php))
        .fallback(not_found)
        .with_state(state)
}

async fn api_php(State(ctx): State<Arc<ApiContext>>) -> Response {
    let path = ctx.store_db_path.clone();
    let hash = tokio::task::spawn_blocking(move || store_db_hash(&path))
        .await
        .unwrap_or_default();
    json_response(StatusCode::OK, &json!({ "hash": hash }))
}

async fn download_php(
    State(ctx): State<Arc<ApiContext>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let title_id = params
        .get("tid")
        .map_or(String::new(), |tid| tid.trim().to_string());
    let check = params
        .get("check")
        .is_some_and(|value| is_truthy(value));

    if check {
        let catalog = ctx.catalog.clone();
        let tid = title_id.clone();
        let count = tokio::task::spawn_blocking(move || {
            catalog.get_download_count(&tid).unwrap_or(0)
        })
        .await
        .unwrap_or(0);
        return json_response(
            StatusCode::OK,
            &json!({ "number_of_downloads": count.to_string() }),
        );
    }

    let resolver_ctx = ctx.clone();
    let tid = title_id.clone();
    let destination = tokio::task::spawn_blocking(move || resolve_download_url(&resolver_ctx, &tid))
        .await
        .unwrap_or(None);

    match destination {
        Some(url) => (
            StatusCode::FOUND,
            [
                (header::LOCATION, url),
                (header::CACHE_CONTROL, "no-store".to_string()),
            ],
        )
            .into_response(),
        None => json_response(
            StatusCode::NOT_FOUND,
            &json!({ "error": "title_id_not_found" }),
        ),
    }
}

async fn not_found() -> Response {
    json_response(StatusCode::NOT_FOUND, &json!({ "error": "not_found" }))
}

fn json_response(status: StatusCode, value: &Value) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        json_ascii::to_string_compact(value),
    )
        .into_response()
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Lowercase hex MD5 of the store database file; empty when absent.
pub(crate) fn store_db_hash(path: &Path) -> String {
    let Ok(mut file) = File::open(path) else {
        return String::new();
    };
    let mut digest = Md5::new();
    let mut chunk = vec![0u8; 1024 * 1024];
    loop {
        match file.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => digest.update(&chunk[..read]),
            Err(_) => return String::new(),
        }
    }
    hex::encode(digest.finalize())
}

/// Best catalog row first, store-db `package` column second.
pub(crate) fn resolve_download_url(ctx: &ApiContext, title_id: &str) -> Option<String> {
    if title_id.is_empty() {
        return None;
    }
    if let Some(row) = best_catalog_row(&ctx.catalog, title_id) {
        return Some(cdn_url(&ctx.base_url, &ctx.share_dir, &row.pkg_path));
    }
    package_from_store_db(&ctx.store_db_path, title_id)
}

/// Highest version wins; ties break by `updated_at` desc, then `app_type`
/// asc, then `content_id` asc.
pub(crate) fn best_catalog_row(catalog: &CatalogDb, title_id: &str) -> Option<DownloadRow> {
    let rows = catalog.rows_for_title(title_id).ok()?;
    rows.into_iter().max_by(|a, b| {
        version_key(&a.version)
            .cmp(&version_key(&b.version))
            .then_with(|| a.updated_at.cmp(&b.updated_at))
            .then_with(|| b.app_type.as_str().cmp(a.app_type.as_str()))
            .then_with(|| b.content_id.cmp(&a.content_id))
    })
}

fn package_from_store_db(path: &Path, title_id: &str) -> Option<String> {
    if !path.exists() {
        return None;
    }
    let conn = Connection::open(path).ok()?;
    conn.query_row(
        "SELECT package FROM homebrews \
         WHERE id = ?1 AND package IS NOT NULL AND package != '' \
         ORDER BY rowid DESC LIMIT 1",
        params![title_id],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .ok()
    .flatten()
}
