mod response;
mod routes;
mod types;

use crate::manager::ModelManager;
use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use response::json_error;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

/// Serve the model manager over HTTP until the process is stopped.
pub async fn serve(addr: SocketAddr, manager: Arc<ModelManager>) -> Result<()> {
    let make_svc = make_service_fn(move |_conn| {
        let manager = manager.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let manager = manager.clone();
                async move { Ok::<_, Infallible>(route(req, manager).await) }
            }))
        }
    });

    let server = Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind {addr}"))?
        .serve(make_svc);

    tracing::info!("Listening on http://{}", addr);

    server.await.context("HTTP server failed")?;
    Ok(())
}

async fn route(req: Request<Body>, manager: Arc<ModelManager>) -> Response<Body> {
    match (req.method(), req.uri().path()) {
        (&Method::POST, "/load_model") => routes::load_model(req, manager).await,
        (&Method::POST, "/run_model") => routes::run_model(req, manager).await,
        (&Method::GET, "/health") => routes::health().await,
        _ => json_error(StatusCode::NOT_FOUND, "not found"),
    }
}
