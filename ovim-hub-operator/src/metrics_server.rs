//! Minimal `/metrics` endpoint over the process-wide Prometheus registry.
//! Deliberately hand-rolled on `hyper` rather than pulled in through a web
//! framework: this binary exposes exactly one route.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use std::convert::Infallible;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

async fn handle(req: Request<hyper::body::Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.uri().path() != "/metrics" {
        return Ok(Response::builder()
            .status(404)
            .body(Full::new(Bytes::from_static(b"not found")))
            .unwrap());
    }
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        eprintln!("failed to encode metrics: {e}");
        return Ok(Response::builder()
            .status(500)
            .body(Full::new(Bytes::from_static(b"encode error")))
            .unwrap());
    }
    Ok(Response::new(Full::new(Bytes::from(buffer))))
}

pub async fn run(port: u16, shutdown: CancellationToken) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    println!("metrics server listening on :{port}/metrics");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                let io = TokioIo::new(stream);
                tokio::spawn(async move {
                    if let Err(e) = Builder::new(hyper_util::rt::TokioExecutor::new())
                        .serve_connection(io, service_fn(handle))
                        .await
                    {
                        eprintln!("metrics connection error: {e}");
                    }
                });
            }
        }
    }
}
