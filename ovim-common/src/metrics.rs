//! Prometheus exposition shared by both binaries, via the `metrics` facade
//! and a tower layer instrumenting every HTTP request. The hub operator's
//! reconcile-loop counters are recorded directly with `metrics::counter!`/
//! `histogram!` rather than through this layer, since they are not
//! request-scoped.

use std::sync::OnceLock;
use std::time::Instant;

use axum::extract::MatchedPath;
use futures_util::future::BoxFuture;
use http::{Request, StatusCode};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tower::{Layer, Service};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn install_recorder_once() -> &'static PrometheusHandle {
    PROM_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("install global metrics recorder")
    })
}

pub fn render() -> String {
    install_recorder_once().render()
}

/// Tower layer recording request count, latency histogram, and in-flight gauge,
/// labeled by `MatchedPath` to avoid high-cardinality raw URLs.
#[derive(Clone)]
pub struct MetricsLayer {
    classifier: SharedClassifier<ServerErrorsAsFailures>,
    component: String,
}

impl MetricsLayer {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            classifier: SharedClassifier::new(ServerErrorsAsFailures::new()),
            component: component.into(),
        }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;
    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            classifier: self.classifier.clone(),
            component: self.component.clone(),
        }
    }
}

#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    component: String,
    #[allow(dead_code)]
    classifier: SharedClassifier<ServerErrorsAsFailures>,
}

impl<S, B> Service<Request<B>> for MetricsService<S>
where
    S: Service<Request<B>, Response = axum::response::Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let start = Instant::now();
        let method = req.method().as_str().to_owned();
        let route = req
            .extensions()
            .get::<MatchedPath>()
            .map(|m| m.as_str().to_owned())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        let component = self.component.clone();
        let mut svc = self.inner.clone();
        let fut = svc.call(req);

        Box::pin(async move {
            let in_flight = metrics::gauge!("http_server_in_flight_requests", "component" => component.clone());
            in_flight.increment(1);

            let res = fut.await;
            let elapsed = start.elapsed().as_secs_f64();
            let status = match &res {
                Ok(resp) => resp.status(),
                Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };

            metrics::histogram!(
                "http_server_request_duration_seconds",
                "method" => method.clone(),
                "route" => route.clone(),
                "status" => status.as_u16().to_string(),
                "component" => component.clone()
            )
            .record(elapsed);

            metrics::counter!(
                "http_server_requests_total",
                "method" => method,
                "route" => route,
                "status" => status.as_u16().to_string(),
                "component" => component
            )
            .increment(1);

            in_flight.decrement(1);
            res
        })
    }
}
