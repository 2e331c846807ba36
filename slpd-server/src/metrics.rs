//! Prometheus metrics for the slpd responder.
//!
//! This module provides:
//! - Metrics registry with counters, gauges, and histograms
//! - HTTP server to expose metrics at `/metrics` endpoint

use crate::error::ServerError;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Request handling duration buckets (in seconds). Requests are answered
/// from memory, so the interesting range is microseconds.
const DURATION_BUCKETS: &[f64] = &[
    0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05,
];

/// Prometheus metrics for the slpd responder.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Total requests by function.
    pub requests_total: CounterVec,
    /// Total error replies by error code.
    pub errors_total: CounterVec,
    /// Request handling duration histogram by function.
    pub request_duration: HistogramVec,
    /// Datagrams received.
    pub datagrams_total: Counter,
    /// Services loaded from the services file.
    pub services_registered: Gauge,
}

impl Metrics {
    /// Creates a new Metrics instance with all metrics registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("slpd_requests_total", "Total requests by function"),
            &["function"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let errors_total = CounterVec::new(
            Opts::new("slpd_errors_total", "Total error replies by error code"),
            &["code"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "slpd_request_duration_seconds",
                "Request handling duration in seconds by function",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["function"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        let datagrams_total = Counter::with_opts(Opts::new(
            "slpd_datagrams_total",
            "Total datagrams received",
        ))?;
        registry.register(Box::new(datagrams_total.clone()))?;

        let services_registered = Gauge::with_opts(Opts::new(
            "slpd_services_registered",
            "Number of services loaded from the services file",
        ))?;
        registry.register(Box::new(services_registered.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            errors_total,
            request_duration,
            datagrams_total,
            services_registered,
        })
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        buffer
    }
}

/// Runs the HTTP metrics server.
///
/// The server listens on the given address and serves metrics at `/metrics`.
pub async fn run_metrics_server(
    addr: SocketAddr,
    metrics: Arc<Metrics>,
    shutdown: broadcast::Receiver<()>,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);
    serve_metrics(listener, metrics, shutdown).await;
    Ok(())
}

/// Serves metrics on an already bound listener until shutdown.
pub async fn serve_metrics(
    listener: TcpListener,
    metrics: Arc<Metrics>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let metrics = metrics.clone();
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                async move { handle_request(req, metrics).await }
                            });
                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                tracing::debug!("Metrics connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Metrics server accept error: {}", e);
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Metrics server shutting down");
                break;
            }
        }
    }
}

/// Handles an HTTP request to the metrics server.
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match req.uri().path() {
        "/metrics" => text_response(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            Bytes::from(metrics.encode()),
        ),
        "/health" | "/healthz" => text_response(StatusCode::OK, "text/plain", Bytes::from("OK")),
        _ => text_response(StatusCode::NOT_FOUND, "text/plain", Bytes::from("Not Found")),
    };

    Ok(response)
}

fn text_response(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();

        metrics.requests_total.with_label_values(&["SRVRQST"]).inc();
        metrics.errors_total.with_label_values(&["PARSE_ERROR"]).inc();
        metrics
            .request_duration
            .with_label_values(&["SRVRQST"])
            .observe(0.000_02);
        metrics.datagrams_total.inc();
        metrics.services_registered.set(3.0);

        let encoded_str = String::from_utf8(metrics.encode()).unwrap();

        assert!(encoded_str.contains("slpd_requests_total{function=\"SRVRQST\"} 1"));
        assert!(encoded_str.contains("slpd_errors_total{code=\"PARSE_ERROR\"} 1"));
        assert!(encoded_str.contains("slpd_request_duration_seconds"));
        assert!(encoded_str.contains("slpd_datagrams_total 1"));
        assert!(encoded_str.contains("slpd_services_registered 3"));
    }

    async fn http_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.datagrams_total.inc();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(serve_metrics(listener, metrics, shutdown_rx));

        let response = http_get(addr, "/metrics").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("slpd_datagrams_total 1"));

        let response = http_get(addr, "/health").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("OK"));

        let response = http_get(addr, "/nope").await;
        assert!(response.starts_with("HTTP/1.1 404"));

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
