use axum::{
    response::IntoResponse,
    routing::{get, MethodRouter},
    Extension, Router,
};
use axum_prometheus::{
    metrics_exporter_prometheus::PrometheusHandle, Handle, PrometheusMetricLayer,
};
use axum_server::tls_rustls::RustlsConfig;
use axum_test::{transport_layer::IntoTransportLayer, TestServer};
use sentry_tower::{NewSentryLayer, SentryHttpLayer};
use std::{env, net::SocketAddr, str::FromStr, sync::OnceLock};
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tracing::info;
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::{
        self,
        format::{Format, JsonFields},
    },
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::ServerConfig;

/// Router under construction plus the process wide setup around it.
///
/// Every app also answers `/status/liveness` and `/metrics/prometheus`.
#[derive(Default)]
pub struct App {
    router: Router,
}

impl App {
    pub fn new() -> Self {
        // .env can carry RUST_LOG, load it before the logger
        dotenvy::dotenv().ok();
        logger();
        Self::default()
    }

    /// Binds per [`ServerConfig::from_env`] and serves until the process ends.
    pub async fn start(self) -> anyhow::Result<()> {
        let config = ServerConfig::from_env()?;
        start(self.into_router(), config).await
    }

    pub fn router(self, router: Router) -> Self {
        Self {
            router: self.router.merge(router),
        }
    }

    pub fn inject<T: Clone + Send + Sync + 'static>(self, t: T) -> Self {
        Self {
            router: self.router.layer(Extension(t)),
        }
    }

    pub fn route(self, path: &str, method_router: MethodRouter<()>) -> Self {
        let mut app = self;
        app.router = app.router.route(path, method_router);
        app
    }

    pub fn as_test_server(self) -> anyhow::Result<TestServer> {
        TestServer::new(self)
    }

    fn into_router(self) -> Router {
        let r = self
            .router
            .route("/status/liveness", get(|| async { "".into_response() }));
        prometheus(r)
    }
}

impl IntoTransportLayer for App {
    fn into_http_transport_layer(
        self,
        builder: axum_test::transport_layer::TransportLayerBuilder,
    ) -> anyhow::Result<Box<dyn axum_test::transport_layer::TransportLayer>> {
        self.into_router().into_http_transport_layer(builder)
    }

    fn into_mock_transport_layer(
        self,
    ) -> anyhow::Result<Box<dyn axum_test::transport_layer::TransportLayer>> {
        self.into_router().into_mock_transport_layer()
    }
}

async fn start(app: Router, config: ServerConfig) -> anyhow::Result<()> {
    let _guard = sentry();
    let compression_layer: CompressionLayer = CompressionLayer::new()
        .br(true)
        .deflate(true)
        .gzip(true)
        .zstd(true);
    let app = app
        .layer(NewSentryLayer::new_from_top())
        .layer(SentryHttpLayer::with_transaction())
        .layer(compression_layer);

    let addr = SocketAddr::from_str(&config.addr())?;
    if let Some(tls) = config.tls {
        // both ring and aws-lc can end up linked, pick one explicitly
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        info!("Server is running on {addr} with TLS ON");
        let tls_config = RustlsConfig::from_pem_file(tls.pem_cert, tls.pem_key).await?;
        axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service())
            .await?
    } else {
        info!("Server is running on {addr}");
        axum::serve(TcpListener::bind(addr).await?, app).await?;
    }
    Ok(())
}

fn sentry() -> Option<sentry::ClientInitGuard> {
    if let Ok(url) = env::var("SENTRY_URL") {
        return Some(sentry::init((
            url,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                traces_sample_rate: 1.0,
                ..Default::default()
            },
        )));
    }
    None
}

pub(crate) fn logger() {
    let enabled: bool = env::var("STRUCTURED_LOGGING")
        .map(|s| s.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if enabled {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .event_format(Format::default().json())
                    .fmt_fields(JsonFields::new()),
            )
            .with(filter)
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .try_init()
            .ok();
    };
}

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

// The recorder is process global and can only be installed once, every app
// shares its handle.
fn prometheus_handle() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| Handle::default().0)
        .clone()
}

fn prometheus(app: Router) -> Router {
    let metric_printer = prometheus_handle();
    app.route(
        "/metrics/prometheus",
        get(|| async move { metric_printer.render() }),
    )
    .layer(PrometheusMetricLayer::new())
}
