use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use metrics::histogram;
use reqwest::{
    Client,
    header::{ACCEPT, CONTENT_TYPE},
};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
    config::{OutputFormat, RenderSettings},
    domain::document::Document,
    infra::telemetry::METRIC_RENDER_MS,
};

use super::{
    rasterize::{PageRasterizer, RasterGeometry},
    types::{RasterImage, RenderFailure, RenderGateway, RenderResult},
};

/// Content type the rendering service expects for raw ZPL bodies.
const ZPL_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Error)]
pub enum GatewayConfigError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Startup configuration for [`LabelaryGateway`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub endpoint: Url,
    pub output_format: OutputFormat,
    pub timeout: Option<Duration>,
    pub rasterizer: PageRasterizer,
}

impl From<&RenderSettings> for GatewayConfig {
    fn from(settings: &RenderSettings) -> Self {
        let geometry = RasterGeometry {
            dpi: settings.dpi,
            width_px: settings.width_px,
            height_px: settings.height_px,
        };
        Self {
            endpoint: settings.endpoint.clone(),
            output_format: settings.output_format,
            timeout: settings.timeout,
            rasterizer: PageRasterizer::new(
                settings.rasterizer_path.clone(),
                settings.scratch_dir.clone(),
                geometry,
            ),
        }
    }
}

/// Render gateway backed by a Labelary-compatible HTTP rendering service.
#[derive(Debug, Clone)]
pub struct LabelaryGateway {
    client: Client,
    endpoint: Url,
    output_format: OutputFormat,
    rasterizer: PageRasterizer,
}

impl LabelaryGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayConfigError> {
        let mut builder = Client::builder().user_agent(user_agent());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            endpoint: config.endpoint,
            output_format: config.output_format,
            rasterizer: config.rasterizer,
        })
    }

    async fn fetch(&self, document: &Document) -> Result<Bytes, RenderFailure> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(ACCEPT, self.output_format.accept_header())
            .header(CONTENT_TYPE, ZPL_CONTENT_TYPE)
            .body(document.as_str().to_owned())
            .send()
            .await
            .map_err(|err| {
                RenderFailure::upstream(
                    format!("failed to contact rendering service: {err}"),
                    None,
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .bytes()
                .await
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or_default();
            let detail = (!body.trim().is_empty()).then_some(body);
            return Err(RenderFailure::upstream(
                format!("rendering service returned {status}"),
                detail,
            ));
        }

        response.bytes().await.map_err(|err| {
            RenderFailure::upstream(
                format!("failed to read rendering service response: {err}"),
                None,
            )
        })
    }

    async fn convert(&self, body: Bytes) -> Result<RenderResult, RenderFailure> {
        let images = match self.output_format {
            OutputFormat::Png if body.is_empty() => Vec::new(),
            OutputFormat::Png => vec![RasterImage::new(body)],
            OutputFormat::Pdf => self
                .rasterizer
                .rasterize(&body)
                .await
                .map_err(|err| RenderFailure::unexpected(err.to_string()))?,
        };
        RenderResult::from_images(images)
    }
}

#[async_trait]
impl RenderGateway for LabelaryGateway {
    async fn render(&self, document: &Document) -> Result<RenderResult, RenderFailure> {
        let started_at = Instant::now();
        let result = match self.fetch(document).await {
            Ok(body) => self.convert(body).await,
            Err(failure) => Err(failure),
        };

        let elapsed = started_at.elapsed();
        histogram!(METRIC_RENDER_MS).record(elapsed.as_secs_f64() * 1000.0);

        match &result {
            Ok(rendered) => info!(
                target = "application::render::gateway",
                op = "gateway::render",
                result = "ok",
                elapsed_ms = elapsed.as_millis() as u64,
                format = self.output_format.accept_header(),
                images = rendered.len(),
                "Document rendered"
            ),
            Err(failure) => warn!(
                target = "application::render::gateway",
                op = "gateway::render",
                result = "error",
                elapsed_ms = elapsed.as_millis() as u64,
                format = self.output_format.accept_header(),
                error_code = failure.kind.as_str(),
                error = %failure.message,
                detail = failure.detail_or_empty(),
                "Document rendering failed"
            ),
        }

        result
    }
}

fn user_agent() -> &'static str {
    concat!("zplcast/", env!("CARGO_PKG_VERSION"))
}
