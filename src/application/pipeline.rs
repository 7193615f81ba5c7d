//! The single path from an ingested document to a viewer event.
//!
//! Ingestion endpoints hand documents to [`PipelineCoordinator::submit`] and
//! never see rendering internals. Every render failure is translated into an
//! `error` event here; nothing propagates past `submit`.

use std::{fmt, sync::Arc};

use metrics::counter;
use tracing::{debug, info, warn};
use zplcast_events::ViewerEvent;

use crate::{
    application::{
        broadcast::EventPublisher,
        render::{RenderFailure, RenderGateway, RenderResult},
    },
    domain::document::{Document, is_blank},
    infra::telemetry::{METRIC_DOCUMENTS_RECEIVED, METRIC_RENDER_TOTAL},
};

/// Where a document came from, for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Http,
    Stream,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Http => "http",
            Channel::Stream => "stream",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one submission. Exactly one event was published unless
/// the document was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Rendered { images: usize, viewers: usize },
    Failed { failure: RenderFailure, viewers: usize },
    Rejected,
}

#[derive(Clone)]
pub struct PipelineCoordinator {
    gateway: Arc<dyn RenderGateway>,
    publisher: Arc<dyn EventPublisher>,
}

impl PipelineCoordinator {
    pub fn new(gateway: Arc<dyn RenderGateway>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { gateway, publisher }
    }

    /// Render `document` and broadcast the result or the failure.
    pub async fn submit(&self, document: Document, channel: Channel) -> SubmitOutcome {
        if is_blank(document.as_str()) {
            debug!(
                target = "zplcast::pipeline",
                channel = %channel,
                "blank document dropped before rendering"
            );
            return SubmitOutcome::Rejected;
        }

        counter!(METRIC_DOCUMENTS_RECEIVED, "channel" => channel.as_str()).increment(1);
        info!(
            target = "zplcast::pipeline",
            channel = %channel,
            bytes = document.len(),
            "document received"
        );
        debug!(
            target = "zplcast::pipeline",
            channel = %channel,
            document = %document,
            "document contents"
        );

        match self.gateway.render(&document).await {
            Ok(result) => {
                let images = result.len();
                let viewers = self.publisher.publish(rendered_event(&result));
                counter!(METRIC_RENDER_TOTAL, "outcome" => "rendered").increment(1);
                info!(
                    target = "zplcast::pipeline",
                    channel = %channel,
                    images,
                    viewers,
                    "render broadcast"
                );
                SubmitOutcome::Rendered { images, viewers }
            }
            Err(failure) => {
                let viewers = self.publisher.publish(error_event(&failure));
                counter!(METRIC_RENDER_TOTAL, "outcome" => failure.kind.as_str()).increment(1);
                warn!(
                    target = "zplcast::pipeline",
                    channel = %channel,
                    error_code = failure.kind.as_str(),
                    error = %failure.message,
                    viewers,
                    "render failure broadcast"
                );
                SubmitOutcome::Failed { failure, viewers }
            }
        }
    }
}

fn rendered_event(result: &RenderResult) -> ViewerEvent {
    ViewerEvent::Rendered {
        images: result.images().iter().map(|image| image.to_base64()).collect(),
    }
}

fn error_event(failure: &RenderFailure) -> ViewerEvent {
    ViewerEvent::Error {
        message: failure.message.clone(),
        detail: failure.detail_or_empty().to_string(),
    }
}
