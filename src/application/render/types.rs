use std::fmt;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use thiserror::Error;

use crate::domain::document::Document;

/// Message used when a render produced no images at all.
pub const CONVERSION_FAILED_MESSAGE: &str = "conversion failed";

/// One rendered label, PNG encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage(Bytes);

impl RasterImage {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Standard base64 encoding used on the viewer channel.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }
}

/// Ordered, non-empty set of images produced from one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    images: Vec<RasterImage>,
}

impl RenderResult {
    /// Wrap rendered pages; an empty page list is a conversion failure.
    pub fn from_images(images: Vec<RasterImage>) -> Result<Self, RenderFailure> {
        if images.is_empty() {
            return Err(RenderFailure::conversion());
        }
        Ok(Self { images })
    }

    pub fn images(&self) -> &[RasterImage] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFailureKind {
    /// The rendering service was unreachable or answered with an error status.
    UpstreamTransport,
    /// Rendering finished but yielded zero images.
    Conversion,
    /// Anything else; the message is passed through verbatim.
    Unexpected,
}

impl RenderFailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderFailureKind::UpstreamTransport => "upstream_transport",
            RenderFailureKind::Conversion => "conversion",
            RenderFailureKind::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for RenderFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure surfaced by a [`RenderGateway`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RenderFailure {
    pub kind: RenderFailureKind,
    pub message: String,
    pub detail: Option<String>,
}

impl RenderFailure {
    pub fn upstream(message: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            kind: RenderFailureKind::UpstreamTransport,
            message: message.into(),
            detail,
        }
    }

    pub fn conversion() -> Self {
        Self {
            kind: RenderFailureKind::Conversion,
            message: CONVERSION_FAILED_MESSAGE.to_string(),
            detail: None,
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self {
            kind: RenderFailureKind::Unexpected,
            message: message.into(),
            detail: None,
        }
    }

    /// Detail as broadcast to viewers: empty when nothing was captured.
    pub fn detail_or_empty(&self) -> &str {
        self.detail.as_deref().unwrap_or("")
    }
}

/// Converts a label document into raster images.
///
/// Implementations never retry; a failed attempt is reported immediately.
#[async_trait]
pub trait RenderGateway: Send + Sync {
    async fn render(&self, document: &Document) -> Result<RenderResult, RenderFailure>;
}
