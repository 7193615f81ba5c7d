//! Render gateway: turns label documents into raster images.
//!
//! The gateway is a leaf: it knows nothing about ingestion or viewers. It
//! accepts a validated [`Document`](crate::domain::document::Document),
//! produces an ordered, non-empty [`RenderResult`] and reports every problem as
//! a structured [`RenderFailure`]. Callers decide what to do with failures;
//! nothing here retries.

mod gateway;
mod rasterize;
mod types;

pub use gateway::{GatewayConfig, GatewayConfigError, LabelaryGateway};
pub use rasterize::{PageRasterizer, RasterGeometry};
pub use types::{
    CONVERSION_FAILED_MESSAGE, RasterImage, RenderFailure, RenderFailureKind, RenderGateway,
    RenderResult,
};
