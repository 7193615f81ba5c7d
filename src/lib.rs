//! zplcast: ZPL label ingestion, rendering and live broadcast.
//!
//! Documents arrive over HTTP (`POST /pstprnt`) or a raw TCP print socket,
//! pass through the [`application::pipeline::PipelineCoordinator`] to the
//! render gateway, and the outcome is pushed to every viewer connected to
//! `GET /ws`.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
