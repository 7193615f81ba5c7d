//! Application services: rendering, framing, fan-out and the pipeline joining them.

pub mod assembler;
pub mod broadcast;
pub mod error;
pub mod pipeline;
pub mod render;
