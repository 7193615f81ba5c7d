use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the zplcast binary.
#[derive(Debug, Parser)]
#[command(name = "zplcast", version, about = "ZPL label render and broadcast server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "ZPLCAST_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP, stream and viewer listeners.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Override the rendering service endpoint.
    #[arg(long = "render-endpoint", value_name = "URL")]
    pub endpoint: Option<String>,

    /// Override the requested output format (png|pdf).
    #[arg(long = "render-output-format", value_name = "FORMAT")]
    pub output_format: Option<String>,

    /// Override the rendering service timeout.
    #[arg(long = "render-timeout-seconds", value_name = "SECONDS")]
    pub timeout_seconds: Option<u64>,

    /// Override the page rasterizer executable used for PDF output.
    #[arg(long = "render-rasterizer-path", value_name = "PATH")]
    pub rasterizer_path: Option<PathBuf>,

    /// Override the directory that holds per-render scratch files.
    #[arg(long = "render-scratch-dir", value_name = "PATH")]
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub render: RenderOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the HTTP listener port.
    #[arg(long = "server-http-port", value_name = "PORT")]
    pub http_port: Option<u16>,

    /// Override the raw stream listener port.
    #[arg(long = "server-stream-port", value_name = "PORT")]
    pub stream_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the maximum HTTP upload size in bytes.
    #[arg(long = "ingest-max-body-bytes", value_name = "BYTES")]
    pub ingest_max_body_bytes: Option<u64>,

    /// Override the number of events buffered per viewer.
    #[arg(long = "broadcast-viewer-buffer", value_name = "COUNT")]
    pub broadcast_viewer_buffer: Option<u64>,
}
