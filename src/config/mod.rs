//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{CliArgs, Command, RenderOverrides, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "zplcast";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_HTTP_PORT: u16 = 5001;
const DEFAULT_STREAM_PORT: u16 = 9100;
const DEFAULT_INGEST_MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_VIEWER_BUFFER: u64 = 32;
pub(crate) const DEFAULT_RENDER_ENDPOINT: &str =
    "http://api.labelary.com/v1/printers/8dpmm/labels/4x6/0/";
pub(crate) const DEFAULT_RASTERIZER_PATH: &str = "pdftoppm";
/// 8 dots/mm, the native density of the default printer profile.
pub(crate) const DEFAULT_RASTER_DPI: u32 = 203;
/// A 4x6 inch label at [`DEFAULT_RASTER_DPI`].
pub(crate) const DEFAULT_RASTER_WIDTH_PX: u32 = 812;
pub(crate) const DEFAULT_RASTER_HEIGHT_PX: u32 = 1218;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub render: RenderSettings,
    pub ingest: IngestSettings,
    pub broadcast: BroadcastSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub http_addr: SocketAddr,
    pub stream_addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Output requested from the rendering service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One PNG per request.
    Png,
    /// One PDF holding every label; rasterized locally page by page.
    Pdf,
}

impl OutputFormat {
    pub fn accept_header(self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Pdf => "application/pdf",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "pdf" => Ok(OutputFormat::Pdf),
            other => Err(format!("unsupported output format `{other}` (expected png|pdf)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub endpoint: Url,
    pub output_format: OutputFormat,
    pub timeout: Option<Duration>,
    pub rasterizer_path: PathBuf,
    pub scratch_dir: PathBuf,
    pub dpi: NonZeroU32,
    pub width_px: NonZeroU32,
    pub height_px: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub max_body_bytes: NonZeroU64,
}

#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    pub viewer_buffer: NonZeroUsize,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("ZPLCAST").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    render: RawRenderSettings,
    ingest: RawIngestSettings,
    broadcast: RawBroadcastSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.http_port {
            self.server.http_port = Some(port);
        }
        if let Some(port) = overrides.stream_port {
            self.server.stream_port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(limit) = overrides.ingest_max_body_bytes {
            self.ingest.max_body_bytes = Some(limit);
        }
        if let Some(buffer) = overrides.broadcast_viewer_buffer {
            self.broadcast.viewer_buffer = Some(buffer);
        }

        self.apply_render_overrides(&overrides.render);
    }

    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(endpoint) = overrides.endpoint.as_ref() {
            self.render.endpoint = Some(endpoint.clone());
        }
        if let Some(format) = overrides.output_format.as_ref() {
            self.render.output_format = Some(format.clone());
        }
        if let Some(seconds) = overrides.timeout_seconds {
            self.render.timeout_seconds = Some(seconds);
        }
        if let Some(path) = overrides.rasterizer_path.as_ref() {
            self.render.rasterizer_path = Some(path.clone());
        }
        if let Some(dir) = overrides.scratch_dir.as_ref() {
            self.render.scratch_dir = Some(dir.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            render,
            ingest,
            broadcast,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            render: build_render_settings(render)?,
            ingest: build_ingest_settings(ingest)?,
            broadcast: build_broadcast_settings(broadcast)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let http_port = server.http_port.unwrap_or(DEFAULT_HTTP_PORT);
    if http_port == 0 {
        return Err(LoadError::invalid(
            "server.http_port",
            "port must be greater than zero",
        ));
    }

    let stream_port = server.stream_port.unwrap_or(DEFAULT_STREAM_PORT);
    if stream_port == 0 {
        return Err(LoadError::invalid(
            "server.stream_port",
            "port must be greater than zero",
        ));
    }
    if stream_port == http_port {
        return Err(LoadError::invalid(
            "server.stream_port",
            format!("must differ from server.http_port ({http_port})"),
        ));
    }

    let http_addr = parse_socket_addr(&host, http_port)
        .map_err(|reason| LoadError::invalid("server.http_addr", reason))?;
    let stream_addr = parse_socket_addr(&host, stream_port)
        .map_err(|reason| LoadError::invalid("server.stream_addr", reason))?;

    Ok(ServerSettings {
        http_addr,
        stream_addr,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let endpoint_value = render
        .endpoint
        .unwrap_or_else(|| DEFAULT_RENDER_ENDPOINT.to_string());
    let endpoint = Url::parse(endpoint_value.trim())
        .map_err(|err| LoadError::invalid("render.endpoint", format!("invalid URL: {err}")))?;
    if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "render.endpoint",
            format!("unsupported scheme `{}`", endpoint.scheme()),
        ));
    }

    let output_format = match render.output_format {
        Some(value) => OutputFormat::from_str(&value)
            .map_err(|reason| LoadError::invalid("render.output_format", reason))?,
        None => OutputFormat::Png,
    };

    let timeout = match render.timeout_seconds {
        Some(0) => {
            return Err(LoadError::invalid(
                "render.timeout_seconds",
                "must be greater than zero",
            ));
        }
        Some(seconds) => Some(Duration::from_secs(seconds)),
        None => None,
    };

    let rasterizer_path = render
        .rasterizer_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RASTERIZER_PATH));
    if rasterizer_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.rasterizer_path",
            "path must not be empty",
        ));
    }

    let scratch_dir = render.scratch_dir.unwrap_or_else(std::env::temp_dir);
    if scratch_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.scratch_dir",
            "path must not be empty",
        ));
    }

    Ok(RenderSettings {
        endpoint,
        output_format,
        timeout,
        rasterizer_path,
        scratch_dir,
        dpi: non_zero_u32(render.dpi.unwrap_or(DEFAULT_RASTER_DPI.into()), "render.dpi")?,
        width_px: non_zero_u32(
            render.width_px.unwrap_or(DEFAULT_RASTER_WIDTH_PX.into()),
            "render.width_px",
        )?,
        height_px: non_zero_u32(
            render.height_px.unwrap_or(DEFAULT_RASTER_HEIGHT_PX.into()),
            "render.height_px",
        )?,
    })
}

fn build_ingest_settings(ingest: RawIngestSettings) -> Result<IngestSettings, LoadError> {
    let max_body_bytes_value = ingest
        .max_body_bytes
        .unwrap_or(DEFAULT_INGEST_MAX_BODY_BYTES);
    let max_body_bytes = NonZeroU64::new(max_body_bytes_value)
        .ok_or_else(|| LoadError::invalid("ingest.max_body_bytes", "must be greater than zero"))?;
    usize::try_from(max_body_bytes_value).map_err(|_| {
        LoadError::invalid(
            "ingest.max_body_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(IngestSettings { max_body_bytes })
}

fn build_broadcast_settings(
    broadcast: RawBroadcastSettings,
) -> Result<BroadcastSettings, LoadError> {
    let buffer = broadcast.viewer_buffer.unwrap_or(DEFAULT_VIEWER_BUFFER);
    let buffer = usize::try_from(buffer).map_err(|_| {
        LoadError::invalid(
            "broadcast.viewer_buffer",
            "value exceeds supported range for usize",
        )
    })?;
    let viewer_buffer = NonZeroUsize::new(buffer).ok_or_else(|| {
        LoadError::invalid("broadcast.viewer_buffer", "must be greater than zero")
    })?;

    Ok(BroadcastSettings { viewer_buffer })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    http_port: Option<u16>,
    stream_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    endpoint: Option<String>,
    output_format: Option<String>,
    timeout_seconds: Option<u64>,
    rasterizer_path: Option<PathBuf>,
    scratch_dir: Option<PathBuf>,
    dpi: Option<u64>,
    width_px: Option<u64>,
    height_px: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIngestSettings {
    max_body_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBroadcastSettings {
    viewer_buffer: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
