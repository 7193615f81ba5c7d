use std::{
    io::{self, ErrorKind},
    num::NonZeroU32,
    path::{Path, PathBuf},
    process::Stdio,
    time::Instant,
};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use super::types::RasterImage;

const SCRATCH_PREFIX: &str = "zplcast-";
const INPUT_FILE_NAME: &str = "labels.pdf";
const PAGE_PREFIX: &str = "page";

#[derive(Debug, Error)]
pub(crate) enum RasterizeError {
    #[error("failed to create scratch directory: {0}")]
    Scratch(io::Error),
    #[error("failed to write scratch file: {0}")]
    Io(io::Error),
    #[error("page rasterizer unavailable: {0}")]
    NotFound(io::Error),
    #[error("page rasterizer failed (exit {exit_code:?}): {stderr}")]
    Cli {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("failed to read rasterized page: {0}")]
    Read(io::Error),
}

/// Fixed raster geometry applied to every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterGeometry {
    pub dpi: NonZeroU32,
    pub width_px: NonZeroU32,
    pub height_px: NonZeroU32,
}

/// Turns a multi-page PDF into one PNG per page with an external
/// `pdftoppm`-compatible executable.
#[derive(Debug, Clone)]
pub struct PageRasterizer {
    cli_path: PathBuf,
    scratch_root: PathBuf,
    geometry: RasterGeometry,
}

impl PageRasterizer {
    pub fn new(cli_path: PathBuf, scratch_root: PathBuf, geometry: RasterGeometry) -> Self {
        Self {
            cli_path,
            scratch_root,
            geometry,
        }
    }

    /// Rasterize every page of `pdf`, preserving page order.
    ///
    /// All intermediate files live in a uniquely named directory under the
    /// scratch root which is removed before this returns, on every path.
    pub(crate) async fn rasterize(&self, pdf: &[u8]) -> Result<Vec<RasterImage>, RasterizeError> {
        let started_at = Instant::now();
        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&self.scratch_root)
            .map_err(RasterizeError::Scratch)?;

        let result = self.rasterize_in(scratch.path(), pdf).await;

        let scratch_path = scratch.path().to_path_buf();
        if let Err(err) = scratch.close() {
            warn!(
                target = "application::render::rasterize",
                op = "rasterize::cleanup",
                scratch = %scratch_path.display(),
                error = %err,
                "Failed to remove scratch directory"
            );
        }

        match &result {
            Ok(pages) => debug!(
                target = "application::render::rasterize",
                op = "rasterize::pages",
                result = "ok",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                pages = pages.len(),
                "PDF rasterized"
            ),
            Err(err) => warn!(
                target = "application::render::rasterize",
                op = "rasterize::pages",
                result = "error",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                error = %err,
                "PDF rasterization failed"
            ),
        }

        result
    }

    async fn rasterize_in(&self, dir: &Path, pdf: &[u8]) -> Result<Vec<RasterImage>, RasterizeError> {
        let input_path = dir.join(INPUT_FILE_NAME);
        tokio::fs::write(&input_path, pdf)
            .await
            .map_err(RasterizeError::Io)?;

        let output_prefix = dir.join(PAGE_PREFIX);
        let output = Command::new(&self.cli_path)
            .arg("-png")
            .arg("-r")
            .arg(self.geometry.dpi.to_string())
            .arg("-scale-to-x")
            .arg(self.geometry.width_px.to_string())
            .arg("-scale-to-y")
            .arg(self.geometry.height_px.to_string())
            .arg(&input_path)
            .arg(&output_prefix)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| {
                if err.kind() == ErrorKind::NotFound {
                    RasterizeError::NotFound(err)
                } else {
                    RasterizeError::Io(err)
                }
            })?;

        if !output.status.success() {
            return Err(RasterizeError::Cli {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let mut pages = collect_page_files(dir)
            .await
            .map_err(RasterizeError::Read)?;
        pages.sort_by_key(|(number, _)| *number);

        let mut images = Vec::with_capacity(pages.len());
        for (_, path) in pages {
            let bytes = tokio::fs::read(&path).await.map_err(RasterizeError::Read)?;
            images.push(RasterImage::new(bytes));
        }
        Ok(images)
    }
}

async fn collect_page_files(dir: &Path) -> io::Result<Vec<(u32, PathBuf)>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut pages = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if let Some(number) = name.to_str().and_then(page_number) {
            pages.push((number, entry.path()));
        }
    }
    Ok(pages)
}

/// Page number encoded in a rasterizer output name such as `page-07.png`.
fn page_number(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix(PAGE_PREFIX)?
        .strip_prefix('-')?
        .strip_suffix(".png")?
        .parse()
        .ok()
}
