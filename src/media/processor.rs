use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tokio::fs;
use tracing::{info, debug, warn};

use crate::config::MediaConfig;
use crate::error::{Result, CompressifyError};
use super::{CompressionInvoker, CompressionOutcome, CompressionRequest, MediaCommandBuilder, MediaKind};

/// ffmpeg-backed implementation of the compression invoker
pub struct FfmpegInvoker {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl FfmpegInvoker {
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.binary_path);

        Self {
            config,
            command_builder,
        }
    }

    fn timeout(&self) -> Option<Duration> {
        self.config.timeout_secs.map(Duration::from_secs)
    }
}

/// Hidden sibling the encoder writes to before the final rename
pub fn partial_output_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let tag = uuid::Uuid::new_v4().simple().to_string();
    destination.with_file_name(format!(".{}.{}.partial", name, &tag[..8]))
}

#[async_trait]
impl CompressionInvoker for FfmpegInvoker {
    async fn compress(&self, request: &CompressionRequest) -> Result<CompressionOutcome> {
        let source = request.source.as_path();
        let destination = request.destination.as_path();

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        let partial = partial_output_path(destination);
        let command = match request.kind {
            MediaKind::Video => self.command_builder.compress_video(
                source,
                partial.as_path(),
                &request.params.video,
                &self.config.extra_video_options,
            ),
            MediaKind::Image => {
                self.command_builder
                    .compress_image(source, partial.as_path(), &request.params.image)
            }
        };

        info!("Compressing {} -> {}", source.display(), destination.display());

        if let Err(e) = command.execute(self.timeout()).await {
            if let Err(cleanup) = fs::remove_file(&partial).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove partial output {}: {}", partial.display(), cleanup);
                }
            }
            return Err(e);
        }

        fs::rename(&partial, destination).await?;
        let output_size = fs::metadata(destination).await?.len();

        debug!("Wrote {} ({} bytes)", destination.display(), output_size);
        Ok(CompressionOutcome {
            output_path: destination.to_path_buf(),
            output_size,
        })
    }

    fn check_availability(&self) -> Result<()> {
        let output = Command::new(&self.config.binary_path)
            .arg("-version")
            .output()
            .map_err(|e| CompressifyError::ExternalTool(format!("ffmpeg not found: {}", e)))?;

        if output.status.success() {
            info!("ffmpeg is available");
            Ok(())
        } else {
            Err(CompressifyError::ExternalTool("ffmpeg version check failed".to_string()))
        }
    }

    async fn get_version_info(&self) -> Result<String> {
        debug!("Getting ffmpeg version information");

        let version_check = self.command_builder.version_check();
        let output = tokio::process::Command::new(&version_check.binary_path)
            .args(&version_check.args)
            .output()
            .await
            .map_err(|e| CompressifyError::ExternalTool(format!("Failed to execute ffmpeg: {}", e)))?;

        if output.status.success() {
            let version_info = String::from_utf8_lossy(&output.stdout);
            // First line carries the version
            let first_line = version_info.lines().next().unwrap_or("Unknown version");
            Ok(first_line.to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(CompressifyError::ExternalTool(format!("ffmpeg version check failed: {}", stderr)))
        }
    }
}
