use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, CompressifyError};
use crate::profile::{ImageFormat, ImageParams, VideoFormat, VideoParams};

/// Maximum stderr tail carried into error messages
const STDERR_TAIL_LINES: usize = 5;

/// Abstract media processing command representation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
    /// First input file, used to name the file in timeout errors
    pub input: Option<PathBuf>,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
            input: None,
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(mut self, path: P) -> Self {
        if self.input.is_none() {
            self.input = Some(path.as_ref().to_path_buf());
        }
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Keep ffmpeg quiet apart from errors
    pub fn quiet(self) -> Self {
        self.arg("-hide_banner").arg("-loglevel").arg("error")
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Add video filter
    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    /// Force the muxer, needed when the output name does not carry the extension
    pub fn format<S: Into<String>>(self, format: S) -> Self {
        self.arg("-f").arg(format)
    }

    /// Execute the command, killing it if `timeout` elapses
    pub async fn execute(&self, timeout: Option<Duration>) -> Result<()> {
        debug!("Executing media processing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let mut cmd = Command::new(&self.binary_path);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.output();
        let output = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child).await {
                Ok(output) => output,
                Err(_) => {
                    return Err(CompressifyError::Timeout {
                        path: self.input.clone().unwrap_or_default(),
                        seconds: limit.as_secs(),
                    });
                }
            },
            None => child.await,
        }
        .map_err(|e| CompressifyError::ExternalTool(format!("Failed to execute {}: {}", self.binary_path, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CompressifyError::ExternalTool(format!(
                "{} failed ({}): {}",
                self.description,
                output.status,
                stderr_tail(&stderr)
            )));
        }

        Ok(())
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

/// Builder for the compression commands
pub struct MediaCommandBuilder {
    binary_path: String,
}

impl MediaCommandBuilder {
    /// Create a new command builder
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Build a video compression command
    pub fn compress_video<P: AsRef<Path>>(
        &self,
        input_path: P,
        output_path: P,
        params: &VideoParams,
        additional_options: &[String],
    ) -> MediaCommand {
        let mut cmd = MediaCommand::new(&self.binary_path, "Video compression")
            .quiet()
            .overwrite()
            .input(&input_path)
            .video_codec(params.codec.as_str())
            .arg("-preset")
            .arg(params.preset.as_str());

        cmd = match &params.bitrate {
            Some(bitrate) => cmd.arg("-b:v").arg(bitrate.as_str()),
            None => cmd.arg("-crf").arg(params.crf.to_string()),
        };

        if let Some(filter) = scale_and_pad_filter(params) {
            cmd = cmd.video_filter(filter);
        }

        cmd = cmd.audio_codec(params.audio_codec.as_str());

        if params.format == VideoFormat::Mp4 {
            cmd = cmd.arg("-movflags").arg("+faststart");
        }

        // Add user-specified additional options
        for option in additional_options {
            cmd = cmd.arg(option);
        }

        cmd.format(video_muxer(params.format)).output(output_path)
    }

    /// Build an image compression command
    pub fn compress_image<P: AsRef<Path>>(
        &self,
        input_path: P,
        output_path: P,
        params: &ImageParams,
    ) -> MediaCommand {
        let mut cmd = MediaCommand::new(&self.binary_path, "Image compression")
            .quiet()
            .overwrite()
            .input(&input_path);

        if let Some(filter) = image_scale_filter(params) {
            cmd = cmd.video_filter(filter);
        }

        // The output is a temp name, so the encoder cannot be guessed from it
        cmd = cmd.video_codec(image_codec(params.format));
        cmd = match params.format {
            ImageFormat::Jpeg => cmd.arg("-q:v").arg(jpeg_qscale(params.quality).to_string()),
            ImageFormat::Webp if params.lossless => cmd.arg("-lossless").arg("1"),
            ImageFormat::Webp => cmd.arg("-quality").arg(params.quality.to_string()),
            ImageFormat::Png => cmd.arg("-compression_level").arg("9"),
            ImageFormat::Avif if params.lossless => cmd.arg("-crf").arg("0"),
            ImageFormat::Avif => cmd.arg("-crf").arg(avif_crf(params.quality).to_string()),
            ImageFormat::Tiff | ImageFormat::Bmp => cmd,
        };

        cmd.arg("-frames:v")
            .arg("1")
            .format(image_muxer(params.format))
            .output(output_path)
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check").arg("-version")
    }
}

/// Scale to fit the target frame, then pad to it, keeping the aspect ratio
fn scale_and_pad_filter(params: &VideoParams) -> Option<String> {
    let (width, height) = params.resolution.dimensions()?;
    Some(format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease:force_divisible_by=2,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black",
        w = width,
        h = height
    ))
}

fn image_scale_filter(params: &ImageParams) -> Option<String> {
    match (params.width, params.height) {
        (None, None) => None,
        (Some(w), None) => Some(format!("scale={}:-1", w)),
        (None, Some(h)) => Some(format!("scale=-1:{}", h)),
        (Some(w), Some(h)) if params.preserve_aspect_ratio => {
            Some(format!("scale={}:{}:force_original_aspect_ratio=decrease", w, h))
        }
        (Some(w), Some(h)) => Some(format!("scale={}:{}", w, h)),
    }
}

/// Map quality 1-100 onto mjpeg qscale 31-2 (lower is better)
fn jpeg_qscale(quality: u8) -> u8 {
    let quality = quality.clamp(1, 100) as u32;
    (31 - (quality - 1) * 29 / 99) as u8
}

/// Map quality 1-100 onto libaom crf 63-0
fn avif_crf(quality: u8) -> u8 {
    let quality = quality.clamp(1, 100) as u32;
    (63 - (quality - 1) * 63 / 99) as u8
}

fn video_muxer(format: VideoFormat) -> &'static str {
    match format {
        VideoFormat::Mp4 => "mp4",
        VideoFormat::Avi => "avi",
        VideoFormat::Mkv => "matroska",
        VideoFormat::Webm => "webm",
        VideoFormat::Mov => "mov",
    }
}

fn image_codec(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "mjpeg",
        ImageFormat::Png => "png",
        ImageFormat::Webp => "libwebp",
        ImageFormat::Avif => "libaom-av1",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Bmp => "bmp",
    }
}

fn image_muxer(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Avif => "avif",
        _ => "image2",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{builtin_profile, VideoResolution};

    #[test]
    fn test_video_command_uses_crf_without_bitrate() {
        let params = builtin_profile("medium").unwrap().resolve().unwrap();
        let cmd = MediaCommandBuilder::new("ffmpeg").compress_video(
            Path::new("in.mov"),
            Path::new("out.mp4"),
            &params.video,
            &["-pix_fmt".to_string(), "yuv420p".to_string()],
        );

        let args = cmd.args.join(" ");
        assert!(args.contains("-i in.mov"));
        assert!(args.contains("-c:v libx264 -preset medium -crf 23"));
        assert!(args.contains("-movflags +faststart"));
        assert!(args.contains("-pix_fmt yuv420p"));
        assert!(!args.contains("-vf"));
        assert_eq!(cmd.args.last().map(String::as_str), Some("out.mp4"));
        assert_eq!(cmd.input, Some(PathBuf::from("in.mov")));
    }

    #[test]
    fn test_video_command_prefers_bitrate_and_scales() {
        let mut params = builtin_profile("medium").unwrap().resolve().unwrap();
        params.video.bitrate = Some("2M".to_string());
        params.video.resolution = VideoResolution::Hd720p;

        let cmd = MediaCommandBuilder::new("ffmpeg").compress_video(
            Path::new("in.mov"),
            Path::new("out.mp4"),
            &params.video,
            &[],
        );
        let args = cmd.args.join(" ");
        assert!(args.contains("-b:v 2M"));
        assert!(!args.contains("-crf"));
        assert!(args.contains("scale=1280:720"));
        assert!(args.contains("pad=1280:720"));
    }

    #[test]
    fn test_image_command_maps_quality() {
        let params = builtin_profile("high").unwrap().resolve().unwrap();
        let cmd = MediaCommandBuilder::new("ffmpeg").compress_image(
            Path::new("in.png"),
            Path::new("out.jpg"),
            &params.image,
        );
        let args = cmd.args.join(" ");
        assert!(args.contains("-c:v mjpeg"));
        assert!(args.contains(&format!("-q:v {}", jpeg_qscale(95))));
        assert!(args.contains("-frames:v 1"));

        // Written to a temp name, so every format names its encoder
        for (format, codec) in [
            (ImageFormat::Png, "png"),
            (ImageFormat::Webp, "libwebp"),
            (ImageFormat::Avif, "libaom-av1"),
            (ImageFormat::Tiff, "tiff"),
            (ImageFormat::Bmp, "bmp"),
        ] {
            let image = ImageParams { format, ..params.image.clone() };
            let cmd = MediaCommandBuilder::new("ffmpeg").compress_image(
                Path::new("in.png"),
                Path::new(".out.1a2b3c4d.partial"),
                &image,
            );
            let args = cmd.args.join(" ");
            assert!(args.contains(&format!("-c:v {}", codec)), "{:?}: {}", format, args);
        }
    }

    #[test]
    fn test_quality_mappings_are_monotonic() {
        assert_eq!(jpeg_qscale(1), 31);
        assert_eq!(jpeg_qscale(100), 2);
        assert!(jpeg_qscale(85) < jpeg_qscale(60));
        assert_eq!(avif_crf(100), 0);
        assert_eq!(avif_crf(1), 63);
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr = "a\nb\n\nc\nd\ne\nf\ng\n";
        assert_eq!(stderr_tail(stderr), "c | d | e | f | g");
    }

    #[tokio::test]
    async fn test_missing_binary_is_external_tool_error() {
        let cmd = MediaCommand::new("compressify-no-such-binary", "Probe").arg("-version");
        let err = cmd.execute(None).await.unwrap_err();
        assert!(matches!(err, CompressifyError::ExternalTool(_)));
    }
}
