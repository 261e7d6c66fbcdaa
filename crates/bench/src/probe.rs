//! Video probing and pixel-format conversion through ffprobe/ffmpeg

use std::path::Path;

use crate::config::ToolsConfig;
use crate::tool::{capture_value, CommandRunner, ToolCommand, ToolError};

/// Geometry and length of a source video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoInfo {
    pub width: u64,
    pub height: u64,
    pub frames: u64,
}

impl VideoInfo {
    /// Total number of pixels across all frames
    pub fn pixels(&self) -> u64 {
        self.width * self.height * self.frames
    }
}

fn stream_entry(tools: &ToolsConfig, entry: &str, path: &Path, count_frames: bool) -> ToolCommand {
    let mut cmd = ToolCommand::new(&tools.ffprobe).args(["-v", "error"]);
    if count_frames {
        cmd = cmd.args(["-count_frames", "-select_streams", "v:0"]);
    }
    cmd.arg("-show_entries")
        .arg(format!("stream={}", entry))
        .args(["-of", "default=noprint_wrappers=1"])
        .arg(path)
}

fn probe_entry<R: CommandRunner + ?Sized>(
    runner: &R,
    tools: &ToolsConfig,
    entry: &str,
    path: &Path,
    count_frames: bool,
) -> Result<u64, ToolError> {
    let cmd = stream_entry(tools, entry, path, count_frames);
    let value = capture_value(runner, &cmd, &format!("{}=", entry))?;
    Ok(value as u64)
}

/// Probe width, height and decoded frame count of `path`
pub fn probe_video<R: CommandRunner + ?Sized>(
    runner: &R,
    tools: &ToolsConfig,
    path: &Path,
) -> Result<VideoInfo, ToolError> {
    Ok(VideoInfo {
        width: probe_entry(runner, tools, "width", path, false)?,
        height: probe_entry(runner, tools, "height", path, false)?,
        frames: probe_entry(runner, tools, "nb_read_frames", path, true)?,
    })
}

/// Convert `input` to the reference pixel format, container chosen by `output`'s extension
pub fn convert_video<R: CommandRunner + ?Sized>(
    runner: &R,
    tools: &ToolsConfig,
    input: &Path,
    output: &Path,
) -> Result<(), ToolError> {
    let cmd = ToolCommand::new(&tools.ffmpeg)
        .args(["-y", "-i"])
        .arg(input)
        .args(["-pix_fmt", tools.reference_pix_fmt.as_str(), "-strict", "-1"])
        .arg(output);
    runner.run(&cmd)
}
