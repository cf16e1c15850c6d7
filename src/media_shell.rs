use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};
use crate::metadata::FrameDescriptor;

/// 外部命令的执行结果
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// 执行外部命令
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput>;
}

/// 通过 `std::process::Command` 执行，阻塞直到子进程退出
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// 外部工具的可执行文件路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub mediainfo: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            mediainfo: "mediainfo".to_string(),
        }
    }
}

/// 媒体工具适配器：探测时长/分辨率、抽取单帧、截取目标区域
pub struct MediaShell<R = SystemRunner> {
    runner: R,
    tools: ToolPaths,
}

impl MediaShell<SystemRunner> {
    pub fn new(tools: ToolPaths) -> Self {
        Self::with_runner(SystemRunner, tools)
    }
}

impl<R: CommandRunner> MediaShell<R> {
    pub fn with_runner(runner: R, tools: ToolPaths) -> Self {
        Self { runner, tools }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    /// 视频总时长（秒），由 mediainfo 输出的毫秒数换算
    pub fn probe_duration(&self, path: impl AsRef<Path>) -> MediaResult<f64> {
        let path = path.as_ref();
        let tool = &self.tools.mediainfo;
        let args = vec![
            "--Inform=General;%Duration%".to_string(),
            path_arg(path),
        ];

        let output = self.probe(tool, &args, path)?;
        let seconds = parse_duration_millis(&output.stdout)
            .map_err(|reason| probe_error(tool, path, reason))?;

        debug!(duration = seconds, "视频时长: {}", path.display());
        Ok(seconds)
    }

    /// 第一条视频流的分辨率 (宽, 高)
    pub fn probe_dimensions(&self, path: impl AsRef<Path>) -> MediaResult<(u32, u32)> {
        let path = path.as_ref();
        let tool = &self.tools.ffprobe;
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-select_streams".to_string(),
            "v:0".to_string(),
            "-show_entries".to_string(),
            "stream=width,height".to_string(),
            "-of".to_string(),
            "csv=s=x:p=0".to_string(),
            path_arg(path),
        ];

        let output = self.probe(tool, &args, path)?;
        let (width, height) = parse_dimensions(&output.stdout)
            .map_err(|reason| probe_error(tool, path, reason))?;

        info!(width, height, "视频分辨率: {}", path.display());
        Ok((width, height))
    }

    /// 在 `timestamp` 秒处抽取一帧，写入 `output_dir/frame_<frame_index>.jpg`
    pub fn extract_frame(
        &self,
        output_dir: impl AsRef<Path>,
        input: impl AsRef<Path>,
        frame_index: usize,
        timestamp: f64,
    ) -> MediaResult<PathBuf> {
        let output_file = output_dir.as_ref().join(format!("frame_{}.jpg", frame_index));
        let args = vec![
            "-ss".to_string(),
            timestamp.to_string(),
            "-i".to_string(),
            path_arg(input.as_ref()),
            "-frames:v".to_string(),
            "1".to_string(),
            path_arg(&output_file),
        ];

        self.transcode(&args)?;
        debug!(frame_index, timestamp, "已抽取帧: {}", output_file.display());
        Ok(output_file)
    }

    /// 按描述截取一个目标区域，输出 `image_<时间点>_<尺寸>.png`
    pub fn extract_region(
        &self,
        input: impl AsRef<Path>,
        descriptor: &FrameDescriptor,
        output_dir: impl AsRef<Path>,
    ) -> MediaResult<PathBuf> {
        let output_file = output_dir.as_ref().join(descriptor.output_name(None));
        self.crop(input.as_ref(), descriptor, &output_file)?;
        Ok(output_file)
    }

    /// 按输入顺序截取多个目标区域，输出文件名带从 1 开始的序号
    ///
    /// 遇到第一个失败即停止，错误中带有失败目标的序号。
    pub fn extract_regions(
        &self,
        input: impl AsRef<Path>,
        descriptors: &[FrameDescriptor],
        output_dir: impl AsRef<Path>,
    ) -> MediaResult<Vec<PathBuf>> {
        let input = input.as_ref();
        let output_dir = output_dir.as_ref();
        let mut outputs = Vec::with_capacity(descriptors.len());

        for (i, descriptor) in descriptors.iter().enumerate() {
            let sequence = i + 1;
            let output_file = output_dir.join(descriptor.output_name(Some(sequence)));

            self.crop(input, descriptor, &output_file)
                .map_err(|e| MediaError::Region {
                    sequence,
                    timestamp: descriptor.timestamp().to_string(),
                    bounding_box: descriptor.bounding_box().to_string(),
                    source: Box::new(e),
                })?;
            outputs.push(output_file);
        }

        Ok(outputs)
    }

    fn crop(
        &self,
        input: &Path,
        descriptor: &FrameDescriptor,
        output_file: &Path,
    ) -> MediaResult<()> {
        let args = vec![
            "-ss".to_string(),
            descriptor.timestamp().to_string(),
            "-i".to_string(),
            path_arg(input),
            "-frames:v".to_string(),
            "1".to_string(),
            "-filter:v".to_string(),
            format!("crop={}", descriptor.bounding_box()),
            path_arg(output_file),
        ];

        self.transcode(&args)?;
        info!(
            timestamp = descriptor.timestamp(),
            bounding_box = descriptor.bounding_box(),
            "已截取目标区域: {}",
            output_file.display()
        );
        Ok(())
    }

    fn probe(&self, tool: &str, args: &[String], path: &Path) -> MediaResult<CommandOutput> {
        debug!("执行 {} {}", tool, args.join(" "));

        let output = self
            .runner
            .run(tool, args)
            .map_err(|e| probe_error(tool, path, format!("无法启动: {}", e)))?;

        if !output.success {
            return Err(probe_error(
                tool,
                path,
                format!("退出码 {:?}: {}", output.code, output.stderr.trim()),
            ));
        }
        Ok(output)
    }

    fn transcode(&self, args: &[String]) -> MediaResult<()> {
        let tool = &self.tools.ffmpeg;
        debug!("执行 {} {}", tool, args.join(" "));

        let extraction_error = |output: String| MediaError::Extraction {
            tool: tool.clone(),
            args: args.to_vec(),
            output,
        };

        let output = self
            .runner
            .run(tool, args)
            .map_err(|e| extraction_error(format!("无法启动: {}", e)))?;

        if !output.success {
            return Err(extraction_error(format!(
                "退出码 {:?}: {}",
                output.code,
                output.stderr.trim()
            )));
        }
        Ok(())
    }
}

/// 解析 mediainfo 输出的毫秒整数，返回秒
pub fn parse_duration_millis(raw: &str) -> Result<f64, String> {
    let trimmed = raw.trim();
    let millis: i64 = trimmed
        .parse()
        .map_err(|_| format!("无法解析时长: {:?}", trimmed))?;
    if millis < 0 {
        return Err(format!("时长不能为负数: {}", millis));
    }
    Ok(millis as f64 / 1000.0)
}

/// 解析 ffprobe 输出的 `宽x高`
pub fn parse_dimensions(raw: &str) -> Result<(u32, u32), String> {
    let trimmed = raw.trim();
    let (width, height) = trimmed
        .split_once('x')
        .ok_or_else(|| format!("分辨率格式错误: {:?}", trimmed))?;

    let width = width
        .trim()
        .parse()
        .map_err(|_| format!("无法解析宽度: {:?}", trimmed))?;
    let height = height
        .trim()
        .parse()
        .map_err(|_| format!("无法解析高度: {:?}", trimmed))?;

    Ok((width, height))
}

fn probe_error(tool: &str, path: &Path, reason: String) -> MediaError {
    MediaError::Probe {
        tool: tool.to_string(),
        path: path.to_path_buf(),
        reason,
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
