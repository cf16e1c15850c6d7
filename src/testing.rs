//! 测试用的命令执行器

use std::collections::HashSet;
use std::sync::Mutex;

use crate::media_shell::{CommandOutput, CommandRunner};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
}

/// 记录所有调用并返回预设输出，不启动任何子进程
#[derive(Debug, Default)]
pub struct FakeRunner {
    duration_millis: String,
    dimensions: String,
    failing_programs: HashSet<String>,
    fail_ffmpeg_at: Option<usize>,
    write_outputs: bool,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self {
            duration_millis: "0".to_string(),
            dimensions: "1920x1080".to_string(),
            ..Default::default()
        }
    }

    pub fn with_duration_millis(mut self, output: &str) -> Self {
        self.duration_millis = output.to_string();
        self
    }

    pub fn with_dimensions(mut self, output: &str) -> Self {
        self.dimensions = output.to_string();
        self
    }

    pub fn fail_program(mut self, program: &str) -> Self {
        self.failing_programs.insert(program.to_string());
        self
    }

    /// 第 n 次（从 1 开始）调用 ffmpeg 时失败
    pub fn fail_ffmpeg_at_call(mut self, n: usize) -> Self {
        self.fail_ffmpeg_at = Some(n);
        self
    }

    /// ffmpeg 调用成功时在最后一个参数路径写入假图片
    pub fn writing_outputs(mut self) -> Self {
        self.write_outputs = true;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program)
            .collect()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        let ffmpeg_calls = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(RecordedCall {
                program: program.to_string(),
                args: args.to_vec(),
            });
            calls.iter().filter(|c| c.program == "ffmpeg").count()
        };

        let failed = self.failing_programs.contains(program)
            || (program == "ffmpeg" && self.fail_ffmpeg_at == Some(ffmpeg_calls));
        if failed {
            return Ok(CommandOutput {
                success: false,
                code: Some(1),
                stdout: String::new(),
                stderr: format!("{} failed", program),
            });
        }

        let stdout = match program {
            "mediainfo" => format!("{}\n", self.duration_millis),
            "ffprobe" => format!("{}\n", self.dimensions),
            "ffmpeg" => {
                if self.write_outputs {
                    if let Some(output) = args.last() {
                        std::fs::write(output, b"\xff\xd8\xff\xd9")?;
                    }
                }
                String::new()
            }
            _ => String::new(),
        };

        Ok(CommandOutput {
            success: true,
            code: Some(0),
            stdout,
            stderr: String::new(),
        })
    }
}
