use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 一次目标截取请求：时间点、裁剪区域和用于命名的尺寸
///
/// 由上游的目标检测阶段生成，构建后不可修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    /// 传给 `-ss` 的时间点，秒数或 `HH:MM:SS.ms`
    timestamp: String,
    /// ffmpeg crop 参数 `w:h:x:y`
    bounding_box: String,
    size: f64,
}

impl FrameDescriptor {
    pub fn new(timestamp: impl Into<String>, bounding_box: impl Into<String>, size: f64) -> Self {
        Self {
            timestamp: timestamp.into(),
            bounding_box: bounding_box.into(),
            size,
        }
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn bounding_box(&self) -> &str {
        &self.bounding_box
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    /// 输出文件名，批量截取时带序号
    pub fn output_name(&self, sequence: Option<usize>) -> String {
        match sequence {
            Some(seq) => format!("image_{}_{:.6}_{}.png", self.timestamp, self.size, seq),
            None => format!("image_{}_{:.6}.png", self.timestamp, self.size),
        }
    }
}

/// 均匀抽帧得到的一帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledFrame {
    /// 帧编号（从 0 开始）
    pub index: usize,
    /// 时间点（秒）
    pub timestamp: f64,
    /// 输出图片路径
    pub path: PathBuf,
}

/// 数据集构建结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetOutput {
    pub source_bucket: String,
    pub source_key: String,
    pub interval: f64,
    pub output_dir: PathBuf,
    pub frames: Vec<SampledFrame>,
    /// 已上传的对象键，未配置目标 bucket 时为空
    pub uploaded_keys: Vec<String>,
}
