use std::path::PathBuf;
use thiserror::Error;

/// 对象存储访问错误
#[derive(Debug, Error)]
pub enum GatewayError {
    /// 无法构建存储客户端（凭证缺失、HTTP 客户端创建失败等）
    #[error("无法连接对象存储: {0}")]
    Connection(String),

    #[error("对象不存在: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("读取对象失败 {bucket}/{key}: {reason}")]
    Read {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("非法的对象键: {0}")]
    InvalidKey(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("临时文件回到起始位置失败 {}: {source}", .path.display())]
    Seek {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GatewayError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        GatewayError::Io {
            context: context.into(),
            source,
        }
    }
}

/// 外部媒体工具调用错误
#[derive(Debug, Error)]
pub enum MediaError {
    /// 探测工具退出码非零、无法启动或输出无法解析
    #[error("{tool} 探测失败 {}: {reason}", .path.display())]
    Probe {
        tool: String,
        path: PathBuf,
        reason: String,
    },

    #[error("{tool} 执行失败 (参数: {}): {output}", .args.join(" "))]
    Extraction {
        tool: String,
        args: Vec<String>,
        output: String,
    },

    #[error("抽帧失败: 文件 {}, 时间点 {timestamp} 秒", .input.display())]
    Sampling {
        input: PathBuf,
        timestamp: f64,
        #[source]
        source: Box<MediaError>,
    },

    #[error("第 {sequence} 个目标截取失败 (时间点 {timestamp}, 区域 {bounding_box})")]
    Region {
        sequence: usize,
        timestamp: String,
        bounding_box: String,
        #[source]
        source: Box<MediaError>,
    },

    #[error("抽帧间隔必须为正数: {0}")]
    InvalidInterval(f64),

    #[error("抽帧数量超出上限: 时长 {duration} 秒, 间隔 {interval} 秒")]
    TooManyFrames { duration: f64, interval: f64 },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

pub type GatewayResult<T> = Result<T, GatewayError>;
pub type MediaResult<T> = Result<T, MediaError>;
