use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

use crate::media_shell::ToolPaths;

/// 默认抽帧间隔（秒）
pub const DEFAULT_INTERVAL: f64 = 1.0;
/// 默认上传前缀
pub const DEFAULT_DESTINATION_PREFIX: &str = "frames";

const CONFIG_FILE_NAME: &str = "frame-dataset.ini";
const HIDDEN_CONFIG_FILE_NAME: &str = ".frame-dataset.ini";

/// 运行配置
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetConfig {
    /// 抽帧间隔（秒）
    pub interval: f64,
    /// 输出路径（可选，未设置时使用临时目录）
    pub output_path: Option<PathBuf>,
    pub tools: ToolPaths,
    /// OSS endpoint（可选，未设置时使用默认 endpoint）
    pub oss_endpoint: Option<String>,
    /// 目标 OSS Bucket
    pub destination_bucket: Option<String>,
    /// 目标 OSS 路径前缀
    pub destination_prefix: String,
    /// 日志级别（trace, debug, info, warn, error）
    pub log_level: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            output_path: None,
            tools: ToolPaths::default(),
            oss_endpoint: None,
            destination_bucket: None,
            destination_prefix: DEFAULT_DESTINATION_PREFIX.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl DatasetConfig {
    /// 输出目录，未配置时使用临时目录下以本次运行标识命名的子目录
    pub fn output_dir(&self) -> PathBuf {
        self.output_path
            .clone()
            .unwrap_or_else(|| env::temp_dir().join("frame-dataset").join(run_id()))
    }
}

/// 本次运行的标识：函数计算的 request id，本地运行时使用时间戳 + UUID
pub fn run_id() -> String {
    env::var("FC_REQUEST_ID").unwrap_or_else(|_| {
        format!(
            "{}_{}",
            chrono::Utc::now().timestamp(),
            uuid::Uuid::new_v4()
        )
    })
}

/// 来自单个配置源的值，未设置的项为 None
#[derive(Debug, Clone, Default)]
struct PartialConfig {
    interval: Option<f64>,
    output_path: Option<PathBuf>,
    ffmpeg: Option<String>,
    ffprobe: Option<String>,
    mediainfo: Option<String>,
    oss_endpoint: Option<String>,
    destination_bucket: Option<String>,
    destination_prefix: Option<String>,
    log_level: Option<String>,
}

impl PartialConfig {
    /// 用 `other` 补齐未设置的项
    fn or(self, other: PartialConfig) -> PartialConfig {
        PartialConfig {
            interval: self.interval.or(other.interval),
            output_path: self.output_path.or(other.output_path),
            ffmpeg: self.ffmpeg.or(other.ffmpeg),
            ffprobe: self.ffprobe.or(other.ffprobe),
            mediainfo: self.mediainfo.or(other.mediainfo),
            oss_endpoint: self.oss_endpoint.or(other.oss_endpoint),
            destination_bucket: self.destination_bucket.or(other.destination_bucket),
            destination_prefix: self.destination_prefix.or(other.destination_prefix),
            log_level: self.log_level.or(other.log_level),
        }
    }

    fn finish(self) -> DatasetConfig {
        let defaults = DatasetConfig::default();
        DatasetConfig {
            interval: self.interval.unwrap_or(defaults.interval),
            output_path: self.output_path,
            tools: ToolPaths {
                ffmpeg: self.ffmpeg.unwrap_or(defaults.tools.ffmpeg),
                ffprobe: self.ffprobe.unwrap_or(defaults.tools.ffprobe),
                mediainfo: self.mediainfo.unwrap_or(defaults.tools.mediainfo),
            },
            oss_endpoint: self.oss_endpoint,
            destination_bucket: self.destination_bucket,
            destination_prefix: self
                .destination_prefix
                .unwrap_or(defaults.destination_prefix),
            log_level: self.log_level.unwrap_or(defaults.log_level),
        }
    }
}

/// 命令行上可以覆盖的配置项
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub interval: Option<f64>,
    pub output_path: Option<PathBuf>,
    pub destination_bucket: Option<String>,
    pub destination_prefix: Option<String>,
}

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从多个源加载配置，优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    ///
    /// 显式指定的配置文件读取失败会返回错误；默认位置的配置文件不存在则忽略。
    pub fn load_config(
        config_file: Option<&Path>,
        overrides: CliOverrides,
    ) -> Result<DatasetConfig> {
        let file_config = match config_file {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_from_default_locations().unwrap_or_default(),
        };

        let cli = PartialConfig {
            interval: overrides.interval,
            output_path: overrides.output_path,
            destination_bucket: overrides.destination_bucket,
            destination_prefix: overrides.destination_prefix,
            ..Default::default()
        };

        Ok(cli.or(Self::load_from_env()).or(file_config).finish())
    }

    /// 从环境变量加载配置
    fn load_from_env() -> PartialConfig {
        let var = |name: &str| env::var(name).ok().filter(|v| !v.is_empty());

        PartialConfig {
            interval: var("FRAME_DATASET_INTERVAL").and_then(|v| v.parse().ok()),
            output_path: var("OUTPUT_PATH").map(PathBuf::from),
            ffmpeg: var("FFMPEG_PATH"),
            ffprobe: var("FFPROBE_PATH"),
            mediainfo: var("MEDIAINFO_PATH"),
            oss_endpoint: var("OSS_ENDPOINT"),
            destination_bucket: var("DESTINATION_BUCKET"),
            destination_prefix: var("DESTINATION_PREFIX"),
            log_level: var("LOG_LEVEL"),
        }
    }

    /// 从INI配置文件加载配置
    fn load_from_file(config_path: &Path) -> Result<PartialConfig> {
        if !config_path.exists() {
            return Err(anyhow::anyhow!("配置文件不存在: {}", config_path.display()));
        }

        let mut config_parser = configparser::ini::Ini::new();
        config_parser
            .load(config_path)
            .map_err(|e| anyhow::anyhow!("读取配置文件失败: {}: {}", config_path.display(), e))?;

        // 找不到指定节时回退到 [DEFAULT] 节
        let get = |section: &str, key: &str| {
            config_parser
                .get(section, key)
                .or_else(|| config_parser.get("DEFAULT", key))
                .filter(|v| !v.is_empty())
        };

        let interval = match get("frame_dataset", "interval") {
            Some(v) => Some(v.parse().map_err(|_| {
                anyhow::anyhow!("配置项 interval 不是数字: {} ({})", v, config_path.display())
            })?),
            None => None,
        };

        Ok(PartialConfig {
            interval,
            output_path: get("frame_dataset", "output_path").map(PathBuf::from),
            ffmpeg: get("tools", "ffmpeg"),
            ffprobe: get("tools", "ffprobe"),
            mediainfo: get("tools", "mediainfo"),
            oss_endpoint: get("oss", "endpoint"),
            destination_bucket: get("oss", "destination_bucket"),
            destination_prefix: get("oss", "destination_prefix"),
            log_level: get("logging", "level"),
        })
    }

    /// 从默认位置加载配置文件
    fn load_from_default_locations() -> Result<PartialConfig> {
        let mut candidates = vec![
            PathBuf::from(CONFIG_FILE_NAME),
            PathBuf::from(HIDDEN_CONFIG_FILE_NAME),
        ];
        if let Some(home) = env::var_os("HOME") {
            candidates.push(PathBuf::from(home).join(HIDDEN_CONFIG_FILE_NAME));
        }
        candidates.push(PathBuf::from("/etc").join(CONFIG_FILE_NAME));

        for candidate in candidates {
            if candidate.exists() {
                tracing::debug!("使用配置文件: {}", candidate.display());
                return Self::load_from_file(&candidate);
            }
        }

        Err(anyhow::anyhow!("未找到配置文件"))
    }

    /// 创建默认配置文件
    pub fn create_default_config(config_path: &Path) -> Result<()> {
        let mut config_parser = configparser::ini::Ini::new();
        let tools = ToolPaths::default();
        config_parser.set("frame_dataset", "interval", Some(DEFAULT_INTERVAL.to_string()));
        config_parser.set("frame_dataset", "output_path", Some(String::new()));
        config_parser.set("tools", "ffmpeg", Some(tools.ffmpeg));
        config_parser.set("tools", "ffprobe", Some(tools.ffprobe));
        config_parser.set("tools", "mediainfo", Some(tools.mediainfo));
        config_parser.set("oss", "endpoint", Some(String::new()));
        config_parser.set("oss", "destination_bucket", Some(String::new()));
        config_parser.set(
            "oss",
            "destination_prefix",
            Some(DEFAULT_DESTINATION_PREFIX.to_string()),
        );
        config_parser.set("logging", "level", Some("info".to_string()));

        config_parser
            .write(config_path)
            .map_err(|e| anyhow::anyhow!("写入配置文件失败: {}: {}", config_path.display(), e))?;

        Ok(())
    }
}
