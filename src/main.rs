use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use frame_dataset::config::{CliOverrides, ConfigLoader, DatasetConfig};
use frame_dataset::handler::{self, AppState};
use frame_dataset::{
    build_dataset, fetch_to_local, push_from_local, sample_frames, DatasetRequest, Destination,
    FrameDescriptor, LocalStore, MediaShell, ObjectStore, OssStore,
};

/// 视频帧数据集工具 - 按间隔抽帧、截取目标区域、同步对象存储
#[derive(Parser, Debug)]
#[command(name = "frame-dataset")]
#[command(about = "视频帧数据集工具：均匀抽帧、目标截取、对象存储上传下载", long_about = None)]
struct Args {
    /// 配置文件路径（可选，支持 .ini 格式）
    /// 优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// 存储后端选择
#[derive(ClapArgs, Debug, Clone)]
struct StoreArgs {
    /// 使用本地目录作为对象存储（<目录>/<bucket>/<key>），不设置则使用 OSS
    #[arg(long)]
    local_store: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 按固定间隔从本地视频抽帧
    Sample {
        /// 输入视频文件路径
        #[arg(short, long)]
        input: PathBuf,

        /// 输出目录
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 抽帧间隔（秒），可通过环境变量 FRAME_DATASET_INTERVAL 或配置文件设置
        #[arg(long)]
        interval: Option<f64>,
    },
    /// 输出视频时长和分辨率
    Probe {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// 按 JSON 描述文件截取目标区域
    Regions {
        #[arg(short, long)]
        input: PathBuf,

        /// 目标描述 JSON 数组：[{"timestamp", "bounding_box", "size"}]
        #[arg(short, long)]
        descriptors: PathBuf,

        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// 从对象存储下载文件到临时目录
    Fetch {
        #[arg(long)]
        bucket: String,

        #[arg(long)]
        key: String,

        /// 保留下载的临时文件并输出路径
        #[arg(long)]
        keep: bool,

        #[command(flatten)]
        store: StoreArgs,
    },
    /// 上传本地文件到对象存储
    Push {
        #[arg(long)]
        bucket: String,

        #[arg(long)]
        file: PathBuf,

        #[arg(long)]
        key: String,

        #[command(flatten)]
        store: StoreArgs,
    },
    /// 下载视频、抽帧并上传到目标 bucket
    Dataset {
        #[arg(long)]
        bucket: String,

        #[arg(long)]
        key: String,

        #[arg(long)]
        interval: Option<f64>,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 目标 bucket，可通过环境变量 DESTINATION_BUCKET 或配置文件设置
        #[arg(long)]
        destination_bucket: Option<String>,

        #[arg(long)]
        destination_prefix: Option<String>,

        #[command(flatten)]
        store: StoreArgs,
    },
    /// Web 服务模式：启动 HTTP 服务器处理 OSS event
    Serve {
        /// 监听地址（默认从环境变量 FC_SERVER_PORT 读取，如果不存在则使用 0.0.0.0:9000）
        #[arg(short, long)]
        bind: Option<String>,

        #[command(flatten)]
        store: StoreArgs,
    },
    /// 生成默认配置文件
    InitConfig {
        #[arg(default_value = "frame-dataset.ini")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = match &args.command {
        Commands::Sample {
            output, interval, ..
        } => CliOverrides {
            interval: *interval,
            output_path: output.clone(),
            ..Default::default()
        },
        Commands::Dataset {
            interval,
            output,
            destination_bucket,
            destination_prefix,
            ..
        } => CliOverrides {
            interval: *interval,
            output_path: output.clone(),
            destination_bucket: destination_bucket.clone(),
            destination_prefix: destination_prefix.clone(),
        },
        _ => CliOverrides::default(),
    };
    let config = ConfigLoader::load_config(args.config.as_deref(), overrides)
        .context("加载配置失败")?;

    init_logging(&config.log_level);

    match args.command {
        Commands::Sample { input, .. } => {
            let shell = MediaShell::new(config.tools.clone());
            let output_dir = config.output_dir();
            let frames = sample_frames(&shell, &output_dir, &input, config.interval)
                .context("抽帧失败")?;
            println!("已抽取 {} 帧到 {}", frames.len(), output_dir.display());
        }
        Commands::Probe { input } => {
            let shell = MediaShell::new(config.tools.clone());
            let duration = shell.probe_duration(&input).context("获取视频时长失败")?;
            let (width, height) = shell
                .probe_dimensions(&input)
                .context("获取视频分辨率失败")?;
            println!("时长: {:.3} 秒", duration);
            println!("分辨率: {}x{}", width, height);
        }
        Commands::Regions {
            input,
            descriptors,
            output,
        } => {
            let raw = std::fs::read_to_string(&descriptors)
                .with_context(|| format!("读取描述文件失败: {}", descriptors.display()))?;
            let descriptors: Vec<FrameDescriptor> =
                serde_json::from_str(&raw).context("解析描述文件失败")?;
            std::fs::create_dir_all(&output).context("创建输出目录失败")?;

            let shell = MediaShell::new(config.tools.clone());
            let images = shell
                .extract_regions(&input, &descriptors, &output)
                .context("截取目标区域失败")?;
            println!("已截取 {} 个目标区域到 {}", images.len(), output.display());
        }
        Commands::Fetch {
            bucket,
            key,
            keep,
            store,
        } => {
            let store = open_store(&store, &config)?;
            let video = fetch_to_local(store.as_ref(), &bucket, &key)
                .await
                .context("下载文件失败")?;
            let size = video.size();
            if keep {
                let path = video.keep()?;
                println!("{}", path.display());
            } else {
                println!("已下载 {} 字节（临时文件已删除）", size);
            }
        }
        Commands::Push {
            bucket,
            file,
            key,
            store,
        } => {
            let store = open_store(&store, &config)?;
            push_from_local(store.as_ref(), &bucket, &file, &key)
                .await
                .context("上传文件失败")?;
            println!("已上传 {} -> {}/{}", file.display(), bucket, key);
        }
        Commands::Dataset {
            bucket, key, store, ..
        } => {
            let store = open_store(&store, &config)?;
            let request = DatasetRequest {
                source_bucket: bucket,
                source_key: key,
                interval: config.interval,
                output_dir: config.output_dir(),
                destination: config.destination_bucket.clone().map(|bucket| Destination {
                    bucket,
                    prefix: config.destination_prefix.clone(),
                }),
            };
            let shell = Arc::new(MediaShell::new(config.tools.clone()));
            let output = build_dataset(store.as_ref(), shell, &request)
                .await
                .context("构建数据集失败")?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Serve { bind, store } => {
            // 优先使用命令行参数，其次使用环境变量 FC_SERVER_PORT，最后使用默认值 9000
            let bind_addr = bind.unwrap_or_else(|| {
                std::env::var("FC_SERVER_PORT")
                    .map(|port| format!("0.0.0.0:{}", port))
                    .unwrap_or_else(|_| "0.0.0.0:9000".to_string())
            });
            let store = store
                .local_store
                .map(|root| Arc::new(LocalStore::new(root)) as Arc<dyn ObjectStore>);
            start_web_server(&bind_addr, config, store).await?;
        }
        Commands::InitConfig { path } => {
            ConfigLoader::create_default_config(&path)?;
            println!("已生成配置文件: {}", path.display());
        }
    }

    Ok(())
}

fn init_logging(level: &str) {
    let level = level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn open_store(args: &StoreArgs, config: &DatasetConfig) -> Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match &args.local_store {
        Some(root) => Arc::new(LocalStore::new(root)),
        None => Arc::new(
            OssStore::from_env(config.oss_endpoint.as_deref()).context("创建 OSS 客户端失败")?,
        ),
    };
    Ok(store)
}

async fn start_web_server(
    bind: &str,
    config: DatasetConfig,
    store: Option<Arc<dyn ObjectStore>>,
) -> Result<()> {
    let state = AppState {
        shell: Arc::new(MediaShell::new(config.tools.clone())),
        config,
        store,
    };
    let app = handler::router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .context(format!("绑定地址失败: {}", bind))?;

    tracing::info!("Web 服务器启动在: http://{}", bind);
    tracing::info!("健康检查: http://{}/health", bind);
    tracing::info!("OSS Event 处理: http://{}/process", bind);

    axum::serve(listener, app)
        .await
        .context("启动服务器失败")?;

    Ok(())
}
