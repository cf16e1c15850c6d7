use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::config::{run_id, DatasetConfig};
use crate::media_shell::{CommandRunner, MediaShell, SystemRunner};
use crate::object_store::ObjectStore;
use crate::oss_client::OssStore;
use crate::processor::{build_dataset, DatasetRequest, Destination};
use crate::{OssEvent, ProcessResponse};

/// 服务共享状态
pub struct AppState<R = SystemRunner> {
    pub config: DatasetConfig,
    pub shell: Arc<MediaShell<R>>,
    /// 固定使用的存储后端；为 None 时按事件区域创建 OSS 客户端
    pub store: Option<Arc<dyn ObjectStore>>,
}

impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            shell: self.shell.clone(),
            store: self.store.clone(),
        }
    }
}

/// 构建路由
pub fn router<R: CommandRunner + 'static>(state: AppState<R>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/process", post(handle_oss_event::<R>))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 健康检查 Handler
pub async fn health_check() -> &'static str {
    "OK"
}

/// 处理 OSS Event：下载视频、抽帧、上传结果
pub async fn handle_oss_event<R: CommandRunner + 'static>(
    State(state): State<AppState<R>>,
    Json(event): Json<OssEvent>,
) -> Result<ResponseJson<ProcessResponse>, (StatusCode, String)> {
    info!("收到 OSS Event: {} 个事件", event.events.len());

    let Some(event_item) = event.events.first() else {
        return Err((StatusCode::BAD_REQUEST, "事件列表为空".to_string()));
    };

    if !event_item.is_object_created() {
        return Ok(ResponseJson(ProcessResponse {
            success: false,
            message: format!("不支持的事件类型: {}", event_item.event_name),
            result: None,
        }));
    }

    let bucket = &event_item.oss.bucket.name;
    let object_key = &event_item.oss.object.key;
    info!(bucket = %bucket, key = %object_key, region = %event_item.region, "处理视频文件");

    let store: Arc<dyn ObjectStore> = match &state.store {
        Some(store) => store.clone(),
        None => {
            // 内网访问更快且免费
            let endpoint = state
                .config
                .oss_endpoint
                .clone()
                .unwrap_or_else(|| event_item.internal_endpoint());
            let oss = OssStore::from_env(Some(&endpoint)).map_err(|e| {
                error!("创建 OSS 客户端失败: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("创建 OSS 客户端失败: {}", e))
            })?;
            Arc::new(oss)
        }
    };

    let output_dir = state
        .config
        .output_path
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("frame-dataset"))
        .join(run_id())
        .join("frames");

    let request = DatasetRequest {
        source_bucket: bucket.clone(),
        source_key: object_key.clone(),
        interval: state.config.interval,
        output_dir,
        destination: state.config.destination_bucket.clone().map(|bucket| Destination {
            bucket,
            prefix: state.config.destination_prefix.clone(),
        }),
    };

    let output = build_dataset(store.as_ref(), state.shell.clone(), &request)
        .await
        .map_err(|e| {
            error!("处理视频失败: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("处理视频失败: {:#}", e))
        })?;

    let message = format!(
        "成功抽取 {} 帧{}",
        output.frames.len(),
        if output.uploaded_keys.is_empty() {
            ""
        } else {
            "，已上传到目标 bucket"
        }
    );
    info!("{}", message);

    Ok(ResponseJson(ProcessResponse {
        success: true,
        message,
        result: Some(output),
    }))
}
