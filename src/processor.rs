use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::media_shell::{CommandRunner, MediaShell};
use crate::metadata::DatasetOutput;
use crate::object_store::{fetch_to_local, push_from_local, ObjectStore};
use crate::sampler::sample_frames;

/// 抽帧结果上传的目标位置
#[derive(Debug, Clone)]
pub struct Destination {
    pub bucket: String,
    /// 对象键前缀，帧会上传到 `<prefix>/<视频名>/<帧文件名>`
    pub prefix: String,
}

/// 一次数据集构建任务
#[derive(Debug, Clone)]
pub struct DatasetRequest {
    pub source_bucket: String,
    pub source_key: String,
    /// 抽帧间隔（秒）
    pub interval: f64,
    pub output_dir: PathBuf,
    pub destination: Option<Destination>,
}

/// 下载视频、按间隔抽帧，并在配置了目标 bucket 时上传所有帧
///
/// 下载的临时视频在抽帧结束后删除。
pub async fn build_dataset<R>(
    store: &dyn ObjectStore,
    shell: Arc<MediaShell<R>>,
    request: &DatasetRequest,
) -> Result<DatasetOutput>
where
    R: CommandRunner + 'static,
{
    let total_start = Instant::now();
    info!(
        bucket = %request.source_bucket,
        key = %request.source_key,
        interval = request.interval,
        "🎬 [数据集] 开始处理视频"
    );

    let video = fetch_to_local(store, &request.source_bucket, &request.source_key)
        .await
        .context("下载视频失败")?;

    let video_path = video.path().to_path_buf();
    let output_dir = request.output_dir.clone();
    let interval = request.interval;
    let frames = tokio::task::spawn_blocking(move || {
        sample_frames(&*shell, &output_dir, &video_path, interval)
    })
    .await
    .context("抽帧任务异常退出")?
    .map_err(|e| {
        error!("❌ [数据集] 抽帧失败: {}", e);
        e
    })
    .context("抽帧失败")?;

    drop(video);
    info!("✅ [数据集] 抽帧完成: {} 帧", frames.len());

    let mut uploaded_keys = Vec::new();
    if let Some(destination) = &request.destination {
        let video_name = video_stem(&request.source_key);
        for frame in &frames {
            let dest_key = frame_key(&destination.prefix, &video_name, &frame.path);
            push_from_local(store, &destination.bucket, &frame.path, &dest_key)
                .await
                .with_context(|| format!("上传帧失败: {}", frame.path.display()))?;
            uploaded_keys.push(dest_key);
        }
        info!(
            "✅ [数据集] 上传完成: {} 个文件 -> {}",
            uploaded_keys.len(),
            destination.bucket
        );
    } else {
        info!("未配置目标 bucket，跳过上传");
    }

    info!(
        "🎉 [数据集] 处理完成，总耗时: {:.2}秒",
        total_start.elapsed().as_secs_f64()
    );

    Ok(DatasetOutput {
        source_bucket: request.source_bucket.clone(),
        source_key: request.source_key.clone(),
        interval: request.interval,
        output_dir: request.output_dir.clone(),
        frames,
        uploaded_keys,
    })
}

fn video_stem(object_key: &str) -> String {
    Path::new(object_key)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("video")
        .to_string()
}

fn frame_key(prefix: &str, video_name: &str, frame_path: &Path) -> String {
    let file_name = frame_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prefix = prefix.trim_matches('/');

    if prefix.is_empty() {
        format!("{}/{}", video_name, file_name)
    } else {
        format!("{}/{}/{}", prefix, video_name, file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_shell::ToolPaths;
    use crate::object_store::LocalStore;
    use crate::testing::FakeRunner;

    fn setup() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("store"));
        std::fs::create_dir_all(dir.path().join("store/videos/raw")).unwrap();
        std::fs::write(dir.path().join("store/videos/raw/clip.mp4"), b"fake mp4").unwrap();
        (dir, store)
    }

    fn request(dir: &Path, destination: Option<Destination>) -> DatasetRequest {
        DatasetRequest {
            source_bucket: "videos".to_string(),
            source_key: "raw/clip.mp4".to_string(),
            interval: 1.0,
            output_dir: dir.join("frames"),
            destination,
        }
    }

    #[test]
    fn test_frame_key() {
        let frame = Path::new("/tmp/out/frame_2.jpg");
        assert_eq!(frame_key("frames", "clip", frame), "frames/clip/frame_2.jpg");
        assert_eq!(frame_key("/frames/", "clip", frame), "frames/clip/frame_2.jpg");
        assert_eq!(frame_key("", "clip", frame), "clip/frame_2.jpg");
        assert_eq!(video_stem("raw/clip.mp4"), "clip");
        assert_eq!(video_stem(""), "video");
    }

    #[tokio::test]
    async fn test_build_dataset_uploads_frames() {
        let (dir, store) = setup();
        let shell = Arc::new(MediaShell::with_runner(
            FakeRunner::new().with_duration_millis("3000").writing_outputs(),
            ToolPaths::default(),
        ));
        let destination = Destination {
            bucket: "dataset".to_string(),
            prefix: "frames".to_string(),
        };

        let output = build_dataset(&store, shell.clone(), &request(dir.path(), Some(destination)))
            .await
            .unwrap();

        assert_eq!(output.frames.len(), 3);
        assert_eq!(
            output.uploaded_keys,
            vec![
                "frames/clip/frame_0.jpg",
                "frames/clip/frame_1.jpg",
                "frames/clip/frame_2.jpg"
            ]
        );
        for key in &output.uploaded_keys {
            let stored = dir.path().join("store/dataset").join(key);
            assert_eq!(std::fs::read(stored).unwrap(), b"\xff\xd8\xff\xd9");
        }

        // 抽帧使用的是下载的临时副本，结束后已被删除
        let mediainfo = shell.runner().calls_to("mediainfo");
        let temp_video = PathBuf::from(mediainfo[0].args.last().unwrap());
        assert!(!temp_video.exists());
    }

    #[tokio::test]
    async fn test_build_dataset_without_destination() {
        let (dir, store) = setup();
        let shell = Arc::new(MediaShell::with_runner(
            FakeRunner::new().with_duration_millis("2000").writing_outputs(),
            ToolPaths::default(),
        ));

        let output = build_dataset(&store, shell, &request(dir.path(), None))
            .await
            .unwrap();

        assert_eq!(output.frames.len(), 2);
        assert!(output.uploaded_keys.is_empty());
        assert!(dir.path().join("frames/frame_1.jpg").exists());
    }

    #[tokio::test]
    async fn test_build_dataset_missing_source() {
        let (dir, store) = setup();
        let shell = Arc::new(MediaShell::with_runner(FakeRunner::new(), ToolPaths::default()));
        let mut req = request(dir.path(), None);
        req.source_key = "raw/missing.mp4".to_string();

        let result = build_dataset(&store, shell.clone(), &req).await;

        assert!(result.is_err());
        assert!(shell.runner().calls().is_empty());
    }
}
