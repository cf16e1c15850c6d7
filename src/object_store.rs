use async_trait::async_trait;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::{GatewayError, GatewayResult};

/// 对象读取流
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// 对象存储后端
///
/// 只需要两种能力：按 bucket/key 打开读取流，以及把一个已知长度的流写入 bucket/key。
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// 打开对象读取流，对象不存在时返回 `GatewayError::NotFound`
    async fn open_reader(&self, bucket: &str, key: &str) -> GatewayResult<ObjectReader>;

    /// 将 `body` 的全部内容写入对象
    async fn write_object(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectReader,
        content_length: u64,
    ) -> GatewayResult<()>;
}

/// 下载到本地的临时视频文件
///
/// 句柄被 drop 时临时文件会被删除；需要保留文件时调用 [`TempVideo::keep`]。
#[derive(Debug)]
pub struct TempVideo {
    file: NamedTempFile,
    size: u64,
}

impl TempVideo {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// 下载的字节数
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn file_mut(&mut self) -> &mut File {
        self.file.as_file_mut()
    }

    /// 放弃自动清理，返回文件路径，之后由调用方负责删除
    pub fn keep(self) -> GatewayResult<PathBuf> {
        let (_file, path) = self
            .file
            .keep()
            .map_err(|e| GatewayError::io("保留临时文件失败", e.error))?;
        Ok(path)
    }
}

impl Read for TempVideo {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for TempVideo {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.file.seek(pos)
    }
}

/// 下载对象到系统临时目录中的新文件
pub async fn fetch_to_local(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
) -> GatewayResult<TempVideo> {
    fetch_to_local_in(store, bucket, key, std::env::temp_dir()).await
}

/// 下载对象到 `dir` 中的新临时文件，返回的句柄位于文件开头
///
/// 复制失败时已写入的临时文件会先被删除再返回错误。
pub async fn fetch_to_local_in(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    dir: impl AsRef<Path>,
) -> GatewayResult<TempVideo> {
    info!(bucket, key, "正在从对象存储下载文件");

    let mut reader = store.open_reader(bucket, key).await?;

    let mut temp = tempfile::Builder::new()
        .prefix("download-")
        .suffix(".mp4")
        .tempfile_in(dir.as_ref())
        .map_err(|e| GatewayError::io("创建临时文件失败", e))?;

    let handle = temp
        .as_file()
        .try_clone()
        .map_err(|e| GatewayError::io("复制临时文件句柄失败", e))?;
    let mut writer = tokio::fs::File::from_std(handle);

    let copied = async {
        let n = tokio::io::copy(&mut reader, &mut writer).await?;
        writer.flush().await?;
        Ok::<u64, std::io::Error>(n)
    }
    .await;
    drop(writer);

    let size = match copied {
        Ok(n) => n,
        Err(e) => {
            let path = temp.path().to_path_buf();
            if let Err(close_err) = temp.close() {
                warn!("删除未完成的临时文件失败 {}: {}", path.display(), close_err);
            }
            return Err(GatewayError::io(
                format!("写入临时文件失败 {}/{}", bucket, key),
                e,
            ));
        }
    };

    temp.as_file_mut()
        .seek(SeekFrom::Start(0))
        .map_err(|e| GatewayError::Seek {
            path: temp.path().to_path_buf(),
            source: e,
        })?;

    info!(bucket, key, size, path = %temp.path().display(), "文件已下载");

    Ok(TempVideo { file: temp, size })
}

/// 上传本地文件到 `dest_key`
pub async fn push_from_local(
    store: &dyn ObjectStore,
    bucket: &str,
    local_path: impl AsRef<Path>,
    dest_key: &str,
) -> GatewayResult<()> {
    let local_path = local_path.as_ref();

    let file = tokio::fs::File::open(local_path)
        .await
        .map_err(|e| GatewayError::io(format!("打开本地文件失败: {}", local_path.display()), e))?;
    let content_length = file
        .metadata()
        .await
        .map_err(|e| GatewayError::io(format!("读取文件信息失败: {}", local_path.display()), e))?
        .len();

    info!(
        bucket,
        key = dest_key,
        size = content_length,
        "正在上传文件: {}",
        local_path.display()
    );

    store
        .write_object(bucket, dest_key, Box::pin(file), content_length)
        .await?;

    info!(bucket, key = dest_key, "文件已上传");
    Ok(())
}

/// 基于本地目录的对象存储：`<root>/<bucket>/<key>`
///
/// 用于离线运行和测试。
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> GatewayResult<PathBuf> {
        if bucket.is_empty() || bucket.contains('/') || bucket.contains("..") {
            return Err(GatewayError::InvalidKey(format!("bucket: {}", bucket)));
        }
        if key.is_empty() || key.starts_with('/') || key.contains("..") {
            return Err(GatewayError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(bucket).join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn open_reader(&self, bucket: &str, key: &str) -> GatewayResult<ObjectReader> {
        let path = self.object_path(bucket, key)?;
        debug!("打开本地对象: {}", path.display());

        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::pin(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(GatewayError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(GatewayError::Read {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn write_object(
        &self,
        bucket: &str,
        key: &str,
        mut body: ObjectReader,
        content_length: u64,
    ) -> GatewayResult<()> {
        let path = self.object_path(bucket, key)?;
        let context = format!("写入对象失败 {}/{}", bucket, key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| GatewayError::io(context.clone(), e))?;
        }

        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| GatewayError::io(context.clone(), e))?;
        let written = tokio::io::copy(&mut body, &mut file)
            .await
            .map_err(|e| GatewayError::io(context.clone(), e))?;
        file.sync_all()
            .await
            .map_err(|e| GatewayError::io(context.clone(), e))?;

        if written != content_length {
            warn!(bucket, key, written, content_length, "写入长度与声明长度不一致");
        }

        Ok(())
    }
}
