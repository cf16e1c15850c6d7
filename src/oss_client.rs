use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as base64_engine;
use base64::Engine;
use chrono::Utc;
use futures::TryStreamExt;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH};
use reqwest::{Body, Client, StatusCode};
use sha1::Sha1;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::io::{ReaderStream, StreamReader};

use crate::error::{GatewayError, GatewayResult};
use crate::object_store::{ObjectReader, ObjectStore};

type HmacSha1 = Hmac<Sha1>;

/// 默认 endpoint
pub const DEFAULT_ENDPOINT: &str = "oss-cn-hangzhou.aliyuncs.com";

/// 对象键编码时保留路径分隔符和常见的安全字符
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// 阿里云 OSS 存储，手动签名请求
///
/// 函数计算环境会提供以下环境变量用于认证：
/// - ALIBABA_CLOUD_ACCESS_KEY_ID
/// - ALIBABA_CLOUD_ACCESS_KEY_SECRET
/// - ALIBABA_CLOUD_SECURITY_TOKEN
pub struct OssStore {
    client: Client,
    endpoint: String,
    access_key_id: String,
    access_key_secret: String,
    /// STS 临时凭证（可选）
    security_token: Option<String>,
}

impl OssStore {
    /// 从环境变量读取凭证创建客户端
    pub fn from_env(endpoint: Option<&str>) -> GatewayResult<Self> {
        Self::from_vars(endpoint, |name| std::env::var(name).ok())
    }

    /// 通过 `lookup` 读取凭证，缺少 AccessKey 时返回 `GatewayError::Connection`
    fn from_vars(
        endpoint: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> GatewayResult<Self> {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| GatewayError::Connection(format!("未找到 {} 环境变量", name)))
        };
        let access_key_id = required("ALIBABA_CLOUD_ACCESS_KEY_ID")?;
        let access_key_secret = required("ALIBABA_CLOUD_ACCESS_KEY_SECRET")?;
        let security_token = lookup("ALIBABA_CLOUD_SECURITY_TOKEN");

        let endpoint = endpoint
            .map(|s| s.to_string())
            .or_else(|| lookup("OSS_ENDPOINT"))
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        Self::new(endpoint, access_key_id, access_key_secret, security_token)
    }

    pub fn new(
        endpoint: impl Into<String>,
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
        security_token: Option<String>,
    ) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| GatewayError::Connection(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
            security_token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 构建对象 URL
    fn build_url(&self, bucket: &str, object_key: &str) -> String {
        let encoded_key = utf8_percent_encode(object_key, KEY_ENCODE_SET).to_string();

        if self.endpoint.starts_with("http") {
            format!("{}/{}/{}", self.endpoint.trim_end_matches('/'), bucket, encoded_key)
        } else {
            format!("https://{}.{}/{}", bucket, self.endpoint, encoded_key)
        }
    }

    /// 生成 OSS 签名
    ///
    /// 参考: https://help.aliyun.com/document_detail/31951.html
    fn sign_request(
        &self,
        method: &str,
        bucket: &str,
        object_key: &str,
        headers: &HeaderMap,
    ) -> GatewayResult<String> {
        let canonicalized_resource = format!("/{}/{}", bucket, object_key);

        let mut oss_headers: Vec<(String, &str)> = headers
            .iter()
            .filter(|(name, _)| name.as_str().starts_with("x-oss-"))
            .map(|(name, value)| (name.as_str().to_lowercase(), value.to_str().unwrap_or("")))
            .collect();
        oss_headers.sort_by(|a, b| a.0.cmp(&b.0));

        let canonicalized_oss_headers: String = oss_headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string()
        };

        let string_to_sign = format!(
            "{}\n{}\n{}\n{}\n{}{}",
            method,
            header("Content-MD5"),
            header("Content-Type"),
            header("Date"),
            canonicalized_oss_headers,
            canonicalized_resource
        );

        let mut mac = HmacSha1::new_from_slice(self.access_key_secret.as_bytes())
            .map_err(|e| GatewayError::Connection(format!("创建 HMAC 失败: {}", e)))?;
        mac.update(string_to_sign.as_bytes());

        Ok(base64_engine.encode(mac.finalize().into_bytes()))
    }

    /// 构建带签名的请求头
    fn build_signed_headers(
        &self,
        method: &str,
        bucket: &str,
        object_key: &str,
        content_type: Option<&str>,
    ) -> GatewayResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();

        headers.insert("Date", header_value(&date)?);
        if let Some(ct) = content_type {
            headers.insert("Content-Type", header_value(ct)?);
        }
        if let Some(ref token) = self.security_token {
            headers.insert("x-oss-security-token", header_value(token)?);
        }

        let signature = self.sign_request(method, bucket, object_key, &headers)?;
        let authorization = format!("OSS {}:{}", self.access_key_id, signature);
        headers.insert("Authorization", header_value(&authorization)?);

        Ok(headers)
    }
}

fn header_value(value: &str) -> GatewayResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| GatewayError::Connection(format!("非法的请求头: {}", e)))
}

#[async_trait]
impl ObjectStore for OssStore {
    async fn open_reader(&self, bucket: &str, key: &str) -> GatewayResult<ObjectReader> {
        let url = self.build_url(bucket, key);
        let headers = self.build_signed_headers("GET", bucket, key, None)?;

        tracing::debug!(bucket, key, endpoint = %self.endpoint, "OSS GET");

        let read_error = |reason: String| GatewayError::Read {
            bucket: bucket.to_string(),
            key: key.to_string(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| read_error(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(GatewayError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                return Err(read_error(format!("HTTP {} - {}", status, error_text)));
            }
        }

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::pin(StreamReader::new(stream)))
    }

    async fn write_object(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectReader,
        content_length: u64,
    ) -> GatewayResult<()> {
        let url = self.build_url(bucket, key);
        let mut headers =
            self.build_signed_headers("PUT", bucket, key, Some(guess_content_type(key)))?;
        headers.insert(CONTENT_LENGTH, HeaderValue::from(content_length));

        tracing::debug!(bucket, key, content_length, endpoint = %self.endpoint, "OSS PUT");

        let context = format!("上传文件失败 {}/{}", bucket, key);
        let response = self
            .client
            .put(&url)
            .headers(headers)
            .body(Body::wrap_stream(ReaderStream::new(SyncReader(Mutex::new(body)))))
            .send()
            .await
            .map_err(|e| GatewayError::io(context.clone(), std::io::Error::other(e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::io(
                context,
                std::io::Error::other(format!("HTTP {} - {}", status, error_text)),
            ));
        }

        Ok(())
    }
}

/// `Body::wrap_stream` 要求流是 Sync 的
struct SyncReader(Mutex<ObjectReader>);

impl AsyncRead for SyncReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let reader = self
            .get_mut()
            .0
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        reader.as_mut().poll_read(cx, buf)
    }
}

/// 根据文件扩展名猜测 Content-Type
pub fn guess_content_type(object_key: &str) -> &'static str {
    let ext = std::path::Path::new(object_key)
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}
