use serde::{Deserialize, Serialize};

use crate::metadata::DatasetOutput;

/// 阿里云 OSS 事件通知
///
/// 只声明处理所需的字段，其余字段在反序列化时忽略。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OssEvent {
    pub events: Vec<OssEventItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OssEventItem {
    /// 事件名称，如 `ObjectCreated:PutObject`
    pub event_name: String,
    #[serde(default)]
    pub event_time: String,
    pub oss: OssInfo,
    /// 区域，如 `cn-hangzhou`
    pub region: String,
}

impl OssEventItem {
    /// 只处理对象创建事件（Put, Post, Copy, CompleteMultipartUpload）
    pub fn is_object_created(&self) -> bool {
        self.event_name.starts_with("ObjectCreated")
            && self.event_name != "ObjectCreated:PutSymlink"
    }

    /// 同区域的内网 endpoint
    pub fn internal_endpoint(&self) -> String {
        format!("oss-{}-internal.aliyuncs.com", self.region)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OssInfo {
    pub bucket: BucketInfo,
    pub object: ObjectInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    /// 键（文件路径）
    pub key: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub e_tag: String,
}

/// 处理请求的响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DatasetOutput>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_EVENT: &str = r#"{
        "events": [{
            "eventName": "ObjectCreated:PutObject",
            "eventSource": "acs:oss",
            "eventTime": "2024-05-01T08:00:00.000Z",
            "eventVersion": "1.0",
            "oss": {
                "bucket": {
                    "arn": "acs:oss:cn-hangzhou:123:videos",
                    "name": "videos",
                    "ownerIdentity": {"principalId": "123"}
                },
                "object": {
                    "deltaSize": 1024,
                    "eTag": "abc",
                    "key": "raw/clip.mp4",
                    "size": 1024
                },
                "ossSchemaVersion": "1.0",
                "ruleId": "rule"
            },
            "region": "cn-hangzhou",
            "requestParameters": {"sourceIPAddress": "127.0.0.1"},
            "responseElements": {"requestId": "req"},
            "userIdentity": {"principalId": "123"}
        }]
    }"#;

    #[test]
    fn test_parse_oss_event() {
        let event: OssEvent = serde_json::from_str(SAMPLE_EVENT).unwrap();
        let item = &event.events[0];

        assert!(item.is_object_created());
        assert_eq!(item.oss.bucket.name, "videos");
        assert_eq!(item.oss.object.key, "raw/clip.mp4");
        assert_eq!(item.oss.object.size, 1024);
        assert_eq!(item.internal_endpoint(), "oss-cn-hangzhou-internal.aliyuncs.com");
    }

    #[test]
    fn test_symlink_and_delete_are_not_processed() {
        let mut event: OssEvent = serde_json::from_str(SAMPLE_EVENT).unwrap();
        let item = &mut event.events[0];

        item.event_name = "ObjectCreated:PutSymlink".to_string();
        assert!(!item.is_object_created());
        item.event_name = "ObjectRemoved:DeleteObject".to_string();
        assert!(!item.is_object_created());
    }
}
