pub mod config;
pub mod error;
pub mod handler;
pub mod media_shell;
pub mod metadata;
pub mod object_store;
pub mod oss_client;
pub mod oss_event;
pub mod processor;
pub mod sampler;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConfigLoader, DatasetConfig};
pub use error::{GatewayError, MediaError};
pub use media_shell::{CommandRunner, MediaShell, SystemRunner, ToolPaths};
pub use metadata::{DatasetOutput, FrameDescriptor, SampledFrame};
pub use object_store::{fetch_to_local, push_from_local, LocalStore, ObjectStore, TempVideo};
pub use oss_client::OssStore;
pub use oss_event::{OssEvent, OssEventItem, ProcessResponse};
pub use processor::{build_dataset, DatasetRequest, Destination};
pub use sampler::sample_frames;
