//! Request and response shapes shared by both routers.

use serde::{Deserialize, Serialize};
use verdist_types::{ContentRef, FileInfo, FileName, FileRecord, Version};

pub const HEALTH_PATH: &str = "/health";
pub const UPLOAD_PATH: &str = "/upload";
pub const FILE_PATH: &str = "/file/:filename";
pub const FILE_VERSION_PATH: &str = "/file/:filename/version/:version";
pub const FILE_INFO_PATH: &str = "/file/:filename/info";
pub const FILE_VERSIONS_PATH: &str = "/file/:filename/versions";
pub const FILES_PATH: &str = "/files";
pub const UPDATES_PATH: &str = "/updates";

/// SSE event name of an accepted publish.
pub const PUBLISH_EVENT: &str = "publish";
/// SSE event name sent when a subscriber fell behind; data is the number
/// of events it missed.
pub const LAGGED_EVENT: &str = "lagged";

/// Header carrying the served version token.
pub const VERSION_HEADER: &str = "x-file-version";
/// Header carrying the hex SHA-256 of the served bytes.
pub const CHECKSUM_HEADER: &str = "x-file-checksum";

/// Multipart field names of an upload.
pub const FIELD_FILENAME: &str = "filename";
pub const FIELD_VERSION: &str = "version";
pub const FIELD_FILE: &str = "file";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

impl HealthResponse {
    pub fn healthy(service: &str) -> Self {
        Self {
            status: "healthy".into(),
            service: service.into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// Published record as reported to uploaders.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMetadata {
    #[serde(flatten)]
    pub info: FileInfo,
    /// Store locator of the content.
    pub filepath: ContentRef,
}

impl From<FileRecord> for UploadMetadata {
    fn from(record: FileRecord) -> Self {
        Self {
            info: record.info(),
            filepath: record.content_ref,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub metadata: UploadMetadata,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesResponse {
    pub files: Vec<FileName>,
}

/// Query of the update stream. `filename` is a comma-separated list; when
/// absent every publish is streamed.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UpdatesQuery {
    pub filename: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionsResponse {
    pub filename: FileName,
    pub latest: Version,
    /// Newest first.
    pub versions: Vec<Version>,
}
