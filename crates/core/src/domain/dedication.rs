use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Name of the backing file created under the chosen mount point.
///
/// External tooling locates the dedicated space through this name; it is part
/// of the persisted host state and must not change.
pub const DEDICATED_FILE_NAME: &str = "xandeum-pages";

/// Well-known symlink that publishes the dedicated file to the pod service.
pub const DEFAULT_LINK_PATH: &str = "/run/xandeum-pod";

/// Dedication sizes are requested in decimal gigabytes.
pub const BYTES_PER_GB: u64 = 1_000_000_000;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DedicationRequest {
    /// Additional space to dedicate, in GB (10^9 bytes)
    pub size: u64,
    /// Mount point that receives the backing file
    #[schema(value_type = String)]
    pub mount: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DedicationResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symlink: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine readable failure tag, e.g. `allocation-failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DedicationResponse {
    pub fn success(path: impl Into<String>, symlink: impl Into<String>) -> Self {
        Self {
            ok: true,
            path: Some(path.into()),
            symlink: Some(symlink.into()),
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            reason: Some(reason.into()),
            ..Self::default()
        }
    }
}
