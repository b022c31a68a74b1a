//! Narrow trait boundaries for the out-of-scope collaborators this crate
//! consumes but never implements (spec.md §1, §6): the blob store, the auth
//! provider, and the asynchronous job runtime.
//!
//! The teacher's `FFmpegEngine` is the shape kept here — a small struct (or,
//! here, a trait) naming the operation an external process performs, with no
//! implementation of that process inside this crate. `ffmpeg.rs` itself has
//! no counterpart: FFmpeg invocation is out of scope per §1 and isn't named
//! among the collaborators this crate's core actually calls through (only
//! the renderer's *caller*, not this core, would hold an `FFmpegEngine`).

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CoreError;

/// `download_by_key`, `upload_from_path`, `generate_signed_url`,
/// `delete_by_key`, `file_exists` (spec.md §6).
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn download_by_key(&self, key: &str) -> Result<Vec<u8>, CoreError>;
    async fn upload_from_path(&self, key: &str, local_path: &str) -> Result<(), CoreError>;
    async fn generate_signed_url(&self, key: &str, expiry_minutes: u32) -> Result<String, CoreError>;
    async fn delete_by_key(&self, key: &str) -> Result<(), CoreError>;
    async fn file_exists(&self, key: &str) -> Result<bool, CoreError>;
}

/// The caller's identity, as resolved by the auth provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub user_id: String,
    pub is_api_key: bool,
}

/// `validate bearer token`, `validate API key` (prefix + SHA-256 hash
/// equality) (spec.md §6).
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn validate_bearer_token(&self, token: &str) -> Result<Principal, CoreError>;
    async fn validate_api_key(&self, key: &str) -> Result<Principal, CoreError>;
}

/// `submit render/export job by id`, `poll status`, `cancel by id`
/// (spec.md §6). `params` and the status payload are opaque JSON — this
/// crate has no opinion on job shape, only that one exists elsewhere.
#[async_trait]
pub trait AsyncJobRuntime: Send + Sync {
    async fn submit(&self, job_id: &str, params: Value) -> Result<(), CoreError>;
    async fn poll_status(&self, job_id: &str) -> Result<Value, CoreError>;
    async fn cancel(&self, job_id: &str) -> Result<(), CoreError>;
}
