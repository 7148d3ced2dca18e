//! Data model (spec §3): the immutable task descriptor and the orchestrator's
//! per-task mutable state.

use std::collections::HashMap;

/// Lower clamp bound for `thread_count` (spec §3: clamped to `[1, 10]`).
pub const MIN_THREAD_COUNT: u32 = 1;
/// Upper clamp bound for `thread_count`.
pub const MAX_THREAD_COUNT: u32 = 10;

/// The kind of request a `RequestTask` describes. `MTDownload` is selected
/// when the caller opts in and `kind` is `Download` (spec §4.6); the other
/// variants are out of scope for this engine and exist only so a
/// `RequestTask` can describe the boundary contract with the outer request
/// manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Download,
    MTDownload,
    Upload,
    Get,
    Post,
    Put,
    Delete,
    Head,
}

/// Immutable descriptor of one job, handed to the Request Factory (C6).
#[derive(Debug, Clone)]
pub struct RequestTask {
    pub id: i64,
    pub batch_id: i64,
    pub kind: RequestKind,
    pub url: String,
    pub save_dir: String,
    pub save_file_name: Option<String>,
    pub thread_count: u32,
    pub show_progress: bool,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl RequestTask {
    /// `thread_count` clamped into `[1, 10]` regardless of the requested value
    /// (spec §3, §4.4, and scenario E6).
    pub fn clamped_thread_count(&self) -> u32 {
        self.thread_count.clamp(MIN_THREAD_COUNT, MAX_THREAD_COUNT)
    }
}

/// Per-worker state the orchestrator tracks (spec §3 `SegmentState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStatus {
    Idle,
    Active,
    Redirecting,
    Succeeded,
    Failed,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct SegmentState {
    pub index: usize,
    pub start: u64,
    pub end: u64,
    pub written_bytes: u64,
    pub bytes_received: u64,
    pub bytes_total: u64,
    pub status: SegmentStatus,
}

/// The outcome of a finished task, handed to the reply channel (C6).
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task_id: i64,
    pub batch_id: i64,
    pub ok: bool,
    pub error: Option<String>,
}

/// Orchestrator-owned aggregate state for one running task (spec §3
/// `DownloadState`). Not shared outside the orchestrator; exists so tests and
/// the CLI driver can snapshot where a download stands.
#[derive(Debug, Clone)]
pub struct DownloadState {
    pub url: String,
    pub effective_url: String,
    pub size: Option<u64>,
    pub thread_count: u32,
    pub segments: HashMap<usize, SegmentState>,
    pub success_count: usize,
    pub failure_count: usize,
    pub aggregate_received: u64,
    pub aggregate_total: u64,
    pub file_path: Option<std::path::PathBuf>,
    pub aborted: bool,
    pub error: Option<String>,
}

impl DownloadState {
    pub fn new(url: String, thread_count: u32) -> Self {
        Self {
            effective_url: url.clone(),
            url,
            size: None,
            thread_count,
            segments: HashMap::new(),
            success_count: 0,
            failure_count: 0,
            aggregate_received: 0,
            aggregate_total: 0,
            file_path: None,
            aborted: false,
            error: None,
        }
    }
}
