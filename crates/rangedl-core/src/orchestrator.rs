//! Download Orchestrator (C4).
//!
//! Drives one task end to end: probe the resource, plan segments, spawn
//! workers, aggregate their progress and terminal events, and finalize the
//! destination file exactly once. Runs as a single async task; workers run on
//! blocking threads and report back over a channel, so the orchestrator body
//! reads like a sequential event loop even though the work underneath it is
//! concurrent (spec §4.4).

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::client::{self, RedirectBudget};
use crate::config::RangedlConfig;
use crate::error::RangedlError;
use crate::fetch_head::{self, HeadResult};
use crate::progress::ProgressAggregator;
use crate::reply::{ProgressSink, ReplyChannel};
use crate::segmenter::{plan_segments, Segment};
use crate::storage::{self, StorageWriterBuilder};
use crate::task::{DownloadState, RequestTask, SegmentState, SegmentStatus, TaskOutcome};
use crate::url_model::derive_filename;
use crate::worker::{self, WorkerEvent};
use tracing::Instrument;

/// Runs `task` to completion and delivers its single terminal outcome over
/// `reply` (the Request Factory & Reply Channel contract, C6: the caller is
/// the only thing that ever observes a second event, by construction, since
/// `ReplyChannel::finish` consumes itself).
///
/// `state` is updated as the download progresses so a caller (e.g. the CLI)
/// can poll it concurrently; `progress` receives aggregate `(received,
/// total)` events when `task.show_progress` is set; `abort_token` lets an
/// external caller request cancellation by flipping it from another task.
pub async fn run_task(
    task: RequestTask,
    cfg: RangedlConfig,
    state: Arc<Mutex<DownloadState>>,
    progress: Arc<dyn ProgressSink>,
    abort_token: Arc<AtomicBool>,
    reply: ReplyChannel,
) {
    let span = tracing::info_span!("task", task_id = task.id, batch_id = task.batch_id);
    async move {
        tracing::info!(url = %task.url, "task started");

        let result = match run_inner(&task, &cfg, &state, &progress, &abort_token).await {
            Ok(()) => finalize(&task, &state, true, None),
            Err(err) => {
                let aborted = matches!(err, RangedlError::Aborted);
                if aborted {
                    state.lock().unwrap().aborted = true;
                }
                finalize(&task, &state, false, Some(err.to_error_text()))
            }
        };
        tracing::info!(ok = result.ok, error = ?result.error, "task finished");
        reply.finish(result);
    }
    .instrument(span)
    .await
}

fn finalize(
    task: &RequestTask,
    state: &Arc<Mutex<DownloadState>>,
    ok: bool,
    error: Option<String>,
) -> TaskOutcome {
    let mut st = state.lock().unwrap();
    st.error = error.clone();
    if !ok {
        if let Some(path) = &st.file_path {
            storage::remove_best_effort(path);
        }
    }
    TaskOutcome {
        task_id: task.id,
        batch_id: task.batch_id,
        ok,
        error,
    }
}

async fn run_inner(
    task: &RequestTask,
    cfg: &RangedlConfig,
    state: &Arc<Mutex<DownloadState>>,
    progress: &Arc<dyn ProgressSink>,
    abort_token: &Arc<AtomicBool>,
) -> Result<(), RangedlError> {
    if task.url.trim().is_empty() {
        return Err(RangedlError::Configuration("url is empty".to_string()));
    }
    if task.save_dir.trim().is_empty() {
        return Err(RangedlError::Configuration("save_dir is empty".to_string()));
    }
    if abort_token.load(Ordering::Relaxed) {
        return Err(RangedlError::Aborted);
    }

    let thread_count = cfg.clamp_thread_count(task.clamped_thread_count());
    let client_cfg = cfg.client_config();
    let headers = task.headers.clone();

    let (effective_url, head) = probe_with_redirects(&task.url, &headers, &client_cfg, abort_token).await?;

    if !head.is_success() {
        return Err(RangedlError::Protocol(format!(
            "unexpected status {}",
            head.status_code
        )));
    }

    state.lock().unwrap().effective_url = effective_url.clone();

    let size = head.content_length.filter(|&s| s > 0);
    let effective_thread_count = if size.is_some() { thread_count } else { 1 };

    let segments: Vec<Option<Segment>> = match size {
        Some(total) => plan_segments(total, effective_thread_count as usize)
            .into_iter()
            .map(Some)
            .collect(),
        None => vec![None],
    };

    let filename = task
        .save_file_name
        .clone()
        .unwrap_or_else(|| derive_filename(&effective_url, head.content_disposition.as_deref()));
    let final_path = Path::new(&task.save_dir).join(&filename);
    let temp_path = storage::temp_path(&final_path);

    {
        let mut st = state.lock().unwrap();
        st.size = size;
        st.thread_count = effective_thread_count;
        st.file_path = Some(temp_path.clone());
        for (index, seg) in segments.iter().enumerate() {
            st.segments.insert(
                index,
                SegmentState {
                    index,
                    start: seg.map(|s| s.start).unwrap_or(0),
                    end: seg.map(|s| s.end).unwrap_or(0),
                    written_bytes: 0,
                    bytes_received: 0,
                    bytes_total: seg.map(|s| s.len()).unwrap_or(0),
                    status: SegmentStatus::Idle,
                },
            );
        }
    }

    let temp_path_for_build = temp_path.clone();
    let mut builder = tokio::task::spawn_blocking(move || StorageWriterBuilder::create(&temp_path_for_build))
        .await
        .map_err(|e| RangedlError::Filesystem(e.to_string()))?
        .map_err(|e| RangedlError::Filesystem(e.to_string()))?;

    if let Some(total) = size {
        builder
            .preallocate(total)
            .map_err(|e| RangedlError::Filesystem(e.to_string()))?;
    }
    let storage = builder.build();

    if abort_token.load(Ordering::Relaxed) {
        return Err(RangedlError::Aborted);
    }

    let outcome = run_segments(
        task,
        &effective_url,
        &client_cfg,
        &headers,
        &segments,
        storage.clone(),
        state,
        progress,
        abort_token,
    )
    .await;

    outcome?;

    let finalize_storage = storage;
    let final_path_for_rename = final_path;
    tokio::task::spawn_blocking(move || {
        finalize_storage.sync()?;
        finalize_storage.finalize(&final_path_for_rename)
    })
    .await
    .map_err(|e| RangedlError::Filesystem(e.to_string()))?
    .map_err(|e| RangedlError::Filesystem(e.to_string()))?;

    state.lock().unwrap().file_path = None;
    Ok(())
}

async fn probe_with_redirects(
    url: &str,
    headers: &HashMap<String, String>,
    client_cfg: &crate::client::ClientConfig,
    abort_token: &Arc<AtomicBool>,
) -> Result<(String, HeadResult), RangedlError> {
    let mut current_url = url.to_string();
    let mut budget = RedirectBudget::new(client_cfg.max_redirects);

    loop {
        if abort_token.load(Ordering::Relaxed) {
            return Err(RangedlError::Aborted);
        }

        let probe_url = current_url.clone();
        let probe_headers = headers.clone();
        let probe_cfg = client_cfg.clone();
        let head = tokio::task::spawn_blocking(move || fetch_head::probe(&probe_url, &probe_headers, &probe_cfg))
            .await
            .map_err(|e| RangedlError::Transport(e.to_string()))?
            .map_err(|e| RangedlError::Transport(e.to_string()))?;

        if !head.is_redirect() {
            return Ok((current_url, head));
        }

        budget
            .step()
            .map_err(|e| RangedlError::Protocol(e.to_string()))?;

        match &head.location {
            Some(next) => {
                current_url = client::resolve_redirect_url(&current_url, next)
                    .map_err(|e| RangedlError::Protocol(e.to_string()))?;
            }
            None => {
                return Err(RangedlError::Protocol(format!(
                    "redirect status {} without Location header",
                    head.status_code
                )))
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_segments(
    task: &RequestTask,
    effective_url: &str,
    client_cfg: &crate::client::ClientConfig,
    headers: &HashMap<String, String>,
    segments: &[Option<Segment>],
    storage: crate::storage::StorageWriter,
    state: &Arc<Mutex<DownloadState>>,
    progress: &Arc<dyn ProgressSink>,
    abort_token: &Arc<AtomicBool>,
) -> Result<(), RangedlError> {
    let total_upfront = {
        let known: Vec<u64> = segments.iter().filter_map(|s| s.map(|s| s.len())).collect();
        if known.len() == segments.len() && !known.is_empty() {
            Some(known.iter().sum())
        } else {
            None
        }
    };

    let mut aggregator = ProgressAggregator::new(segments.len(), total_upfront);

    let (std_tx, std_rx) = std::sync::mpsc::channel::<WorkerEvent>();
    let (async_tx, mut async_rx) = tokio::sync::mpsc::unbounded_channel::<WorkerEvent>();

    let mut handles = Vec::with_capacity(segments.len());
    for (index, segment) in segments.iter().enumerate() {
        let url = effective_url.to_string();
        let headers = headers.clone();
        let segment = *segment;
        let storage = storage.clone();
        let cfg = client_cfg.clone();
        let abort = Arc::clone(abort_token);
        let tx = std_tx.clone();

        state.lock().unwrap().segments.entry(index).and_modify(|s| s.status = SegmentStatus::Active);

        handles.push(tokio::task::spawn_blocking(move || {
            worker::run_segment(index, &url, &headers, segment, &storage, &cfg, &abort, &tx);
        }));
    }
    drop(std_tx);

    let bridge = tokio::task::spawn_blocking(move || {
        while let Ok(event) = std_rx.recv() {
            if async_tx.send(event).is_err() {
                break;
            }
        }
    });

    let mut finished = 0usize;
    let mut first_error: Option<String> = None;
    let total_workers = segments.len();

    while let Some(event) = async_rx.recv().await {
        match event {
            WorkerEvent::Progress { index, received, total } => {
                if let Some(ev) = aggregator.apply(index, received as i64, total as i64) {
                    if task.show_progress {
                        progress.on_progress(task.id, task.batch_id, ev.received, ev.total);
                    }
                }
                let mut st = state.lock().unwrap();
                if let Some(seg) = st.segments.get_mut(&index) {
                    seg.bytes_received = received;
                    seg.bytes_total = total;
                    seg.written_bytes = received;
                    // Data is flowing again, so a segment that was mid-redirect is active.
                    seg.status = SegmentStatus::Active;
                }
                st.aggregate_received = aggregator.aggregate_received();
                st.aggregate_total = aggregator.aggregate_total();
            }
            WorkerEvent::Redirected { index } => {
                let mut st = state.lock().unwrap();
                if let Some(seg) = st.segments.get_mut(&index) {
                    seg.status = SegmentStatus::Redirecting;
                }
            }
            WorkerEvent::Finished { index, ok, error } => {
                finished += 1;
                let mut st = state.lock().unwrap();
                if let Some(seg) = st.segments.get_mut(&index) {
                    seg.status = if ok { SegmentStatus::Succeeded } else { SegmentStatus::Failed };
                }
                if ok {
                    st.success_count += 1;
                } else {
                    st.failure_count += 1;
                    if first_error.is_none() {
                        first_error = error.clone();
                        drop(st);
                        // First failing worker wins: tell every sibling to stop.
                        abort_token.store(true, Ordering::Relaxed);
                        aggregator.set_aborted();
                    }
                }
                if finished >= total_workers {
                    break;
                }
            }
            WorkerEvent::Aborted { index } => {
                finished += 1;
                let mut st = state.lock().unwrap();
                if let Some(seg) = st.segments.get_mut(&index) {
                    seg.status = SegmentStatus::Aborted;
                }
                if finished >= total_workers {
                    break;
                }
            }
        }
    }

    for handle in handles {
        let _ = handle.await;
    }
    let _ = bridge.await;

    if let Some(msg) = first_error {
        return Err(RangedlError::Transport(msg));
    }
    if abort_token.load(Ordering::Relaxed) && finished < total_workers {
        return Err(RangedlError::Aborted);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::RequestKind;

    fn sample_task() -> RequestTask {
        RequestTask {
            id: 1,
            batch_id: 0,
            kind: RequestKind::MTDownload,
            url: String::new(),
            save_dir: "/tmp".to_string(),
            save_file_name: None,
            thread_count: 4,
            show_progress: false,
            headers: HashMap::new(),
            body: None,
        }
    }

    #[tokio::test]
    async fn empty_url_is_a_configuration_error_without_any_network_io() {
        let task = sample_task();
        let cfg = RangedlConfig::default();
        let state = Arc::new(Mutex::new(DownloadState::new(task.url.clone(), task.thread_count)));
        let (reply, rx) = ReplyChannel::new();
        run_task(
            task,
            cfg,
            state,
            Arc::new(crate::reply::NullProgressSink),
            Arc::new(AtomicBool::new(false)),
            reply,
        )
        .await;
        let outcome = rx.await.unwrap();
        assert!(!outcome.ok);
        assert!(outcome.error.unwrap().contains("url is empty"));
    }

    #[tokio::test]
    async fn pre_aborted_token_short_circuits() {
        let mut task = sample_task();
        task.url = "https://example.invalid/file".to_string();
        let cfg = RangedlConfig::default();
        let state = Arc::new(Mutex::new(DownloadState::new(task.url.clone(), task.thread_count)));
        let abort = Arc::new(AtomicBool::new(true));
        let (reply, rx) = ReplyChannel::new();
        run_task(task, cfg, state, Arc::new(crate::reply::NullProgressSink), abort, reply).await;
        let outcome = rx.await.unwrap();
        assert!(!outcome.ok);
        assert_eq!(outcome.error.as_deref(), Some("aborted"));
    }
}
