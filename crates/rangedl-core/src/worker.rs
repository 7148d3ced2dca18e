//! Segment worker (C2).
//!
//! Downloads one byte range — or, when `segment` is `None`, the whole
//! resource in a single unbounded stream — into the destination file at the
//! correct offset, following redirects and reporting progress and a single
//! terminal event to the orchestrator.
//!
//! Blocking (built on `curl::easy::Easy`); callers run it on a dedicated
//! thread (e.g. `tokio::task::spawn_blocking`) the way the engine's other
//! blocking segment downloads do.

use std::collections::HashMap;
use std::str;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use crate::client::{self, ClientConfig, RedirectBudget};
use crate::segmenter::Segment;
use crate::storage::StorageWriter;

/// Event emitted by a running worker. Progress events may be sent many
/// times; `Redirected` may be sent any number of times as the segment's
/// `SegmentState` cycles `Active -> Redirecting -> Active`; exactly one of
/// `Finished` or `Aborted` is sent per invocation of [`run_segment`] (spec
/// §4.2 step 7: no further events after abort is observed, so `Aborted` is
/// the last event a worker ever emits).
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Progress {
        index: usize,
        received: u64,
        total: u64,
    },
    Redirected {
        index: usize,
    },
    Finished {
        index: usize,
        ok: bool,
        error: Option<String>,
    },
    Aborted {
        index: usize,
    },
}

/// Runs one segment worker to completion. `segment = None` means unbounded
/// mode: no `Range` header, write sequentially from offset 0.
pub fn run_segment(
    index: usize,
    url: &str,
    custom_headers: &HashMap<String, String>,
    segment: Option<Segment>,
    storage: &StorageWriter,
    cfg: &ClientConfig,
    abort: &AtomicBool,
    events: &Sender<WorkerEvent>,
) {
    let _span = tracing::info_span!("segment", segment_index = index).entered();
    match run_to_completion(index, url, custom_headers, segment, storage, cfg, abort, events) {
        Outcome::Success => {
            let _ = events.send(WorkerEvent::Finished {
                index,
                ok: true,
                error: None,
            });
        }
        Outcome::Aborted => {
            let _ = events.send(WorkerEvent::Aborted { index });
        }
        Outcome::Failed(msg) => {
            let _ = events.send(WorkerEvent::Finished {
                index,
                ok: false,
                error: Some(msg),
            });
        }
    }
}

enum Outcome {
    Success,
    Aborted,
    Failed(String),
}

enum Attempt {
    Done,
    Redirect(String),
}

fn run_to_completion(
    index: usize,
    url: &str,
    custom_headers: &HashMap<String, String>,
    segment: Option<Segment>,
    storage: &StorageWriter,
    cfg: &ClientConfig,
    abort: &AtomicBool,
    events: &Sender<WorkerEvent>,
) -> Outcome {
    let mut current_url = url.to_string();
    let mut budget = RedirectBudget::new(cfg.max_redirects);
    let fixed_total = segment.map(|s| s.len());

    loop {
        if abort.load(Ordering::Relaxed) {
            return Outcome::Aborted;
        }
        match attempt_once(index, &current_url, custom_headers, segment, fixed_total, storage, cfg, abort, events) {
            Ok(Attempt::Done) => return Outcome::Success,
            Ok(Attempt::Redirect(location)) => {
                if let Err(e) = budget.step() {
                    return Outcome::Failed(e.to_string());
                }
                current_url = match client::resolve_redirect_url(&current_url, &location) {
                    Ok(resolved) => resolved,
                    Err(e) => return Outcome::Failed(e.to_string()),
                };
                let _ = events.send(WorkerEvent::Redirected { index });
            }
            Err(Outcome::Aborted) => return Outcome::Aborted,
            Err(other) => return other,
        }
    }
}

/// Shared state written from curl's header/write callbacks back out to the caller.
struct TransferState {
    headers: Vec<String>,
    status: Option<u32>,
    location: Option<String>,
    /// `Content-Length` of the live response, parsed from the GET reply
    /// itself. Only meaningful when `fixed_total` is `None`: HEAD didn't
    /// know the size up front, so this is the worker's own recovery of it.
    content_length: Option<u64>,
    bytes_written: u64,
    storage_error: Option<std::io::Error>,
}

#[allow(clippy::too_many_arguments)]
fn attempt_once(
    index: usize,
    url: &str,
    custom_headers: &HashMap<String, String>,
    segment: Option<Segment>,
    fixed_total: Option<u64>,
    storage: &StorageWriter,
    cfg: &ClientConfig,
    abort: &AtomicBool,
    events: &Sender<WorkerEvent>,
) -> Result<Attempt, Outcome> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(|e| Outcome::Failed(e.to_string()))?;
    easy.follow_location(false)
        .map_err(|e| Outcome::Failed(e.to_string()))?;
    client::apply_common_easy(&mut easy, cfg).map_err(|e| Outcome::Failed(e.to_string()))?;

    if let Some(seg) = segment {
        easy.range(&format!("{}-{}", seg.start, seg.end.saturating_sub(1)))
            .map_err(|e| Outcome::Failed(e.to_string()))?;
    }

    let mut list = client::build_header_list(custom_headers).map_err(|e| Outcome::Failed(e.to_string()))?;
    // Never negotiate compression on a ranged body: a compressed response would
    // make byte offsets meaningless relative to the planned segment.
    list.append("Accept-Encoding: identity")
        .map_err(|e| Outcome::Failed(e.to_string()))?;
    easy.http_headers(list).map_err(|e| Outcome::Failed(e.to_string()))?;

    let segment_start = segment.map(|s| s.start).unwrap_or(0);
    let state = Arc::new(Mutex::new(TransferState {
        headers: Vec::new(),
        status: None,
        location: None,
        content_length: None,
        bytes_written: 0,
        storage_error: None,
    }));

    {
        let mut transfer = easy.transfer();

        let state_hdr = Arc::clone(&state);
        transfer
            .header_function(move |data| {
                if let Ok(s) = str::from_utf8(data) {
                    let line = s.trim_end();
                    let mut st = state_hdr.lock().unwrap();
                    if line.starts_with("HTTP/") {
                        st.headers.clear();
                        st.location = None;
                        st.content_length = None;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        let name = name.trim();
                        let value = value.trim();
                        if name.eq_ignore_ascii_case("location") {
                            st.location = Some(value.to_string());
                        }
                        if name.eq_ignore_ascii_case("content-length") {
                            st.content_length = value.parse::<u64>().ok();
                        }
                    }
                    st.headers.push(line.to_string());
                }
                true
            })
            .map_err(|e| Outcome::Failed(e.to_string()))?;

        let state_write = Arc::clone(&state);
        let storage_write = storage.clone();
        let events_write = events.clone();
        transfer
            .write_function(move |data| {
                let mut st = state_write.lock().unwrap();
                if abort.load(Ordering::Relaxed) {
                    return Ok(0);
                }
                if st.status.is_none() {
                    st.status = parse_status_line(&st.headers);
                }
                if let Some(code) = st.status {
                    if client::is_redirect_status(code) {
                        // Redirect bodies (if any) are discarded, never written.
                        return Ok(data.len());
                    }
                }
                let offset = segment_start + st.bytes_written;
                match storage_write.write_at(offset, data) {
                    Ok(()) => {
                        st.bytes_written += data.len() as u64;
                        let received = st.bytes_written;
                        let total = fixed_total.unwrap_or_else(|| st.content_length.unwrap_or(0));
                        drop(st);
                        if total > 0 {
                            let _ = events_write.send(WorkerEvent::Progress {
                                index,
                                received,
                                total,
                            });
                        }
                        Ok(data.len())
                    }
                    Err(e) => {
                        let io_err = e.downcast::<std::io::Error>().unwrap_or_else(|e| {
                            std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
                        });
                        st.storage_error = Some(io_err);
                        Ok(0)
                    }
                }
            })
            .map_err(|e| Outcome::Failed(e.to_string()))?;

        if let Err(e) = transfer.perform() {
            let mut st = state.lock().unwrap();
            if abort.load(Ordering::Relaxed) {
                return Err(Outcome::Aborted);
            }
            if let Some(io_err) = st.storage_error.take() {
                return Err(Outcome::Failed(format!("storage: {}", io_err)));
            }
            return Err(Outcome::Failed(e.to_string()));
        }
    }

    if abort.load(Ordering::Relaxed) {
        return Err(Outcome::Aborted);
    }

    let code = easy
        .response_code()
        .map_err(|e| Outcome::Failed(e.to_string()))? as u32;

    if client::is_redirect_status(code) {
        let location = state.lock().unwrap().location.clone();
        return match location {
            Some(loc) => Ok(Attempt::Redirect(loc)),
            None => Err(Outcome::Failed(format!(
                "redirect status {} without Location header",
                code
            ))),
        };
    }

    if !(200..300).contains(&code) {
        return Err(Outcome::Failed(format!("HTTP {}", code)));
    }

    if let Some(seg) = segment {
        let written = state.lock().unwrap().bytes_written;
        let expected = seg.len();
        if written != expected {
            return Err(Outcome::Failed(format!(
                "partial transfer: expected {} bytes, got {}",
                expected, written
            )));
        }
    }

    Ok(Attempt::Done)
}

fn parse_status_line(headers: &[String]) -> Option<u32> {
    let first = headers.first()?;
    let mut parts = first.split_whitespace();
    let _http_version = parts.next()?;
    parts.next()?.parse::<u32>().ok()
}
