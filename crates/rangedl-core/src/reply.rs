//! Request Factory & Reply Channel (C6).

use crate::task::{RequestKind, RequestTask, TaskOutcome};

/// The concrete request an orchestrator instantiates for a task (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcreteRequest {
    MtDownload,
    Download,
    Upload,
    Common,
}

/// Selects the concrete request kind for a task. `MtDownload` is chosen when
/// the caller opts in AND the task's kind is `Download`; `RequestKind::MTDownload`
/// always resolves to it directly.
pub fn select_request_kind(task: &RequestTask, mt_opt_in: bool) -> ConcreteRequest {
    match task.kind {
        RequestKind::MTDownload => ConcreteRequest::MtDownload,
        RequestKind::Download if mt_opt_in => ConcreteRequest::MtDownload,
        RequestKind::Download => ConcreteRequest::Download,
        RequestKind::Upload => ConcreteRequest::Upload,
        RequestKind::Get | RequestKind::Post | RequestKind::Put | RequestKind::Delete | RequestKind::Head => {
            ConcreteRequest::Common
        }
    }
}

/// Single-shot reply channel: the orchestrator posts exactly one
/// [`TaskOutcome`]; the receiver observes exactly one `requestFinished` event.
/// Consuming `finish` makes a second call impossible at the type level,
/// matching the "exactly once" contract in spec §8 property 2.
pub struct ReplyChannel {
    sender: tokio::sync::oneshot::Sender<TaskOutcome>,
}

impl ReplyChannel {
    pub fn new() -> (Self, tokio::sync::oneshot::Receiver<TaskOutcome>) {
        let (sender, receiver) = tokio::sync::oneshot::channel();
        (Self { sender }, receiver)
    }

    /// Emits the single terminal event and self-destructs.
    pub fn finish(self, outcome: TaskOutcome) {
        let _ = self.sender.send(outcome);
    }
}

/// Decoupled progress sink the orchestrator posts aggregate progress events
/// to. Spec §9 calls for replacing a process-global request manager with an
/// injected sink so the engine is testable without global state.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, task_id: i64, batch_id: i64, received: u64, total: u64);
}

/// A sink that discards every event; used when `show_progress` is false.
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn on_progress(&self, _task_id: i64, _batch_id: i64, _received: u64, _total: u64) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn task_with_kind(kind: RequestKind) -> RequestTask {
        RequestTask {
            id: 1,
            batch_id: 0,
            kind,
            url: "https://example.com/file".to_string(),
            save_dir: "/tmp".to_string(),
            save_file_name: None,
            thread_count: 4,
            show_progress: false,
            headers: HashMap::new(),
            body: None,
        }
    }

    #[test]
    fn download_without_opt_in_is_single_stream() {
        assert_eq!(
            select_request_kind(&task_with_kind(RequestKind::Download), false),
            ConcreteRequest::Download
        );
    }

    #[test]
    fn download_with_opt_in_is_mt() {
        assert_eq!(
            select_request_kind(&task_with_kind(RequestKind::Download), true),
            ConcreteRequest::MtDownload
        );
    }

    #[test]
    fn explicit_mtdownload_kind_is_always_mt() {
        assert_eq!(
            select_request_kind(&task_with_kind(RequestKind::MTDownload), false),
            ConcreteRequest::MtDownload
        );
    }

    #[tokio::test]
    async fn reply_channel_delivers_exactly_one_outcome() {
        let (reply, rx) = ReplyChannel::new();
        reply.finish(TaskOutcome {
            task_id: 1,
            batch_id: 0,
            ok: true,
            error: None,
        });
        let outcome = rx.await.unwrap();
        assert!(outcome.ok);
    }
}
