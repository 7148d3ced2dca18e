//! Argument parsing and the single-task driver loop for `rangedl`.
//!
//! Plays the role of the "outer request-routing manager" the engine assumes
//! exists but does not implement itself: builds one `RequestTask`, submits it
//! to the orchestrator, prints progress, and prints the terminal event. No
//! batching or persistent queue — that stays out of scope.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use rangedl_core::config;
use rangedl_core::control::JobControl;
use rangedl_core::orchestrator;
use rangedl_core::progress::ProgressStats;
use rangedl_core::reply::{select_request_kind, ConcreteRequest, ProgressSink, ReplyChannel};
use rangedl_core::task::{DownloadState, RequestKind, RequestTask};

/// Download a file over HTTP(S), splitting it into byte-range segments
/// fetched concurrently.
#[derive(Debug, Parser)]
#[command(name = "rangedl")]
#[command(about = "Rangedl: range-parallel HTTP(S) downloader", long_about = None)]
pub struct Cli {
    /// Direct HTTP/HTTPS URL to download.
    pub url: String,

    /// Directory to save the file in (default: current directory).
    #[arg(long, short = 'd', value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Override the destination filename (default: derived from the URL or
    /// Content-Disposition).
    #[arg(long, short = 'o', value_name = "NAME")]
    pub output_name: Option<String>,

    /// Number of concurrent segments, clamped to [1, 10].
    #[arg(long, short = 't', default_value_t = 4, value_name = "N")]
    pub threads: u32,

    /// Extra request header, e.g. `--header 'Authorization: Bearer ...'`. Repeatable.
    #[arg(long = "header", value_name = "KEY:VALUE")]
    pub headers: Vec<String>,

    /// Suppress progress output.
    #[arg(long)]
    pub quiet: bool,

    /// Fetch the whole file over one connection instead of splitting it into
    /// concurrent range segments.
    #[arg(long)]
    pub single_stream: bool,
}

impl Cli {
    fn into_task(self) -> Result<RequestTask> {
        let mut headers = HashMap::new();
        for raw in &self.headers {
            let (k, v) = raw
                .split_once(':')
                .ok_or_else(|| anyhow::anyhow!("invalid --header value (expected KEY:VALUE): {raw}"))?;
            headers.insert(k.trim().to_string(), v.trim().to_string());
        }

        let save_dir = self
            .output_dir
            .or_else(|| std::env::current_dir().ok())
            .ok_or_else(|| anyhow::anyhow!("could not determine a save directory"))?;

        Ok(RequestTask {
            id: 1,
            batch_id: 0,
            kind: RequestKind::Download,
            url: self.url,
            save_dir: save_dir.to_string_lossy().into_owned(),
            save_file_name: self.output_name,
            thread_count: self.threads,
            show_progress: !self.quiet,
            headers,
            body: None,
        })
    }
}

/// Prints a single-line progress bar to stderr, refreshed in place.
struct CliProgressSink {
    start: Instant,
}

impl ProgressSink for CliProgressSink {
    fn on_progress(&self, _task_id: i64, _batch_id: i64, received: u64, total: u64) {
        let stats = ProgressStats {
            bytes_done: received,
            total_bytes: total,
            elapsed_secs: self.start.elapsed().as_secs_f64(),
            segments_done: 0,
            segment_count: 0,
        };
        let rate_mib = stats.bytes_per_sec() / 1_048_576.0;
        let done_mib = received as f64 / 1_048_576.0;
        if total > 0 {
            let total_mib = total as f64 / 1_048_576.0;
            let pct = stats.fraction() * 100.0;
            let eta = match stats.eta_secs() {
                Some(secs) => format!("{:.0}s", secs),
                None => "--".to_string(),
            };
            eprint!(
                "\r  {done_mib:.1} / {total_mib:.1} MiB ({pct:.1}%)  {rate_mib:.2} MiB/s  ETA {eta}   "
            );
        } else {
            eprint!("\r  {done_mib:.1} MiB  {rate_mib:.2} MiB/s   ");
        }
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let show_progress = !cli.quiet;
    let mt_opt_in = !cli.single_stream;
    let cfg = config::load_or_init().unwrap_or_default();
    tracing::debug!(?cfg, "loaded config");
    let task = cli.into_task()?;

    match select_request_kind(&task, mt_opt_in) {
        ConcreteRequest::MtDownload => {}
        other => anyhow::bail!("unsupported request kind for this engine: {other:?}"),
    }

    let state = Arc::new(Mutex::new(DownloadState::new(task.url.clone(), task.thread_count)));
    let progress: Arc<dyn ProgressSink> = Arc::new(CliProgressSink { start: Instant::now() });

    let control = Arc::new(JobControl::new());
    let task_id = task.id;
    let abort_token = control.register(task_id);

    let ctrlc_control = Arc::clone(&control);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, aborting");
            ctrlc_control.request_abort(task_id);
        }
    });

    let (reply, rx) = ReplyChannel::new();
    orchestrator::run_task(task, cfg, state, progress, abort_token, reply).await;
    control.unregister(task_id);
    let outcome = rx.await.expect("reply channel always receives exactly one outcome");

    if show_progress {
        eprintln!();
    }

    match outcome.error {
        None => {
            println!("done");
            Ok(())
        }
        Some(err) => {
            anyhow::bail!(err)
        }
    }
}
