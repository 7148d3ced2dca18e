pub mod client;
pub mod config;
pub mod control;
pub mod error;
pub mod fetch_head;
pub mod logging;
pub mod orchestrator;
pub mod progress;
pub mod reply;
pub mod segmenter;
pub mod storage;
pub mod task;
pub mod url_model;
pub mod worker;
