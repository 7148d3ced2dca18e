use rangedl_core::logging;

mod cli;

#[tokio::main]
async fn main() {
    if logging::init_logging().is_err() {
        logging::init_logging_stderr();
    }

    if let Err(err) = cli::run().await {
        eprintln!("rangedl error: {:#}", err);
        std::process::exit(1);
    }
}
