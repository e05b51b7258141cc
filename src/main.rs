use specforge::{cli, log_error, logger, ui};

#[tokio::main]
async fn main() {
    if let Err(e) = logger::init() {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    if let Err(e) = cli::main().await {
        log_error!("Run failed: {:#}", e);
        ui::print_error(&format!("Error: {e:#}"));
        std::process::exit(1);
    }
}
