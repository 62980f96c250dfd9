//! Main entry point for the tarlz4 CLI app

fn main() -> std::process::ExitCode {
    if let Err(e) = tarlz4::cli_runner::run_cli_app() {
        if e.downcast_ref::<clap::Error>().is_none() {
            eprintln!("Error: {}", e);
        }
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}
