use pulse_cli::run_cli;

#[tokio::main]
async fn main() {
    if let Err(e) = run_cli().await {
        // Logging is not set up yet when configuration fails to load
        eprintln!("pulse: {}", e);

        std::process::exit(e.exit_code());
    }
}
