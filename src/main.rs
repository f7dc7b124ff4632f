use mintwatch::{
    arguments::{self, is_help_requested, is_run_enabled, print_debug_info, print_help},
    config,
    logger::{log, LogTag},
};

/// Main entry point for mintwatch
///
/// Routes execution based on command-line arguments:
/// - `--help`: Display help information and exit
/// - `--run`: Start the screener service
#[tokio::main]
async fn main() {
    if is_help_requested() {
        print_help();
        std::process::exit(0);
    }

    log(LogTag::System, "INFO", "🚀 mintwatch starting up...");
    print_debug_info();

    if !is_run_enabled() {
        log(LogTag::System, "ERROR", "No execution mode specified");
        print_help();
        std::process::exit(1);
    }

    if let Err(e) = config::load_config(arguments::config_path().as_deref()) {
        log(
            LogTag::System,
            "ERROR",
            &format!("Configuration error: {}", e),
        );
        std::process::exit(1);
    }

    match mintwatch::run::run_service().await {
        Ok(()) => {
            log(LogTag::System, "SUCCESS", "✅ mintwatch stopped cleanly");
        }
        Err(e) => {
            log(LogTag::System, "ERROR", &format!("❌ mintwatch failed: {}", e));
            std::process::exit(1);
        }
    }
}
