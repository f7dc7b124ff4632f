use once_cell::sync::Lazy;
use std::env;
use std::sync::Mutex;

/// Snapshot of command line arguments, replaceable for tools and tests.
pub static CMD_ARGS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(env::args().collect()));

/// Set command arguments (used for tools and testing)
pub fn set_cmd_args(args: Vec<String>) {
    if let Ok(mut cmd_args) = CMD_ARGS.lock() {
        *cmd_args = args;
    }
}

fn has_flag(flag: &str) -> bool {
    if let Ok(args) = CMD_ARGS.lock() {
        args.iter().any(|a| a == flag)
    } else {
        false
    }
}

/// Value of `--flag <value>` if present.
pub fn flag_value(flag: &str) -> Option<String> {
    if let Ok(args) = CMD_ARGS.lock() {
        let pos = args.iter().position(|a| a == flag)?;
        args.get(pos + 1).cloned()
    } else {
        None
    }
}

pub fn is_help_requested() -> bool {
    has_flag("--help") || has_flag("-h")
}

pub fn is_run_enabled() -> bool {
    has_flag("--run")
}

/// Check if debug feed mode is enabled via command line args
pub fn is_debug_feed_enabled() -> bool {
    has_flag("--debug-feed")
}

/// Check if debug processor mode is enabled via command line args
pub fn is_debug_processor_enabled() -> bool {
    has_flag("--debug-processor")
}

/// Check if debug tracker mode is enabled via command line args
pub fn is_debug_tracker_enabled() -> bool {
    has_flag("--debug-tracker")
}

/// Check if debug cleanup mode is enabled via command line args
pub fn is_debug_cleanup_enabled() -> bool {
    has_flag("--debug-cleanup")
}

/// Check if debug trends mode is enabled via command line args
pub fn is_debug_trends_enabled() -> bool {
    has_flag("--debug-trends")
}

/// Check if debug platform detection mode is enabled via command line args
pub fn is_debug_platform_enabled() -> bool {
    has_flag("--debug-platform")
}

/// Path passed with `--config`, if any.
pub fn config_path() -> Option<String> {
    flag_value("--config")
}

/// Path passed with `--db`, if any. Overrides the configured store path.
pub fn db_path_override() -> Option<String> {
    flag_value("--db")
}

/// Print enabled debug modes at startup.
pub fn print_debug_info() {
    use crate::logger::{ log, LogTag };

    let modes: Vec<&str> = [
        ("feed", is_debug_feed_enabled()),
        ("processor", is_debug_processor_enabled()),
        ("tracker", is_debug_tracker_enabled()),
        ("cleanup", is_debug_cleanup_enabled()),
        ("trends", is_debug_trends_enabled()),
        ("platform", is_debug_platform_enabled()),
    ]
    .iter()
    .filter(|(_, on)| *on)
    .map(|(name, _)| *name)
    .collect();

    if !modes.is_empty() {
        log(
            LogTag::System,
            "DEBUG",
            &format!("Debug modes enabled: {}", modes.join(", ")),
        );
    }
}

/// Print help text and usage information.
pub fn print_help() {
    println!("mintwatch - streaming token screener");
    println!();
    println!("USAGE:");
    println!("    mintwatch --run [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --run                 Start the screener service");
    println!("    --config <path>       Configuration file (default: configs.json)");
    println!("    --db <path>           Override the time-series store path");
    println!("    --help, -h            Show this help");
    println!();
    println!("DEBUG:");
    println!("    --debug-feed          Log raw feed frames and reconnects");
    println!("    --debug-processor     Log validation and dedup decisions");
    println!("    --debug-tracker       Log per-token updates and index changes");
    println!("    --debug-cleanup       Log cleanup evaluation detail");
    println!("    --debug-trends        Log trend analysis detail");
    println!("    --debug-platform      Log platform detection detail");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_parsing() {
        set_cmd_args(vec![
            "mintwatch".to_string(),
            "--run".to_string(),
            "--config".to_string(),
            "custom.json".to_string(),
            "--debug-cleanup".to_string(),
        ]);

        assert!(is_run_enabled());
        assert!(is_debug_cleanup_enabled());
        assert!(!is_debug_feed_enabled());
        assert_eq!(config_path().as_deref(), Some("custom.json"));
        assert_eq!(flag_value("--db"), None);

        set_cmd_args(vec!["mintwatch".to_string()]);
    }
}
