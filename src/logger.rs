/// Set to false to hide date in logs
const LOG_SHOW_DATE: bool = false;
/// Set to false to hide time in logs
const LOG_SHOW_TIME: bool = true;

/// Fixed column widths for aligned log output
const TAG_WIDTH: usize = 9;
const LOG_TYPE_WIDTH: usize = 10;
const BRACKET_SPACE_WIDTH: usize = 3;
const TOTAL_PREFIX_WIDTH: usize = TAG_WIDTH + LOG_TYPE_WIDTH + BRACKET_SPACE_WIDTH * 2;

/// Maximum line length before wrapping
const MAX_LINE_LENGTH: usize = 150;

use chrono::Local;
use colored::*;

/// Log tags for categorizing log messages by subsystem.
#[derive(Debug, Clone)]
pub enum LogTag {
    Feed,
    Processor,
    Tracker,
    Cleanup,
    Trend,
    Platform,
    Database,
    System,
    Other(String),
}

impl LogTag {
    fn label(&self) -> &str {
        match self {
            LogTag::Feed => "FEED",
            LogTag::Processor => "PROCESS",
            LogTag::Tracker => "TRACKER",
            LogTag::Cleanup => "CLEANUP",
            LogTag::Trend => "TREND",
            LogTag::Platform => "PLATFORM",
            LogTag::Database => "DATABASE",
            LogTag::System => "SYSTEM",
            LogTag::Other(s) => s,
        }
    }

    fn colored_label(&self) -> ColoredString {
        let padded = format!("{:<width$}", self.label(), width = TAG_WIDTH);
        match self {
            LogTag::Feed => padded.bright_cyan().bold(),
            LogTag::Processor => padded.bright_blue().bold(),
            LogTag::Tracker => padded.bright_green().bold(),
            LogTag::Cleanup => padded.bright_red().bold(),
            LogTag::Trend => padded.bright_magenta().bold(),
            LogTag::Platform => padded.bright_yellow().bold(),
            LogTag::Database => padded.cyan().bold(),
            LogTag::System => padded.bright_yellow().bold(),
            LogTag::Other(_) => padded.white().bold(),
        }
    }
}

impl std::fmt::Display for LogTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.colored_label())
    }
}

/// Logs a message with time, tag, log type, and message.
pub fn log(tag: LogTag, log_type: &str, message: &str) {
    let now = Local::now();
    let date = now.format("%Y-%m-%d").to_string();
    let time = now.format("%H:%M:%S").to_string();
    let mut prefix = String::new();
    if LOG_SHOW_DATE && LOG_SHOW_TIME {
        prefix = format!("{} {} ", date, time);
    } else if LOG_SHOW_DATE {
        prefix = format!("{} ", date);
    } else if LOG_SHOW_TIME {
        prefix = format!("{} ", time);
    }
    let prefix = if !prefix.is_empty() {
        prefix.dimmed().to_string()
    } else {
        String::new()
    };

    let tag_str = tag.colored_label();

    // Fixed-width log type
    let padded_type = format!("{:<width$}", log_type, width = LOG_TYPE_WIDTH);
    let log_type_str = match log_type.to_uppercase().as_str() {
        "ERROR" => padded_type.bright_red().bold(),
        "WARN" | "WARNING" => padded_type.bright_yellow().bold(),
        "SUCCESS" => padded_type.bright_green().bold(),
        "INFO" => padded_type.bright_blue().bold(),
        "DEBUG" => padded_type.bright_black().bold(),
        "UPDATE" | "TRACK" => padded_type.bright_cyan().bold(),
        "UNTRACK" | "RUGGED" => padded_type.bright_red().bold(),
        "ALERT" => padded_type.bright_magenta().bold(),
        "PRICE" | "TREND" => padded_type.bright_blue().bold(),
        "STATS" | "MAINT" => padded_type.bright_black().bold(),
        _ => padded_type.white().bold(),
    };

    let base_line = format!("{}[{}] [{}] ", prefix, tag_str, log_type_str);

    let base_length = strip_ansi_codes(&base_line)
        .len()
        .max(TOTAL_PREFIX_WIDTH + prefix.len());
    let available_space = if MAX_LINE_LENGTH > base_length {
        MAX_LINE_LENGTH - base_length
    } else {
        50
    };

    let message_chunks = wrap_text(message, available_space);

    println!("{}{}", base_line, message_chunks[0].bright_white());

    if message_chunks.len() > 1 {
        let continuation_prefix =
            " ".repeat(strip_ansi_codes(&base_line).len().min(TOTAL_PREFIX_WIDTH + 9));
        for chunk in &message_chunks[1..] {
            println!("{}{}", continuation_prefix, chunk.bright_white());
        }
    }
}

/// Convenience wrappers for the common log types.
pub fn info(tag: LogTag, message: &str) {
    log(tag, "INFO", message);
}

pub fn warn(tag: LogTag, message: &str) {
    log(tag, "WARN", message);
}

pub fn error(tag: LogTag, message: &str) {
    log(tag, "ERROR", message);
}

/// Helper function to remove ANSI color codes for length calculation
fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::new();
    let mut in_escape = false;

    for ch in text.chars() {
        if ch == '\x1b' {
            in_escape = true;
        } else if in_escape && ch == 'm' {
            in_escape = false;
        } else if !in_escape {
            result.push(ch);
        }
    }
    result
}

/// Helper function to wrap text at word boundaries
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if text.len() <= max_width {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + word.len() + 1 <= max_width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(current_line);
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    lines
}
