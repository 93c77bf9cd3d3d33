// logging.rs
// Simple logging utility for the bingo draw server and operator console

use chrono::Local;

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Build a log line with the current local timestamp
pub fn format_line(level: LogLevel, message: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("{} - {} - {}", timestamp, level.as_str(), message)
}

/// Format and print a log message with timestamp
pub fn log_message(level: LogLevel, message: &str) {
    println!("{}", format_line(level, message));
}

pub fn log_info(message: &str) {
    log_message(LogLevel::Info, message);
}

pub fn log_warning(message: &str) {
    log_message(LogLevel::Warning, message);
}

pub fn log_error(message: &str) {
    log_message(LogLevel::Error, message);
}

/// Same as log_error but written to stderr
pub fn log_error_stderr(message: &str) {
    eprintln!("{}", format_line(LogLevel::Error, message));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line_layout() {
        let line = format_line(LogLevel::Warning, "ball 12 ignored");
        let parts: Vec<&str> = line.splitn(3, " - ").collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), "2024-01-01 00:00:00".len());
        assert_eq!(parts[1], "WARNING");
        assert_eq!(parts[2], "ball 12 ignored");
    }
}
