//! Table formatting and output utilities
//!
//! This module provides functionality for formatting and displaying
//! tabular data with color support and various output formats.

use crate::error::{Result, WikiconfError};
use crossterm::style::{Color as CrosstermColor, Stylize};
use crossterm::terminal::size;
use serde::Serialize;
use tabled::{
    settings::{object::Rows, Alignment, Color, Modify, Padding, Style, Width},
    Table, Tabled,
};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

/// Color theme for console output
#[derive(Debug, Clone)]
pub struct ColorTheme {
    pub success: CrosstermColor,
    pub warning: CrosstermColor,
    pub error: CrosstermColor,
    pub accent: CrosstermColor,
}

impl Default for ColorTheme {
    fn default() -> Self {
        Self {
            success: CrosstermColor::Green,
            warning: CrosstermColor::Yellow,
            error: CrosstermColor::Red,
            accent: CrosstermColor::Magenta,
        }
    }
}

/// Table formatter with color support
pub struct TableFormatter {
    format: OutputFormat,
    no_color: bool,
}

impl TableFormatter {
    /// Create a new table formatter
    pub fn new(format: OutputFormat, no_color: bool) -> Self {
        Self { format, no_color }
    }

    /// Render rows in the configured format
    pub fn format_rows<T: Tabled + Serialize>(&self, data: &[T]) -> Result<String> {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    return Ok("No data to display".to_string());
                }
                Ok(self.format_as_table(data))
            }
            OutputFormat::Json => self.format_as_json(data),
            OutputFormat::Yaml => self.format_as_yaml(data),
        }
    }

    /// Render a single serializable document; tables fall back to JSON
    pub fn format_document<T: Serialize>(&self, value: &T) -> Result<String> {
        match self.format {
            OutputFormat::Yaml => self.format_as_yaml(value),
            OutputFormat::Json | OutputFormat::Table => self.format_as_json(value),
        }
    }

    fn format_as_table<T: Tabled>(&self, data: &[T]) -> String {
        let mut table = Table::new(data);

        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()))
            .with(Padding::new(1, 1, 0, 0));

        if !self.no_color {
            table.with(Modify::new(Rows::first()).with(Color::FG_BLUE));
        }

        // Auto-adjust width to terminal
        if let Ok((width, _)) = size() {
            table.with(Width::wrap(width as usize));
        }

        table.to_string()
    }

    fn format_as_json<T: Serialize + ?Sized>(&self, data: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(data)?)
    }

    fn format_as_yaml<T: Serialize + ?Sized>(&self, data: &T) -> Result<String> {
        serde_yaml::to_string(data)
            .map_err(|e| WikiconfError::serialization(format!("Failed to render YAML: {e}")))
    }
}

/// Display utilities for status messages
pub struct DisplayUtils {
    theme: ColorTheme,
    no_color: bool,
}

impl DisplayUtils {
    /// Create new display utilities
    pub fn new(no_color: bool) -> Self {
        Self {
            theme: ColorTheme::default(),
            no_color,
        }
    }

    /// Print a success message
    pub fn print_success(&self, message: &str) {
        println!("{}", self.status_line('✓', message, self.theme.success));
    }

    /// Print a warning message
    pub fn print_warning(&self, message: &str) {
        println!("{}", self.status_line('⚠', message, self.theme.warning));
    }

    /// Print an error message to stderr
    pub fn print_error(&self, message: &str) {
        eprintln!("{}", self.status_line('✗', message, self.theme.error));
    }

    fn status_line(&self, symbol: char, message: &str, color: CrosstermColor) -> String {
        if self.no_color {
            format!("{symbol} {message}")
        } else {
            format!("{symbol} {}", message.with(color))
        }
    }

    /// Format key-value pairs
    pub fn format_key_value_pairs(&self, pairs: &[(&str, &str)]) -> String {
        let max_key_length = pairs.iter().map(|(key, _)| key.len()).max().unwrap_or(0);

        pairs
            .iter()
            .map(|(key, value)| {
                let padded = format!("{key:max_key_length$}");
                let formatted_key = if self.no_color {
                    padded
                } else {
                    padded.with(self.theme.accent).bold().to_string()
                };
                format!("{formatted_key}: {value}")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Tabled, Serialize)]
    struct TestRow {
        key: String,
        value: String,
    }

    fn rows() -> Vec<TestRow> {
        vec![
            TestRow {
                key: "site_name".to_string(),
                value: "DockerWiki".to_string(),
            },
            TestRow {
                key: "default_skin".to_string(),
                value: "timeless".to_string(),
            },
        ]
    }

    #[test]
    fn test_table_formatting() {
        let formatter = TableFormatter::new(OutputFormat::Table, true);
        let result = formatter.format_rows(&rows()).unwrap();
        assert!(result.contains("site_name"));
        assert!(result.contains("timeless"));
    }

    #[test]
    fn test_empty_table() {
        let formatter = TableFormatter::new(OutputFormat::Table, true);
        let empty: Vec<TestRow> = Vec::new();
        assert_eq!(formatter.format_rows(&empty).unwrap(), "No data to display");
    }

    #[test]
    fn test_json_and_yaml_formatting() {
        let json = TableFormatter::new(OutputFormat::Json, true)
            .format_rows(&rows())
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["value"], "DockerWiki");

        let yaml = TableFormatter::new(OutputFormat::Yaml, true)
            .format_rows(&rows())
            .unwrap();
        assert!(yaml.contains("key: default_skin"));
    }

    #[test]
    fn test_status_lines() {
        let plain = DisplayUtils::new(true);
        assert_eq!(
            plain.status_line('✗', "server is required", plain.theme.error),
            "✗ server is required"
        );

        let colored = DisplayUtils::new(false);
        let line = colored.status_line('⚠', "debug enabled", colored.theme.warning);
        assert!(line.starts_with("⚠ "));
        assert!(line.contains("debug enabled"));
    }

    #[test]
    fn test_key_value_formatting() {
        let display = DisplayUtils::new(true);
        let pairs = vec![("Site", "DockerWiki"), ("Server", "http://localhost:8080")];

        let result = display.format_key_value_pairs(&pairs);
        assert!(result.contains("Site  : DockerWiki"));
        assert!(result.contains("Server: http://localhost:8080"));
    }
}
