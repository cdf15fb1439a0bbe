//! Output formatting utilities

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use risk_lib::models::{ModelUsed, RiskBand};
use risk_lib::training::QualityGrade;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Two-column row for key/value sections
#[derive(Tabled)]
pub struct FieldRow {
    #[tabled(rename = "Field")]
    pub field: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

impl FieldRow {
    pub fn new(field: impl Into<String>, value: impl ToString) -> Self {
        Self {
            field: field.into(),
            value: value.to_string(),
        }
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print rows as a rounded table
pub fn print_rows<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    println!("{}", Table::new(rows).with(Style::rounded()));
}

pub fn print_heading(title: &str) {
    println!("{}", title.bold());
    println!("{}", "=".repeat(50));
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a unit score as percentage
pub fn format_percent(value: f32) -> String {
    format!("{:.1}%", value * 100.0)
}

/// Color a risk score by its band
pub fn color_risk(risk: f32) -> String {
    let formatted = format!("{:.3} ({})", risk, RiskBand::classify(risk));
    match RiskBand::classify(risk) {
        RiskBand::Low => formatted.green().to_string(),
        RiskBand::Medium => formatted.yellow().to_string(),
        RiskBand::High => formatted.red().bold().to_string(),
    }
}

/// Color confidence based on value
pub fn color_confidence(confidence: f32) -> String {
    let formatted = format_percent(confidence);
    if confidence >= 0.8 {
        formatted.green().to_string()
    } else if confidence >= 0.7 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

pub fn color_grade(grade: QualityGrade) -> String {
    match grade {
        QualityGrade::Excellent => grade.as_str().green().to_string(),
        QualityGrade::Good => grade.as_str().yellow().to_string(),
        QualityGrade::NeedsImprovement => grade.as_str().red().to_string(),
    }
}

pub fn color_model_used(model_used: ModelUsed) -> String {
    match model_used {
        ModelUsed::Ml => model_used.as_str().green().to_string(),
        ModelUsed::Fallback => model_used.as_str().yellow().to_string(),
    }
}

/// Format an RFC 3339 timestamp for display
pub fn format_timestamp(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(0.5), "50.0%");
        assert_eq!(format_percent(0.987), "98.7%");
    }

    #[test]
    fn test_color_risk_names_band() {
        colored::control::set_override(false);
        assert_eq!(color_risk(0.1), "0.100 (low)");
        assert_eq!(color_risk(0.45), "0.450 (medium)");
        assert_eq!(color_risk(0.75), "0.750 (high)");
    }

    #[test]
    fn test_field_row() {
        let row = FieldRow::new("epochs", 42);
        assert_eq!(row.field, "epochs");
        assert_eq!(row.value, "42");
    }
}
