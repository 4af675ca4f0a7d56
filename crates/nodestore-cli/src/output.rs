use anyhow::Result;
use serde::Serialize;
use tabled::Tabled;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl OutputFormat {
    pub fn from_str_arg(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Table,
        }
    }
}

/// Render rows as a table, or `full` as JSON.
///
/// Tables show the summary rows; JSON carries the complete records.
pub fn render_list<R, F>(rows: &[R], full: &[F], format: OutputFormat) -> Result<String>
where
    R: Tabled,
    F: Serialize,
{
    Ok(match format {
        OutputFormat::Table if rows.is_empty() => "(none)".to_string(),
        OutputFormat::Table => tabled::Table::new(rows)
            .with(tabled::settings::Style::rounded())
            .to_string(),
        OutputFormat::Json => serde_json::to_string_pretty(full)?,
    })
}

/// Render one record.
pub fn render_one<R, F>(row: &R, full: &F, format: OutputFormat) -> Result<String>
where
    R: Tabled,
    F: Serialize,
{
    Ok(match format {
        OutputFormat::Table => tabled::Table::new(std::iter::once(row))
            .with(tabled::settings::Style::rounded())
            .to_string(),
        OutputFormat::Json => serde_json::to_string_pretty(full)?,
    })
}
