/// Batch Runs
///
/// Export and import runs process tables one at a time. In [`BatchMode::All`]
/// a failing table is recorded and the run moves on; in
/// [`BatchMode::Single`] the first failure aborts the run.
use crate::core::DatabaseError;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// Process every table and report failures at the end
    #[default]
    All,
    /// Stop at the first failing table
    Single,
}

/// Result of processing one table.
#[derive(Debug)]
pub struct TableOutcome {
    pub table: String,
    pub error: Option<DatabaseError>,
}

impl TableOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-table outcomes of a batch run, in processing order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<TableOutcome>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, table: &str) {
        self.outcomes.push(TableOutcome {
            table: table.to_string(),
            error: None,
        });
    }

    pub fn record_failure(&mut self, table: &str, error: DatabaseError) {
        warn!("{}: failed - {}", table, error);
        self.outcomes.push(TableOutcome {
            table: table.to_string(),
            error: Some(error),
        });
    }

    /// Tables processed without error.
    pub fn succeeded(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(|o| o.table.as_str())
            .collect()
    }

    /// Failed tables with their errors.
    pub fn failed(&self) -> Vec<(&str, &DatabaseError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error.as_ref().map(|e| (o.table.as_str(), e)))
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(TableOutcome::is_success)
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failed();
        write!(
            f,
            "{} table(s) processed, {} failed",
            self.outcomes.len(),
            failed.len()
        )?;
        for (table, error) in failed {
            write!(f, "\n  {table}: {error}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_collects_outcomes() {
        let mut report = BatchReport::new();
        report.record_success("jos_users");
        report.record_failure(
            "jos_content",
            DatabaseError::MissingResource {
                file: "jos_content.xml".to_string(),
            },
        );
        report.record_success("jos_menu");

        assert!(!report.is_success());
        assert_eq!(report.succeeded(), vec!["jos_users", "jos_menu"]);
        let failed = report.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "jos_content");

        let summary = report.to_string();
        assert!(summary.starts_with("3 table(s) processed, 1 failed"));
        assert!(summary.contains("jos_content: The jos_content.xml file does not exist."));
    }

    #[test]
    fn test_empty_report_is_success() {
        assert!(BatchReport::new().is_success());
        assert_eq!(BatchMode::default(), BatchMode::All);
    }
}
