//! The `examdesk result` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use examdesk_client::{load_config_from, HttpBackend};
use examdesk_core::model::{AttemptId, AttemptResult};
use examdesk_core::traits::ExamBackend;

pub async fn execute(attempt: AttemptId, format: String, config: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config.as_deref())?;
    let backend = HttpBackend::new(&config)?;
    print_result(&backend, attempt, &format).await
}

/// Fetch and print the result of a submitted attempt.
pub async fn print_result(backend: &dyn ExamBackend, attempt: AttemptId, format: &str) -> Result<()> {
    let result = backend
        .fetch_result(attempt)
        .await
        .with_context(|| format!("failed to fetch results for attempt {attempt}"))?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => println!("{}", render(&result)),
    }
    Ok(())
}

fn render(result: &AttemptResult) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Exam", "Score", "Correct", "Percentage", "Result", "Time"]);
    table.add_row(vec![
        Cell::new(&result.exam_title),
        Cell::new(format!("{:.2}", result.score)),
        Cell::new(format!(
            "{}/{}",
            result.correct_answers, result.total_questions
        )),
        Cell::new(format!("{:.1}%", result.percentage_score)),
        Cell::new(if result.passed { "PASSED" } else { "FAILED" }),
        Cell::new(match result.time_taken_minutes {
            Some(minutes) => format!("{minutes:.1} min"),
            None => "-".to_string(),
        }),
    ]);
    table
}
