//! Output formatting helpers for human-readable and JSON output.

use outline::{CommitOutcome, persistence::CommitError};

pub use crate::cli::Format as OutputFormat;

/// Print a table with aligned columns in human-readable format.
///
/// `headers` and each row in `rows` must have the same length.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    if rows.is_empty() {
        return;
    }

    let col_count = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(col_count) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let format_row = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    println!("{}", format_row(headers.to_vec()));
    for row in rows {
        println!(
            "{}",
            format_row(row.iter().take(col_count).map(String::as_str).collect())
        );
    }
}

fn failure_json(cause: &CommitError) -> serde_json::Value {
    serde_json::json!({
        "error": cause.to_string(),
        "partial": cause.is_partial(),
        "applied": cause.applied(),
        "failed_write": cause.failed_write(),
    })
}

/// Print the result of a structural change.
///
/// Returns an error for rolled back changes so the process exits non-zero.
pub fn print_outcome(
    outcome: &CommitOutcome,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Human => match outcome {
            CommitOutcome::NoOp => println!("Nothing to change."),
            CommitOutcome::Committed { writes } => println!("Saved ({writes} writes)."),
            CommitOutcome::RolledBack { reconciled, cause } => {
                println!("Change was undone: {cause}");
                if !reconciled {
                    println!("Could not refresh from storage; run `outline show` to check.");
                }
            }
        },
        OutputFormat::Json => {
            let value = match outcome {
                CommitOutcome::NoOp => serde_json::json!({ "status": "noop" }),
                CommitOutcome::Committed { writes } => {
                    serde_json::json!({ "status": "committed", "writes": writes })
                }
                CommitOutcome::RolledBack { reconciled, cause } => serde_json::json!({
                    "status": "rolled_back",
                    "reconciled": reconciled,
                    "cause": failure_json(cause),
                }),
            };
            println!("{}", serde_json::to_string(&value)?);
        }
    }

    match outcome {
        CommitOutcome::RolledBack { cause, .. } => Err(cause.to_string().into()),
        _ => Ok(()),
    }
}
