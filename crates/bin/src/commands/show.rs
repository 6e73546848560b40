//! Show command - prints the course tree in sibling order.

use crate::backend::{backend_label, open_session};
use crate::cli::ShowArgs;
use crate::output::{OutputFormat, print_table};

/// Run the show command
pub async fn run(args: &ShowArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let session = open_session(&args.course).await?;
    let tree = session.editor.snapshot();
    let items = tree.walk();

    match format {
        OutputFormat::Human => {
            println!(
                "Course {} ({}, {} items)",
                session.editor.tenant(),
                backend_label(&args.course),
                items.len()
            );
            if items.is_empty() {
                println!("No items yet. Add one with `outline add <TITLE>`.");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = items
                .iter()
                .map(|(depth, item)| {
                    vec![
                        format!("{}{}", "  ".repeat(*depth), item.payload.title),
                        item.kind.to_string(),
                        item.ordinal.to_string(),
                        item.id.to_string(),
                    ]
                })
                .collect();
            print_table(&["TITLE", "KIND", "POS", "ID"], &rows);
        }
        OutputFormat::Json => {
            let entries: Vec<_> = items
                .iter()
                .map(|(depth, item)| {
                    serde_json::json!({
                        "depth": depth,
                        "item": item,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string(&entries)?);
        }
    }

    Ok(())
}
