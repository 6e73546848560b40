//! Structural edit commands: add, move, nudge and delete.

use outline::{
    ID, Payload,
    reorder::{Direction, MoveRequest},
};

use crate::backend::open_session;
use crate::cli::{AddArgs, DeleteArgs, MoveArgs, NudgeArgs, NudgeDirection};
use crate::output::{OutputFormat, print_outcome};

/// Run the `add` command
pub async fn add(args: &AddArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let session = open_session(&args.course).await?;
    let parent = args
        .parent
        .as_deref()
        .map_or_else(|| session.editor.tenant().course_id.clone(), ID::from);

    let id = session
        .editor
        .create_item(parent.clone(), Payload::titled(args.title.clone()))
        .await?;
    session.save().await?;

    match format {
        OutputFormat::Human => println!("Added {id} to {parent}"),
        OutputFormat::Json => {
            let value = serde_json::json!({ "id": id, "parent": parent });
            println!("{}", serde_json::to_string(&value)?);
        }
    }
    Ok(())
}

/// Run the `move` command
pub async fn move_item(
    args: &MoveArgs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = open_session(&args.course).await?;
    let item = ID::from(args.item.as_str());

    let tree = session.editor.snapshot();
    let source = tree
        .item(&item)
        .map(|i| i.parent.clone())
        .ok_or_else(|| format!("No item with id {item}"))?;
    let dest = args.to.as_deref().map_or_else(|| source.clone(), ID::from);

    let request = if dest == source {
        let from = tree
            .position(&item)
            .ok_or_else(|| format!("Item {item} is not listed in {source}"))?;
        MoveRequest::Within {
            container: source,
            from,
            to: args.index,
        }
    } else {
        MoveRequest::Across {
            source,
            dest,
            item,
            dest_index: args.index,
        }
    };

    let outcome = session.editor.request_move(request).await?;
    session.save().await?;
    print_outcome(&outcome, format)
}

/// Run the `nudge` command
pub async fn nudge(args: &NudgeArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let session = open_session(&args.course).await?;
    let direction = match args.direction {
        NudgeDirection::Up => Direction::Up,
        NudgeDirection::Down => Direction::Down,
    };

    let outcome = session
        .editor
        .request_nudge(ID::from(args.item.as_str()), direction)
        .await?;
    session.save().await?;
    print_outcome(&outcome, format)
}

/// Run the `delete` command
pub async fn delete(args: &DeleteArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let session = open_session(&args.course).await?;

    let outcome = session
        .editor
        .request_delete(ID::from(args.item.as_str()))
        .await?;
    session.save().await?;
    print_outcome(&outcome, format)
}
