//! Pointer input driving the editor end to end.

use outline::{
    ID,
    gesture::{GestureEvent, GestureInput, Position},
    reorder::DropTarget,
};

use crate::helpers::*;

fn down(item: &str, source: &str) -> GestureInput {
    GestureInput::PointerDown {
        item: ID::from(item),
        source: ID::from(source),
        position: Position::new(0, 0),
    }
}

fn over_item(id: &str) -> Option<DropTarget> {
    Some(DropTarget::Item(ID::from(id)))
}

#[tokio::test]
async fn test_drag_across_modules_commits() {
    let t = open_editor().await;

    t.editor.handle_pointer(down("l", "m1")).await.unwrap();
    let moved = t
        .editor
        .handle_pointer(GestureInput::PointerMove {
            position: Position::new(0, 40),
            over: over_item("q"),
        })
        .await
        .unwrap();
    assert!(matches!(
        moved.events.as_slice(),
        [GestureEvent::DragStart { .. }, GestureEvent::HoverChanged { .. }]
    ));
    assert!(moved.commit.is_none());

    let released = t
        .editor
        .handle_pointer(GestureInput::PointerUp {
            position: Position::new(0, 40),
            over: over_item("q"),
        })
        .await
        .unwrap();

    assert!(released.commit.unwrap().is_committed());
    assert_eq!(local_ids(&t.editor, "m2"), vec!["p", "l", "q"]);
    assert_eq!(backend_ids(&t.backend, "m2").await, vec!["p", "l", "q"]);
}

#[tokio::test]
async fn test_drop_on_module_header_appends() {
    let t = open_editor().await;

    t.editor.handle_pointer(down("x", "m1")).await.unwrap();
    let released = t
        .editor
        .handle_pointer(GestureInput::PointerUp {
            position: Position::new(30, 30),
            over: over_item("m3"),
        })
        .await
        .unwrap();

    // Moving far enough within one input still counts as a click
    assert!(matches!(
        released.events.as_slice(),
        [GestureEvent::Click { .. }]
    ));
    assert!(released.commit.is_none());

    t.editor.handle_pointer(down("x", "m1")).await.unwrap();
    t.editor
        .handle_pointer(GestureInput::PointerMove {
            position: Position::new(30, 30),
            over: over_item("m3"),
        })
        .await
        .unwrap();
    let released = t
        .editor
        .handle_pointer(GestureInput::PointerUp {
            position: Position::new(30, 30),
            over: over_item("m3"),
        })
        .await
        .unwrap();

    assert!(released.commit.unwrap().is_committed());
    assert_eq!(local_ids(&t.editor, "m3"), vec!["x"]);
    assert_eq!(local_ids(&t.editor, "m1"), vec!["l", "y"]);
}

#[tokio::test]
async fn test_escape_cancels_without_writes() {
    let (mut t, faulty) = open_faulty().await;

    t.editor.handle_pointer(down("l", "m1")).await.unwrap();
    t.editor
        .handle_pointer(GestureInput::PointerMove {
            position: Position::new(20, 0),
            over: over_item("p"),
        })
        .await
        .unwrap();
    let cancelled = t.editor.handle_pointer(GestureInput::Escape).await.unwrap();

    assert!(matches!(
        cancelled.events.as_slice(),
        [GestureEvent::Cancelled { .. }]
    ));
    assert!(cancelled.commit.is_none());
    assert!(faulty.applied().is_empty());
    assert_eq!(local_ids(&t.editor, "m1"), vec!["x", "l", "y"]);
    assert!(drain(&mut t.notifications).is_empty());
}

#[tokio::test]
async fn test_release_over_nothing_cancels() {
    let t = open_editor().await;

    t.editor.handle_pointer(down("p", "m2")).await.unwrap();
    t.editor
        .handle_pointer(GestureInput::PointerMove {
            position: Position::new(0, 10),
            over: None,
        })
        .await
        .unwrap();
    let released = t
        .editor
        .handle_pointer(GestureInput::PointerUp {
            position: Position::new(0, 10),
            over: None,
        })
        .await
        .unwrap();

    assert!(released.commit.is_none());
    assert_eq!(local_ids(&t.editor, "m2"), vec!["p", "q"]);
}

#[tokio::test]
async fn test_cancel_gesture_resets_drag() {
    let t = open_editor().await;

    t.editor.handle_pointer(down("p", "m2")).await.unwrap();
    t.editor
        .handle_pointer(GestureInput::PointerMove {
            position: Position::new(0, 10),
            over: over_item("q"),
        })
        .await
        .unwrap();
    t.editor.cancel_gesture();

    // Without an active drag a release is ignored
    let released = t
        .editor
        .handle_pointer(GestureInput::PointerUp {
            position: Position::new(0, 10),
            over: over_item("q"),
        })
        .await
        .unwrap();
    assert!(released.events.is_empty());
    assert!(released.commit.is_none());
}

#[tokio::test]
async fn test_dropping_resource_on_module_is_cancelled() {
    let t = open_editor().await;

    t.editor.handle_pointer(down("r1", "l")).await.unwrap();
    t.editor
        .handle_pointer(GestureInput::PointerMove {
            position: Position::new(0, 10),
            over: over_item("m2"),
        })
        .await
        .unwrap();
    let released = t
        .editor
        .handle_pointer(GestureInput::PointerUp {
            position: Position::new(0, 10),
            over: over_item("m2"),
        })
        .await
        .unwrap();

    assert!(matches!(
        released.events.as_slice(),
        [GestureEvent::Cancelled { item }] if item == &ID::from("r1")
    ));
    assert!(released.commit.is_none());
    assert_eq!(local_ids(&t.editor, "l"), vec!["r1"]);
}

#[tokio::test]
async fn test_drop_without_net_change_is_cancelled() {
    let (t, faulty) = open_faulty().await;
    let m1 = Some(DropTarget::Container(ID::from("m1")));

    // y is already last in m1, so appending it there changes nothing
    t.editor.handle_pointer(down("y", "m1")).await.unwrap();
    t.editor
        .handle_pointer(GestureInput::PointerMove {
            position: Position::new(0, 10),
            over: m1.clone(),
        })
        .await
        .unwrap();
    let released = t
        .editor
        .handle_pointer(GestureInput::PointerUp {
            position: Position::new(0, 10),
            over: m1,
        })
        .await
        .unwrap();

    assert!(matches!(
        released.events.as_slice(),
        [GestureEvent::Cancelled { item }] if item == &ID::from("y")
    ));
    assert!(released.commit.is_none());
    assert!(faulty.applied().is_empty());
    assert_eq!(local_ids(&t.editor, "m1"), vec!["x", "l", "y"]);
}
