//! Structural requests through the Editor against a healthy backend.

use outline::{
    backend::PersistenceBackend,
    EditorConfig, ID, Payload,
    notify::Notification,
    optimistic::ContainerState,
    reorder::{Direction, DropIntent, DropTarget, MoveRequest},
};

use crate::helpers::*;

#[tokio::test]
async fn test_open_loads_course_breadth_first() {
    let t = open_editor().await;

    assert_eq!(local_ids(&t.editor, "c"), vec!["m1", "m2", "m3"]);
    assert_eq!(local_ids(&t.editor, "m1"), vec!["x", "l", "y"]);
    assert_eq!(local_ids(&t.editor, "m2"), vec!["p", "q"]);
    assert_eq!(local_ids(&t.editor, "l"), vec!["r1"]);
    assert!(local_ids(&t.editor, "m3").is_empty());
    assert_eq!(t.editor.snapshot().item_count(), 9);
    t.editor.snapshot().check_invariants().unwrap();
}

#[tokio::test]
async fn test_reorder_modules_within_course() {
    let mut t = open_editor().await;

    let outcome = t
        .editor
        .request_move(MoveRequest::Within {
            container: ID::from("c"),
            from: 2,
            to: 0,
        })
        .await
        .unwrap();

    // m3, m1 and m2 all change position
    assert!(matches!(outcome, outline::CommitOutcome::Committed { writes: 3 }));
    assert_eq!(local_ids(&t.editor, "c"), vec!["m3", "m1", "m2"]);
    assert_eq!(backend_ids(&t.backend, "c").await, vec!["m3", "m1", "m2"]);
    assert_eq!(backend_ordinals(&t.backend, "c").await, vec![0, 1, 2]);
    assert_eq!(t.editor.container_state(&ID::from("c")), ContainerState::Stable);

    let notifications = drain(&mut t.notifications);
    assert!(matches!(
        notifications.as_slice(),
        [Notification::Committed { writes: 3, .. }]
    ));
}

#[tokio::test]
async fn test_move_lesson_across_modules() {
    let t = open_editor().await;

    let outcome = t
        .editor
        .request_move(MoveRequest::Across {
            source: ID::from("m1"),
            dest: ID::from("m2"),
            item: ID::from("l"),
            dest_index: 1,
        })
        .await
        .unwrap();

    assert!(outcome.is_committed());
    assert_eq!(local_ids(&t.editor, "m1"), vec!["x", "y"]);
    assert_eq!(local_ids(&t.editor, "m2"), vec!["p", "l", "q"]);
    assert_eq!(backend_ids(&t.backend, "m1").await, vec!["x", "y"]);
    assert_eq!(backend_ordinals(&t.backend, "m1").await, vec![0, 1]);
    assert_eq!(backend_ids(&t.backend, "m2").await, vec!["p", "l", "q"]);
    assert_eq!(backend_ordinals(&t.backend, "m2").await, vec![0, 1, 2]);

    // Resources travel with their lesson
    assert_eq!(local_ids(&t.editor, "l"), vec!["r1"]);
    assert_eq!(backend_ids(&t.backend, "l").await, vec!["r1"]);
    t.editor.snapshot().check_invariants().unwrap();
}

#[tokio::test]
async fn test_move_into_empty_module() {
    let t = open_editor().await;

    t.editor
        .request_move(MoveRequest::Across {
            source: ID::from("m2"),
            dest: ID::from("m3"),
            item: ID::from("p"),
            dest_index: 0,
        })
        .await
        .unwrap();

    assert_eq!(local_ids(&t.editor, "m3"), vec!["p"]);
    assert_eq!(local_ids(&t.editor, "m2"), vec!["q"]);
    assert_eq!(backend_ids(&t.backend, "m3").await, vec!["p"]);
    assert_eq!(backend_ordinals(&t.backend, "m2").await, vec![0]);
}

#[tokio::test]
async fn test_nudge_down_at_end_is_noop() {
    let mut t = open_editor().await;

    let outcome = t
        .editor
        .request_nudge(ID::from("y"), Direction::Down)
        .await
        .unwrap();

    assert!(outcome.is_noop());
    assert_eq!(local_ids(&t.editor, "m1"), vec!["x", "l", "y"]);
    assert!(drain(&mut t.notifications).is_empty());
}

#[tokio::test]
async fn test_nudge_swaps_neighbours() {
    let t = open_editor().await;

    let outcome = t
        .editor
        .request_nudge(ID::from("l"), Direction::Up)
        .await
        .unwrap();

    assert!(matches!(outcome, outline::CommitOutcome::Committed { writes: 2 }));
    assert_eq!(local_ids(&t.editor, "m1"), vec!["l", "x", "y"]);
    assert_eq!(backend_ids(&t.backend, "m1").await, vec!["l", "x", "y"]);
}

#[tokio::test]
async fn test_nudge_unknown_item_fails() {
    let t = open_editor().await;

    let err = t
        .editor
        .request_nudge(ID::from("missing"), Direction::Up)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_invalid_move_leaves_tree_untouched() {
    let mut t = open_editor().await;
    let before = t.editor.snapshot();

    // x is not in m2
    let err = t
        .editor
        .request_move(MoveRequest::Across {
            source: ID::from("m2"),
            dest: ID::from("m3"),
            item: ID::from("x"),
            dest_index: 0,
        })
        .await
        .unwrap_err();
    assert!(err.is_invalid_move());

    // Out of range source index
    let err = t
        .editor
        .request_move(MoveRequest::Within {
            container: ID::from("m1"),
            from: 9,
            to: 0,
        })
        .await
        .unwrap_err();
    assert!(err.is_invalid_move());

    assert_eq!(*t.editor.snapshot(), *before);
    assert!(drain(&mut t.notifications).is_empty());
}

#[tokio::test]
async fn test_drop_on_item_takes_its_place() {
    let t = open_editor().await;

    let outcome = t
        .editor
        .request_drop(DropIntent {
            item: ID::from("y"),
            source: ID::from("m1"),
            target: DropTarget::Item(ID::from("x")),
        })
        .await
        .unwrap();

    assert!(outcome.is_committed());
    assert_eq!(local_ids(&t.editor, "m1"), vec!["y", "x", "l"]);
}

#[tokio::test]
async fn test_drop_onto_own_position_is_noop() {
    let t = open_editor().await;

    let outcome = t
        .editor
        .request_drop(DropIntent {
            item: ID::from("l"),
            source: ID::from("m1"),
            target: DropTarget::Item(ID::from("l")),
        })
        .await
        .unwrap();
    assert!(outcome.is_noop());
}

#[tokio::test]
async fn test_delete_compacts_siblings_and_removes_subtree() {
    let t = open_editor().await;

    let outcome = t.editor.request_delete(ID::from("l")).await.unwrap();

    assert!(outcome.is_committed());
    assert_eq!(local_ids(&t.editor, "m1"), vec!["x", "y"]);
    assert!(t.editor.snapshot().item(&ID::from("r1")).is_none());
    assert_eq!(backend_ids(&t.backend, "m1").await, vec!["x", "y"]);
    assert_eq!(backend_ordinals(&t.backend, "m1").await, vec![0, 1]);
    assert!(backend_ids(&t.backend, "l").await.is_empty());
    t.editor.snapshot().check_invariants().unwrap();
}

#[tokio::test]
async fn test_create_item_appends_to_container() {
    let t = open_editor().await;

    let id = t
        .editor
        .create_item(ID::from("m2"), Payload::titled("New lesson"))
        .await
        .unwrap();

    let snapshot = t.editor.snapshot();
    let created = snapshot.item(&id).unwrap();
    assert_eq!(created.ordinal, 2);
    assert_eq!(created.payload.title, "New lesson");
    assert_eq!(backend_ids(&t.backend, "m2").await, vec!["p", "q", id.as_str()]);
    assert_eq!(t.editor.container_state(&ID::from("m2")), ContainerState::Stable);
}

#[tokio::test]
async fn test_create_in_unknown_container_fails() {
    let t = open_editor().await;

    let err = t
        .editor
        .create_item(ID::from("nowhere"), Payload::titled("Lost"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_subscribers_see_optimistic_tree() {
    let t = open_editor().await;
    let mut rx = t.editor.subscribe();
    rx.borrow_and_update();

    t.editor
        .request_nudge(ID::from("x"), Direction::Down)
        .await
        .unwrap();

    assert!(rx.has_changed().unwrap());
    let published = rx.borrow_and_update().clone();
    let ids: Vec<_> = published
        .siblings(&ID::from("m1"))
        .iter()
        .map(|i| i.id.to_string())
        .collect();
    assert_eq!(ids, vec!["l", "x", "y"]);
}

#[tokio::test]
async fn test_reload_after_commit_reconciles() {
    let config = EditorConfig {
        reload_after_commit: true,
        ..Default::default()
    };
    let mut t = open_with(test_backend().await, config).await;

    t.editor
        .request_nudge(ID::from("p"), Direction::Down)
        .await
        .unwrap();

    assert_eq!(local_ids(&t.editor, "m2"), vec!["q", "p"]);
    assert_eq!(t.editor.container_state(&ID::from("m2")), ContainerState::Stable);
    let notifications = drain(&mut t.notifications);
    assert!(matches!(
        notifications.as_slice(),
        [Notification::Committed { .. }, Notification::Reconciled { .. }]
    ));
}

#[tokio::test]
async fn test_reload_picks_up_external_changes() {
    let t = open_editor().await;

    let created = t
        .backend
        .create_item(&ctx(), &ID::from("m3"), outline::ItemKind::Lesson, Payload::titled("Ext"))
        .await
        .unwrap();
    assert!(local_ids(&t.editor, "m3").is_empty());

    t.editor.reload().await.unwrap();
    assert_eq!(local_ids(&t.editor, "m3"), vec![created.to_string()]);
}
