//! Write failures, rollback and reconciliation, plus per-container busy
//! tracking while commits are in flight.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use outline::{
    CommitOutcome, Editor, EditorConfig, ID, ItemKind, OrderedItem, Payload, TenantContext,
    backend::{PersistenceBackend, Write, WriteKind},
    notify::Notification,
    optimistic::ContainerState,
    persistence::CommitError,
    reorder::{Direction, MoveRequest},
};

use crate::helpers::*;

fn move_l_to_m2() -> MoveRequest {
    MoveRequest::Across {
        source: ID::from("m1"),
        dest: ID::from("m2"),
        item: ID::from("l"),
        dest_index: 1,
    }
}

/// Yields until `container` reaches `state`.
async fn wait_for_state(editor: &Editor, container: &str, state: ContainerState) {
    let id = ID::from(container);
    tokio::time::timeout(Duration::from_secs(5), async {
        while editor.container_state(&id) != state {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("container never reached the expected state");
}

#[tokio::test]
async fn test_first_write_failure_restores_previous_order() {
    let (mut t, faulty) = open_faulty().await;
    faulty.fail_once("q", WriteKind::Ordinal);

    let outcome = t.editor.request_move(move_l_to_m2()).await.unwrap();

    match outcome {
        CommitOutcome::RolledBack { reconciled, cause } => {
            assert!(reconciled);
            assert!(matches!(cause, CommitError::TransientWrite { .. }));
            assert_eq!(
                cause.failed_write(),
                &Write::UpdateOrdinal {
                    item: ID::from("q"),
                    ordinal: 2
                }
            );
        }
        other => panic!("expected rollback, got {other:?}"),
    }

    assert!(faulty.applied().is_empty());
    assert_eq!(local_ids(&t.editor, "m1"), vec!["x", "l", "y"]);
    assert_eq!(local_ids(&t.editor, "m2"), vec!["p", "q"]);
    assert_eq!(t.editor.container_state(&ID::from("m1")), ContainerState::Stable);
    assert_eq!(t.editor.container_state(&ID::from("m2")), ContainerState::Stable);
    assert!(t.editor.needs_reconciliation().is_empty());

    let notifications = drain(&mut t.notifications);
    assert!(matches!(
        notifications.as_slice(),
        [
            Notification::CommitFailed { partial: false, .. },
            Notification::Reconciled { .. }
        ]
    ));
}

#[tokio::test]
async fn test_partial_failure_restores_pre_move_order() {
    let (mut t, faulty) = open_faulty().await;
    // q's ordinal and l's reparent land, y's compaction does not
    faulty.fail_once("y", WriteKind::Ordinal);

    let outcome = t.editor.request_move(move_l_to_m2()).await.unwrap();

    let CommitOutcome::RolledBack { reconciled, cause } = outcome else {
        panic!("expected rollback");
    };
    assert!(reconciled);
    assert!(cause.is_partial());
    assert_eq!(cause.applied(), 2);

    // The two applied writes were undone in the backend
    let applied = faulty.applied();
    assert!(applied.contains(&Write::UpdateParent {
        item: ID::from("l"),
        parent: ID::from("m1"),
    }));
    assert!(applied.contains(&Write::UpdateOrdinal {
        item: ID::from("q"),
        ordinal: 1,
    }));

    for (container, ids) in [("m1", vec!["x", "l", "y"]), ("m2", vec!["p", "q"])] {
        assert_eq!(local_ids(&t.editor, container), ids);
        assert_eq!(backend_ids(&t.backend, container).await, ids);
        assert_eq!(
            backend_ordinals(&t.backend, container).await,
            (0..ids.len()).collect::<Vec<_>>()
        );
    }
    assert_eq!(local_ids(&t.editor, "l"), vec!["r1"]);
    t.editor.snapshot().check_invariants().unwrap();
    assert!(t.editor.needs_reconciliation().is_empty());

    let notifications = drain(&mut t.notifications);
    assert!(matches!(
        notifications.as_slice(),
        [
            Notification::CommitFailed { partial: true, .. },
            Notification::Reconciled { .. }
        ]
    ));
}

#[tokio::test]
async fn test_partial_failure_within_container_restores_order() {
    let (t, faulty) = open_faulty().await;
    // m3 moves to the front first, then m1's shift fails
    faulty.fail_once("m1", WriteKind::Ordinal);

    let outcome = t
        .editor
        .request_move(MoveRequest::Within {
            container: ID::from("c"),
            from: 2,
            to: 0,
        })
        .await
        .unwrap();

    let CommitOutcome::RolledBack { reconciled, cause } = outcome else {
        panic!("expected rollback");
    };
    assert!(reconciled);
    assert!(cause.is_partial());

    assert_eq!(local_ids(&t.editor, "c"), vec!["m1", "m2", "m3"]);
    assert_eq!(backend_ids(&t.backend, "c").await, vec!["m1", "m2", "m3"]);
    assert_eq!(backend_ordinals(&t.backend, "c").await, vec![0, 1, 2]);
    t.editor.snapshot().check_invariants().unwrap();

    // Later minimal commits line up with the backend again
    let outcome = t
        .editor
        .request_nudge(ID::from("m3"), Direction::Up)
        .await
        .unwrap();
    assert!(outcome.is_committed());
    assert_eq!(backend_ids(&t.backend, "c").await, vec!["m1", "m3", "m2"]);
    assert_eq!(backend_ordinals(&t.backend, "c").await, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_reconcile_renumbers_backend_gaps() {
    let backend = test_backend().await;
    let t = open_with(
        backend.clone(),
        EditorConfig {
            reload_after_commit: true,
            ..EditorConfig::default()
        },
    )
    .await;
    // Another writer left a gap after y
    backend
        .update_ordinal(&ctx(), &ID::from("y"), 7)
        .await
        .unwrap();

    let outcome = t
        .editor
        .request_move(MoveRequest::Within {
            container: ID::from("m1"),
            from: 0,
            to: 1,
        })
        .await
        .unwrap();

    assert!(outcome.is_committed());
    assert_eq!(backend_ids(&t.backend, "m1").await, vec!["l", "x", "y"]);
    assert_eq!(backend_ordinals(&t.backend, "m1").await, vec![0, 1, 2]);
    assert_eq!(local_ids(&t.editor, "m1"), vec!["l", "x", "y"]);
}

#[tokio::test]
async fn test_partial_failure_before_reparent_keeps_item_in_source() {
    let (t, faulty) = open_faulty().await;
    faulty.fail_once("l", WriteKind::Parent);

    let outcome = t.editor.request_move(move_l_to_m2()).await.unwrap();
    assert!(outcome.is_rolled_back());

    // Only q's ordinal reached the backend, and it was put back
    assert_eq!(
        faulty.applied(),
        vec![
            Write::UpdateOrdinal {
                item: ID::from("q"),
                ordinal: 2,
            },
            Write::UpdateOrdinal {
                item: ID::from("q"),
                ordinal: 1,
            },
        ]
    );
    assert_eq!(local_ids(&t.editor, "m1"), vec!["x", "l", "y"]);
    assert_eq!(local_ids(&t.editor, "m2"), vec!["p", "q"]);
    assert_eq!(backend_ordinals(&t.backend, "m2").await, vec![0, 1]);
    t.editor.snapshot().check_invariants().unwrap();
}

#[tokio::test]
async fn test_failed_reconcile_is_retried() {
    let (mut t, faulty) = open_faulty().await;
    faulty.fail_once("q", WriteKind::Ordinal);
    faulty.set_fail_fetches(true);

    let outcome = t.editor.request_move(move_l_to_m2()).await.unwrap();
    assert!(matches!(
        outcome,
        CommitOutcome::RolledBack {
            reconciled: false,
            ..
        }
    ));

    // The snapshot restore already happened
    assert_eq!(local_ids(&t.editor, "m1"), vec!["x", "l", "y"]);
    let mut flagged = t.editor.needs_reconciliation();
    flagged.sort();
    assert_eq!(flagged, vec![ID::from("m1"), ID::from("m2")]);
    assert_eq!(t.editor.container_state(&ID::from("m1")), ContainerState::Stable);

    // Still failing
    assert!(!t.editor.reconcile_pending().await);
    assert_eq!(t.editor.needs_reconciliation().len(), 2);

    faulty.heal();
    assert!(t.editor.reconcile_pending().await);
    assert!(t.editor.needs_reconciliation().is_empty());
    assert!(t.editor.reconcile_pending().await);

    let notifications = drain(&mut t.notifications);
    assert!(matches!(
        notifications.as_slice(),
        [
            Notification::CommitFailed { .. },
            Notification::ReconcileFailed { .. },
            Notification::ReconcileFailed { .. },
            Notification::Reconciled { .. }
        ]
    ));
}

#[tokio::test]
async fn test_atomic_batch_failure_applies_nothing() {
    let (t, faulty) = open_faulty().await;
    if !faulty.inner().supports_atomic_batch() {
        return;
    }
    faulty.set_atomic_batch(true);
    faulty.fail_once("y", WriteKind::Ordinal);

    let outcome = t.editor.request_move(move_l_to_m2()).await.unwrap();

    let CommitOutcome::RolledBack { reconciled, cause } = outcome else {
        panic!("expected rollback");
    };
    assert!(reconciled);
    assert!(!cause.is_partial());
    assert!(faulty.applied().is_empty());
    assert_eq!(backend_ids(&t.backend, "m1").await, vec!["x", "l", "y"]);
    assert_eq!(backend_ids(&t.backend, "m2").await, vec!["p", "q"]);
    assert_eq!(local_ids(&t.editor, "m2"), vec!["p", "q"]);
}

#[tokio::test]
async fn test_atomic_batch_commit() {
    let (t, faulty) = open_faulty().await;
    if !faulty.inner().supports_atomic_batch() {
        return;
    }
    faulty.set_atomic_batch(true);

    let outcome = t.editor.request_move(move_l_to_m2()).await.unwrap();

    assert!(outcome.is_committed());
    assert_eq!(faulty.applied().len(), 3);
    assert_eq!(backend_ids(&t.backend, "m2").await, vec!["p", "l", "q"]);
}

#[tokio::test]
async fn test_failed_delete_restores_subtree() {
    let (t, faulty) = open_faulty().await;
    faulty.fail_writes_to("l");

    let outcome = t.editor.request_delete(ID::from("l")).await.unwrap();
    assert!(outcome.is_rolled_back());

    assert_eq!(local_ids(&t.editor, "m1"), vec!["x", "l", "y"]);
    assert_eq!(local_ids(&t.editor, "l"), vec!["r1"]);
    t.editor.snapshot().check_invariants().unwrap();
}

#[tokio::test]
async fn test_failed_create_leaves_tree_unchanged() {
    let (mut t, faulty) = open_faulty().await;
    faulty.fail_next_writes(1);

    let err = t
        .editor
        .create_item(ID::from("m2"), Payload::titled("Doomed"))
        .await
        .unwrap_err();

    assert!(err.is_write_failure());
    assert_eq!(local_ids(&t.editor, "m2"), vec!["p", "q"]);
    assert_eq!(t.editor.container_state(&ID::from("m2")), ContainerState::Stable);
    assert!(matches!(
        drain(&mut t.notifications).as_slice(),
        [Notification::CommitFailed { .. }]
    ));
}

/// Forwards to another backend but reports an id that is already in use for
/// every item it creates.
struct ReusedIdBackend {
    inner: Arc<dyn PersistenceBackend>,
}

#[async_trait]
impl PersistenceBackend for ReusedIdBackend {
    async fn list_siblings(
        &self,
        ctx: &TenantContext,
        container: &ID,
    ) -> outline::Result<Vec<OrderedItem>> {
        self.inner.list_siblings(ctx, container).await
    }

    async fn update_ordinal(
        &self,
        ctx: &TenantContext,
        item: &ID,
        ordinal: usize,
    ) -> outline::Result<()> {
        self.inner.update_ordinal(ctx, item, ordinal).await
    }

    async fn update_parent(
        &self,
        ctx: &TenantContext,
        item: &ID,
        parent: &ID,
    ) -> outline::Result<()> {
        self.inner.update_parent(ctx, item, parent).await
    }

    async fn create_item(
        &self,
        ctx: &TenantContext,
        parent: &ID,
        kind: ItemKind,
        payload: Payload,
    ) -> outline::Result<ID> {
        self.inner.create_item(ctx, parent, kind, payload).await?;
        Ok(ID::from("p"))
    }

    async fn delete_item(&self, ctx: &TenantContext, item: &ID) -> outline::Result<()> {
        self.inner.delete_item(ctx, item).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[tokio::test]
async fn test_create_that_cannot_be_applied_locally_reconciles() {
    let backend: Arc<dyn PersistenceBackend> = Arc::new(ReusedIdBackend {
        inner: test_backend().await,
    });
    let mut t = open_with(backend, EditorConfig::default()).await;

    let err = t
        .editor
        .create_item(ID::from("m2"), Payload::titled("Twin"))
        .await
        .unwrap_err();
    assert_eq!(err.module(), "store");

    // The row the backend did create shows up after reconciliation
    let local = local_ids(&t.editor, "m2");
    assert_eq!(local.len(), 3);
    assert_eq!(local[..2], ["p", "q"]);
    assert_eq!(local, backend_ids(&t.backend, "m2").await);
    assert_eq!(t.editor.container_state(&ID::from("m2")), ContainerState::Stable);
    assert!(t.editor.needs_reconciliation().is_empty());
    t.editor.snapshot().check_invariants().unwrap();

    assert!(matches!(
        drain(&mut t.notifications).as_slice(),
        [
            Notification::CommitFailed { partial: true, .. },
            Notification::Reconciled { .. }
        ]
    ));
}

#[tokio::test]
async fn test_busy_container_rejects_second_request() {
    let (t, faulty) = open_faulty().await;
    faulty.hold_writes();

    let editor = t.editor.clone();
    let first = tokio::spawn(async move { editor.request_move(move_l_to_m2()).await });
    wait_for_state(&t.editor, "m2", ContainerState::CommitPending).await;

    // The optimistic change is already visible
    assert_eq!(local_ids(&t.editor, "m2"), vec!["p", "l", "q"]);
    let visible = t.editor.snapshot();

    let err = t
        .editor
        .request_move(MoveRequest::Within {
            container: ID::from("m1"),
            from: 0,
            to: 1,
        })
        .await
        .unwrap_err();
    assert!(err.is_busy());
    assert_eq!(*t.editor.snapshot(), *visible);

    faulty.release_writes();
    let outcome = first.await.unwrap().unwrap();
    assert!(outcome.is_committed());
    assert_eq!(t.editor.container_state(&ID::from("m1")), ContainerState::Stable);

    // Accepted once the first commit resolves
    let outcome = t
        .editor
        .request_move(MoveRequest::Within {
            container: ID::from("m1"),
            from: 0,
            to: 1,
        })
        .await
        .unwrap();
    assert!(outcome.is_committed());
    assert_eq!(local_ids(&t.editor, "m1"), vec!["y", "x"]);
}

#[tokio::test]
async fn test_unrelated_containers_commit_concurrently() {
    let (t, faulty) = open_faulty().await;
    faulty.hold_writes();

    let editor = t.editor.clone();
    let lessons = tokio::spawn(async move { editor.request_move(move_l_to_m2()).await });
    wait_for_state(&t.editor, "m1", ContainerState::CommitPending).await;

    let editor = t.editor.clone();
    let modules = tokio::spawn(async move {
        editor
            .request_move(MoveRequest::Within {
                container: ID::from("c"),
                from: 0,
                to: 2,
            })
            .await
    });
    wait_for_state(&t.editor, "c", ContainerState::CommitPending).await;

    assert_eq!(local_ids(&t.editor, "c"), vec!["m2", "m3", "m1"]);
    assert_eq!(local_ids(&t.editor, "m2"), vec!["p", "l", "q"]);

    faulty.release_writes();
    assert!(lessons.await.unwrap().unwrap().is_committed());
    assert!(modules.await.unwrap().unwrap().is_committed());

    assert_eq!(backend_ids(&t.backend, "c").await, vec!["m2", "m3", "m1"]);
    assert_eq!(backend_ids(&t.backend, "m2").await, vec!["p", "l", "q"]);
    t.editor.snapshot().check_invariants().unwrap();
}

#[tokio::test]
async fn test_rollback_keeps_concurrent_unrelated_commit() {
    let (t, faulty) = open_faulty().await;
    faulty.hold_writes();
    faulty.fail_once("q", WriteKind::Ordinal);

    let editor = t.editor.clone();
    let failing = tokio::spawn(async move { editor.request_move(move_l_to_m2()).await });
    wait_for_state(&t.editor, "m1", ContainerState::CommitPending).await;

    let editor = t.editor.clone();
    let modules = tokio::spawn(async move {
        editor
            .request_move(MoveRequest::Within {
                container: ID::from("c"),
                from: 2,
                to: 0,
            })
            .await
    });
    wait_for_state(&t.editor, "c", ContainerState::CommitPending).await;

    faulty.release_writes();
    assert!(failing.await.unwrap().unwrap().is_rolled_back());
    assert!(modules.await.unwrap().unwrap().is_committed());

    assert_eq!(local_ids(&t.editor, "c"), vec!["m3", "m1", "m2"]);
    assert_eq!(local_ids(&t.editor, "m1"), vec!["x", "l", "y"]);
    assert_eq!(local_ids(&t.editor, "m2"), vec!["p", "q"]);
    t.editor.snapshot().check_invariants().unwrap();
}
