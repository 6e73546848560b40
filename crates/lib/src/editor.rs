//! The editor facade: the one entry point collaborators use.
//!
//! An [`Editor`] ties the pieces together for one tenant's course:
//!
//! 1. plan the request against the visible tree ([`reorder`]),
//! 2. apply it optimistically and publish ([`OptimisticStateManager`]),
//! 3. send the writes ([`PersistenceSync`]),
//! 4. confirm, or roll back, undo any writes that already landed, notify and
//!    reconcile from the backend.
//!
//! Steps 1 and 2 run under a mutex that is released before any `.await`, so
//! commits on different containers can be in flight at the same time. A
//! request touching a container whose commit has not resolved fails with
//! `ContainerBusy` before anything changes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use handle_trait::Handle;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::Result;
use crate::backend::{PersistenceBackend, Write};
use crate::config::EditorConfig;
use crate::gesture::{GestureEvent, GestureInput, GestureSession};
use crate::id::ID;
use crate::item::{OrderedItem, Payload};
use crate::notify::{Notification, NotificationSink};
use crate::optimistic::{CommitTicket, ContainerState, OptimisticStateManager};
use crate::persistence::{self, CommitError, PersistenceSync};
use crate::reorder::{self, Direction, DropIntent, MovePlan, MoveRequest};
use crate::store::{OrderedCollectionStore, StoreError};
use crate::tenant::TenantContext;

/// How a structural request ended.
#[derive(Debug)]
pub enum CommitOutcome {
    /// The request was valid but changed nothing; no writes were sent.
    NoOp,
    Committed { writes: usize },
    /// A write failed and the change was undone locally. `reconciled` says
    /// whether the follow-up refetch succeeded.
    RolledBack {
        reconciled: bool,
        cause: CommitError,
    },
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, CommitOutcome::NoOp)
    }

    pub fn is_rolled_back(&self) -> bool {
        matches!(self, CommitOutcome::RolledBack { .. })
    }
}

/// Result of feeding one pointer input to the editor.
#[derive(Debug, Default)]
pub struct PointerOutcome {
    pub events: Vec<GestureEvent>,
    /// Set when the input completed a drop that reached the engine.
    pub commit: Option<CommitOutcome>,
}

struct EditorInternal {
    sync: PersistenceSync,
    config: EditorConfig,
    sink: Arc<dyn NotificationSink>,
    state: Mutex<OptimisticStateManager>,
    gesture: Mutex<GestureSession>,
}

impl std::fmt::Debug for EditorInternal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorInternal")
            .field("sync", &self.sync)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Editing session over one course. Cheap to clone.
#[derive(Clone, Debug, Handle)]
pub struct Editor {
    inner: Arc<EditorInternal>,
}

impl Editor {
    /// Loads the course breadth-first from `backend` and starts a session.
    #[instrument(skip_all, fields(tenant = %tenant))]
    pub async fn open(
        backend: Arc<dyn PersistenceBackend>,
        tenant: TenantContext,
        config: EditorConfig,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let sync = PersistenceSync::new(backend, tenant, config.prefer_atomic_batch);
        let tree = sync.load_tree().await?;
        tracing::info!(items = tree.item_count(), "Opened editor");

        Ok(Self {
            inner: Arc::new(EditorInternal {
                sync,
                state: Mutex::new(OptimisticStateManager::new(tree)),
                gesture: Mutex::new(GestureSession::new(config.gesture.clone())),
                config,
                sink,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, OptimisticStateManager> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn tenant(&self) -> &TenantContext {
        self.inner.sync.tenant()
    }

    pub fn config(&self) -> &EditorConfig {
        &self.inner.config
    }

    /// The visible tree, including unconfirmed changes.
    pub fn snapshot(&self) -> Arc<OrderedCollectionStore> {
        self.state().tree()
    }

    /// Receives every new visible tree.
    pub fn subscribe(&self) -> watch::Receiver<Arc<OrderedCollectionStore>> {
        self.state().subscribe()
    }

    pub fn container_state(&self, container: &ID) -> ContainerState {
        self.state().state(container)
    }

    /// Containers whose last reconciliation failed.
    pub fn needs_reconciliation(&self) -> Vec<ID> {
        self.state().needs_reconciliation()
    }

    /// Reorders or moves an item.
    #[instrument(skip(self))]
    pub async fn request_move(&self, request: MoveRequest) -> Result<CommitOutcome> {
        let planned = {
            let mut state = self.state();
            state.ensure_stable(&request.containers())?;
            match reorder::plan(&state.tree(), &request)? {
                Some(plan) => Some(Self::begin(&mut state, plan)?),
                None => None,
            }
        };
        match planned {
            Some((ticket, containers, writes)) => self.finish(ticket, containers, writes).await,
            None => Ok(CommitOutcome::NoOp),
        }
    }

    /// Completes a drag. Drops without net effect are no-ops.
    #[instrument(skip(self))]
    pub async fn request_drop(&self, intent: DropIntent) -> Result<CommitOutcome> {
        let request = reorder::resolve_drop(&self.snapshot(), &intent);
        match request {
            Some(request) => self.request_move(request).await,
            None => Ok(CommitOutcome::NoOp),
        }
    }

    /// Moves an item one step. At either end of its list this is a no-op.
    #[instrument(skip(self))]
    pub async fn request_nudge(&self, item: ID, direction: Direction) -> Result<CommitOutcome> {
        let request = reorder::nudge(&self.snapshot(), &item, direction)?;
        match request {
            Some(request) => self.request_move(request).await,
            None => Ok(CommitOutcome::NoOp),
        }
    }

    /// Deletes an item and everything nested below it.
    #[instrument(skip(self))]
    pub async fn request_delete(&self, item: ID) -> Result<CommitOutcome> {
        let (ticket, containers, writes) = {
            let mut state = self.state();
            let plan = reorder::plan_delete(&state.tree(), &item)?;
            Self::begin(&mut state, plan)?
        };
        self.finish(ticket, containers, writes).await
    }

    /// Creates an item at the end of `parent`'s list and returns its id.
    ///
    /// The backend assigns the id, so the local append happens only after
    /// the backend accepted the item.
    #[instrument(skip(self, payload))]
    pub async fn create_item(&self, parent: ID, payload: Payload) -> Result<ID> {
        let (kind, ticket) = {
            let mut state = self.state();
            let kind = state
                .tree()
                .container(&parent)
                .map(|c| c.kind.child_kind())
                .ok_or_else(|| StoreError::ContainerNotFound {
                    container: parent.clone(),
                })?;
            (kind, state.reserve(vec![parent.clone()])?)
        };

        let created = self
            .inner
            .sync
            .backend()
            .create_item(self.tenant(), &parent, kind, payload.clone())
            .await;

        let mut state = self.state();
        let id = match created {
            Ok(id) => id,
            Err(e) => {
                state.confirm(ticket)?;
                drop(state);
                self.inner.sink.notify(Notification::CommitFailed {
                    containers: vec![parent],
                    message: e.to_string(),
                    partial: false,
                });
                return Err(e);
            }
        };
        let inserted = state.insert(
            ticket,
            &parent,
            OrderedItem::new(id.clone(), parent.clone(), kind, payload),
        );
        if let Err(e) = inserted {
            // The backend holds the item but local state does not
            let containers = state.rollback(ticket)?;
            drop(state);
            error!(error = %e, %id, "Failed to append created item locally");
            self.inner.sink.notify(Notification::CommitFailed {
                containers: containers.clone(),
                message: e.to_string(),
                partial: true,
            });
            self.reconcile(containers).await;
            return Err(e);
        }
        state.confirm(ticket)?;
        Ok(id)
    }

    /// Feeds one pointer or key input to the drag recognizer and commits a
    /// completed drop.
    pub async fn handle_pointer(&self, input: GestureInput) -> Result<PointerOutcome> {
        let mut events = self
            .inner
            .gesture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .process(input);

        let dropped = events.iter().enumerate().find_map(|(index, e)| match e {
            GestureEvent::Dropped(intent) => Some((index, intent.clone())),
            _ => None,
        });
        let Some((index, intent)) = dropped else {
            return Ok(PointerOutcome {
                events,
                commit: None,
            });
        };

        // A drop that resolves to nothing is reported as a cancel
        match reorder::resolve_drop(&self.snapshot(), &intent) {
            Some(request) => {
                let commit = self.request_move(request).await?;
                Ok(PointerOutcome {
                    events,
                    commit: Some(commit),
                })
            }
            None => {
                events[index] = GestureEvent::Cancelled { item: intent.item };
                Ok(PointerOutcome {
                    events,
                    commit: None,
                })
            }
        }
    }

    /// Abandons any drag in progress without side effects.
    pub fn cancel_gesture(&self) {
        self.inner
            .gesture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    }

    /// Retries reconciliation for every flagged container that is idle.
    /// Returns `true` when nothing is left to reconcile.
    #[instrument(skip(self))]
    pub async fn reconcile_pending(&self) -> bool {
        let containers = self.state().begin_reconcile();
        if containers.is_empty() {
            return self.needs_reconciliation().is_empty();
        }
        self.reconcile(containers).await && self.needs_reconciliation().is_empty()
    }

    /// Replaces the whole tree with a fresh load from the backend.
    ///
    /// Fails while commits are pending.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> Result<()> {
        let tree = self.inner.sync.load_tree().await?;
        self.state().replace_tree(tree)
    }

    fn begin(
        state: &mut OptimisticStateManager,
        plan: MovePlan,
    ) -> Result<(CommitTicket, Vec<ID>, Vec<Write>)> {
        let writes = persistence::writes_for(&plan.deltas);
        let containers = plan.affected();
        let ticket = state.begin(plan)?;
        Ok((ticket, containers, writes))
    }

    async fn finish(
        &self,
        ticket: CommitTicket,
        containers: Vec<ID>,
        writes: Vec<Write>,
    ) -> Result<CommitOutcome> {
        match self.inner.sync.commit(&writes).await {
            Ok(report) => {
                self.state().confirm(ticket)?;
                self.inner.sink.notify(Notification::Committed {
                    containers: containers.clone(),
                    writes: report.writes,
                });
                if self.inner.config.reload_after_commit
                    && self.state().mark_reconciling(&containers).is_ok()
                {
                    self.reconcile(containers).await;
                }
                Ok(CommitOutcome::Committed {
                    writes: report.writes,
                })
            }
            Err(cause) => {
                let (containers, compensation) = {
                    let mut state = self.state();
                    let containers = state.rollback(ticket)?;
                    let applied = &writes[..cause.applied().min(writes.len())];
                    let compensation = persistence::compensating_writes(applied, &state.tree());
                    (containers, compensation)
                };
                self.inner.sink.notify(Notification::CommitFailed {
                    containers: containers.clone(),
                    message: cause.to_string(),
                    partial: cause.is_partial(),
                });
                if !compensation.is_empty() {
                    let accepted = self.inner.sync.apply_each(&compensation).await;
                    warn!(
                        accepted,
                        total = compensation.len(),
                        "Compensated partially applied commit"
                    );
                }
                let reconciled = self.reconcile(containers).await;
                Ok(CommitOutcome::RolledBack { reconciled, cause })
            }
        }
    }

    /// Refetches `containers`, which must already be `Reconciling`.
    ///
    /// Lists the backend holds out of sequence are renumbered there before
    /// local state adopts them, so both sides end up with the same ordinals.
    async fn reconcile(&self, containers: Vec<ID>) -> bool {
        let canonical = match self.inner.sync.fetch_canonical(&containers).await {
            Ok(canonical) => canonical,
            Err(e) => {
                error!(error = %e, ?containers, "Failed to fetch canonical order");
                self.abandon_reconcile(containers, e.to_string());
                return false;
            }
        };

        let renumber = persistence::renumber_writes(&canonical);
        if !renumber.is_empty() {
            if let Err(e) = self.inner.sync.commit(&renumber).await {
                error!(error = %e, ?containers, "Failed to renumber backend ordinals");
                self.abandon_reconcile(containers, e.to_string());
                return false;
            }
            info!(writes = renumber.len(), "Renumbered backend ordinals");
        }

        self.state().finish_reconcile(canonical);
        self.inner
            .sink
            .notify(Notification::Reconciled { containers });
        true
    }

    fn abandon_reconcile(&self, containers: Vec<ID>, message: String) {
        self.state().abandon_reconcile(&containers);
        self.inner
            .sink
            .notify(Notification::ReconcileFailed { containers, message });
    }
}
