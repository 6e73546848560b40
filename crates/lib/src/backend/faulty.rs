//! Fault injection wrapper around another backend.
//!
//! [`FaultyBackend`] forwards every call to an inner backend but can be told
//! to reject chosen writes, fail reconciliation reads, or hold writes until
//! released. It is public so integration tests and demos can exercise the
//! rollback paths against any real backend.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use crate::Result;
use crate::backend::errors::BackendError;
use crate::backend::{PersistenceBackend, Write};
use crate::id::ID;
use crate::item::{ItemKind, OrderedItem, Payload};
use crate::tenant::TenantContext;

/// Which kind of write a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Ordinal,
    Parent,
    Delete,
    Create,
}

impl WriteKind {
    fn of(write: &Write) -> Self {
        match write {
            Write::UpdateOrdinal { .. } => WriteKind::Ordinal,
            Write::UpdateParent { .. } => WriteKind::Parent,
            Write::DeleteItem { .. } => WriteKind::Delete,
        }
    }
}

#[derive(Debug, Clone)]
struct FailRule {
    item: Option<ID>,
    kind: Option<WriteKind>,
    /// `None` fails forever.
    remaining: Option<usize>,
}

impl FailRule {
    fn matches(&self, kind: WriteKind, item: &ID) -> bool {
        self.item.as_ref().is_none_or(|i| i == item) && self.kind.is_none_or(|k| k == kind)
    }
}

/// Backend wrapper that fails selected operations on demand.
pub struct FaultyBackend {
    inner: Arc<dyn PersistenceBackend>,
    rules: Mutex<Vec<FailRule>>,
    fail_fetches: AtomicBool,
    atomic_batch: AtomicBool,
    applied: Mutex<Vec<Write>>,
    gate: watch::Sender<bool>,
}

impl std::fmt::Debug for FaultyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultyBackend")
            .field("rules", &self.rules)
            .field("fail_fetches", &self.fail_fetches)
            .finish_non_exhaustive()
    }
}

impl FaultyBackend {
    /// Wraps `inner`. Atomic batches are off until enabled, so commits go
    /// through individual writes.
    pub fn new(inner: Arc<dyn PersistenceBackend>) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            inner,
            rules: Mutex::new(Vec::new()),
            fail_fetches: AtomicBool::new(false),
            atomic_batch: AtomicBool::new(false),
            applied: Mutex::new(Vec::new()),
            gate,
        }
    }

    pub fn inner(&self) -> &Arc<dyn PersistenceBackend> {
        &self.inner
    }

    fn push_rule(&self, rule: FailRule) {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(rule);
    }

    /// Fails every write that touches `item`.
    pub fn fail_writes_to(&self, item: impl Into<ID>) {
        self.push_rule(FailRule {
            item: Some(item.into()),
            kind: None,
            remaining: None,
        });
    }

    /// Fails the next write of `kind` touching `item`, once.
    pub fn fail_once(&self, item: impl Into<ID>, kind: WriteKind) {
        self.push_rule(FailRule {
            item: Some(item.into()),
            kind: Some(kind),
            remaining: Some(1),
        });
    }

    /// Fails the next `count` writes, whatever they touch.
    pub fn fail_next_writes(&self, count: usize) {
        self.push_rule(FailRule {
            item: None,
            kind: None,
            remaining: Some(count),
        });
    }

    /// Makes `list_siblings` fail while set.
    pub fn set_fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    /// Lets the editor use `apply_batch` when the inner backend supports it.
    pub fn set_atomic_batch(&self, enabled: bool) {
        self.atomic_batch.store(enabled, Ordering::SeqCst);
    }

    /// Blocks writes until [`release_writes`](Self::release_writes).
    pub fn hold_writes(&self) {
        self.gate.send_replace(false);
    }

    pub fn release_writes(&self) {
        self.gate.send_replace(true);
    }

    /// Removes every failure rule and reopens the write gate.
    pub fn heal(&self) {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.set_fail_fetches(false);
        self.release_writes();
    }

    /// Writes that reached the inner backend, in order.
    pub fn applied(&self) -> Vec<Write> {
        self.applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn wait_for_gate(&self) {
        let mut rx = self.gate.subscribe();
        // The sender lives as long as self, so this only returns once open
        let _ = rx.wait_for(|open| *open).await;
    }

    /// Consumes a matching rule, if any, and reports whether to fail.
    fn should_fail(&self, kind: WriteKind, item: &ID) -> bool {
        let mut rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(pos) = rules.iter().position(|r| r.matches(kind, item)) else {
            return false;
        };
        if let Some(remaining) = rules[pos].remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                rules.remove(pos);
            }
        }
        true
    }

    async fn guarded(&self, ctx: &TenantContext, write: Write) -> Result<()> {
        self.wait_for_gate().await;
        if self.should_fail(WriteKind::of(&write), write.item()) {
            debug!(%write, "Injected write failure");
            return Err(BackendError::WriteRejected {
                item: write.item().clone(),
                reason: "injected failure".to_string(),
            }
            .into());
        }
        self.inner.apply(ctx, &write).await?;
        self.applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(write);
        Ok(())
    }
}

#[async_trait]
impl PersistenceBackend for FaultyBackend {
    async fn list_siblings(
        &self,
        ctx: &TenantContext,
        container: &ID,
    ) -> Result<Vec<OrderedItem>> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable {
                reason: format!("injected fetch failure for {container}"),
            }
            .into());
        }
        self.inner.list_siblings(ctx, container).await
    }

    async fn update_ordinal(&self, ctx: &TenantContext, item: &ID, ordinal: usize) -> Result<()> {
        self.guarded(
            ctx,
            Write::UpdateOrdinal {
                item: item.clone(),
                ordinal,
            },
        )
        .await
    }

    async fn update_parent(&self, ctx: &TenantContext, item: &ID, parent: &ID) -> Result<()> {
        self.guarded(
            ctx,
            Write::UpdateParent {
                item: item.clone(),
                parent: parent.clone(),
            },
        )
        .await
    }

    async fn create_item(
        &self,
        ctx: &TenantContext,
        parent: &ID,
        kind: ItemKind,
        payload: Payload,
    ) -> Result<ID> {
        self.wait_for_gate().await;
        if self.should_fail(WriteKind::Create, parent) {
            return Err(BackendError::WriteRejected {
                item: parent.clone(),
                reason: "injected failure".to_string(),
            }
            .into());
        }
        self.inner.create_item(ctx, parent, kind, payload).await
    }

    async fn delete_item(&self, ctx: &TenantContext, item: &ID) -> Result<()> {
        self.guarded(ctx, Write::DeleteItem { item: item.clone() })
            .await
    }

    fn supports_atomic_batch(&self) -> bool {
        self.atomic_batch.load(Ordering::SeqCst) && self.inner.supports_atomic_batch()
    }

    async fn apply_batch(&self, ctx: &TenantContext, writes: &[Write]) -> Result<()> {
        self.wait_for_gate().await;
        if let Some(write) = writes
            .iter()
            .find(|w| self.should_fail(WriteKind::of(w), w.item()))
        {
            return Err(BackendError::WriteRejected {
                item: write.item().clone(),
                reason: "injected batch failure".to_string(),
            }
            .into());
        }
        self.inner.apply_batch(ctx, writes).await?;
        self.applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(writes);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
