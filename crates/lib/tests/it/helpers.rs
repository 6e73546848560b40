use std::sync::Arc;

use outline::{
    Editor, EditorConfig, ID, ItemKind, OrderedItem, Payload, TenantContext,
    backend::{FaultyBackend, InMemory, PersistenceBackend},
    notify::{ChannelSink, Notification},
};
use tokio::sync::mpsc::UnboundedReceiver;

pub fn ctx() -> TenantContext {
    TenantContext::new("acme", "c")
}

/// The fixture course:
///
/// ```text
/// c: [m1, m2, m3]
///   m1: [x, l, y]     l: [r1]
///   m2: [p, q]
///   m3: []
/// ```
pub fn fixture() -> Vec<OrderedItem> {
    let mut items = Vec::new();
    let mut add = |parent: &str, ids: &[&str], kind: ItemKind| {
        for (ordinal, id) in ids.iter().enumerate() {
            let mut item = OrderedItem::new(*id, parent, kind, Payload::titled(id.to_uppercase()));
            item.ordinal = ordinal;
            items.push(item);
        }
    };
    add("c", &["m1", "m2", "m3"], ItemKind::Module);
    add("m1", &["x", "l", "y"], ItemKind::Lesson);
    add("m2", &["p", "q"], ItemKind::Lesson);
    add("l", &["r1"], ItemKind::Resource);
    items
}

pub async fn seeded_in_memory() -> InMemory {
    let backend = InMemory::new();
    for item in fixture() {
        backend
            .insert_item(&ctx(), item)
            .await
            .expect("Failed to seed backend");
    }
    backend
}

/// Creates a seeded backend based on the TEST_BACKEND env var.
///
/// Supported values:
/// - "inmemory" or unset: InMemory backend (default)
/// - "sqlite": SQLite in-memory backend (requires `sqlite` feature)
pub async fn test_backend() -> Arc<dyn PersistenceBackend> {
    match std::env::var("TEST_BACKEND").as_deref() {
        Ok("sqlite") => {
            #[cfg(feature = "sqlite")]
            {
                use outline::backend::Sqlite;
                let backend = Sqlite::sqlite_in_memory()
                    .await
                    .expect("Failed to create SQLite backend");
                for item in fixture() {
                    backend
                        .insert_item(&ctx(), item)
                        .await
                        .expect("Failed to seed backend");
                }
                Arc::new(backend)
            }
            #[cfg(not(feature = "sqlite"))]
            {
                panic!("TEST_BACKEND=sqlite requires the 'sqlite' feature to be enabled")
            }
        }
        _ => Arc::new(seeded_in_memory().await),
    }
}

pub struct TestEditor {
    pub editor: Editor,
    pub backend: Arc<dyn PersistenceBackend>,
    pub notifications: UnboundedReceiver<Notification>,
}

pub async fn open_with(backend: Arc<dyn PersistenceBackend>, config: EditorConfig) -> TestEditor {
    let (sink, notifications) = ChannelSink::new();
    let editor = Editor::open(backend.clone(), ctx(), config, Arc::new(sink))
        .await
        .expect("Failed to open editor");
    TestEditor {
        editor,
        backend,
        notifications,
    }
}

pub async fn open_editor() -> TestEditor {
    open_with(test_backend().await, EditorConfig::default()).await
}

/// Opens an editor over a seeded backend wrapped in a [`FaultyBackend`].
pub async fn open_faulty() -> (TestEditor, Arc<FaultyBackend>) {
    let faulty = Arc::new(FaultyBackend::new(test_backend().await));
    let test = open_with(faulty.clone(), EditorConfig::default()).await;
    (test, faulty)
}

/// Ids of a container's children in the editor's visible tree.
pub fn local_ids(editor: &Editor, container: &str) -> Vec<String> {
    editor
        .snapshot()
        .siblings(&ID::from(container))
        .into_iter()
        .map(|i| i.id.to_string())
        .collect()
}

/// Ids of a container's children as the backend orders them.
pub async fn backend_ids(backend: &Arc<dyn PersistenceBackend>, container: &str) -> Vec<String> {
    backend
        .list_siblings(&ctx(), &ID::from(container))
        .await
        .expect("Failed to list siblings")
        .into_iter()
        .map(|i| i.id.to_string())
        .collect()
}

/// Ordinals stored in the backend, in list order.
pub async fn backend_ordinals(backend: &Arc<dyn PersistenceBackend>, container: &str) -> Vec<usize> {
    backend
        .list_siblings(&ctx(), &ID::from(container))
        .await
        .expect("Failed to list siblings")
        .into_iter()
        .map(|i| i.ordinal)
        .collect()
}

/// Drains every notification sent so far.
pub fn drain(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}
