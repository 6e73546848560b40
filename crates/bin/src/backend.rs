//! Backend creation and utility functions.

use std::path::PathBuf;
use std::sync::Arc;

use outline::{
    Editor, EditorConfig, TenantContext,
    backend::{InMemory, PersistenceBackend, Sqlite},
    notify::TracingSink,
};

use crate::cli::{Backend, CourseArgs};

/// An editor plus what is needed to flush it to disk afterwards.
pub struct Session {
    pub editor: Editor,
    backend: Arc<dyn PersistenceBackend>,
    json_path: Option<PathBuf>,
}

impl Session {
    /// Writes in-memory state back to its JSON file. SQLite needs nothing.
    pub async fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let Some(path) = &self.json_path else {
            return Ok(());
        };
        if let Some(in_memory) = self.backend.as_any().downcast_ref::<InMemory>() {
            in_memory.save_to_file(path).await?;
            tracing::debug!("Saved data to {}", path.display());
        }
        Ok(())
    }
}

/// Human readable label for the configured backend
pub fn backend_label(args: &CourseArgs) -> &'static str {
    match args.backend {
        Backend::Sqlite => "sqlite",
        Backend::Inmemory => "inmemory",
    }
}

/// Create the appropriate backend based on configuration
async fn create_backend(
    args: &CourseArgs,
) -> Result<(Arc<dyn PersistenceBackend>, Option<PathBuf>), Box<dyn std::error::Error>> {
    let data_dir = args.data_dir.clone().unwrap_or_else(|| PathBuf::from("."));

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir).await?;

    match args.backend {
        Backend::Sqlite => {
            let db_path = data_dir.join("outline.db");
            tracing::info!("Using SQLite backend at {}", db_path.display());
            Ok((Arc::new(Sqlite::open_sqlite(&db_path).await?), None))
        }
        Backend::Inmemory => {
            let json_path = data_dir.join("outline.json");
            tracing::info!(
                "Using in-memory backend with persistence at {}",
                json_path.display()
            );
            let backend = InMemory::load_from_file(&json_path).await?;
            Ok((Arc::new(backend), Some(json_path)))
        }
    }
}

/// Opens the configured course in a new editor
pub async fn open_session(args: &CourseArgs) -> Result<Session, Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => EditorConfig::from_json_file(path).await?,
        None => EditorConfig::default(),
    };
    let (backend, json_path) = create_backend(args).await?;
    let tenant = TenantContext::new(args.tenant.clone(), args.course.as_str());
    let editor = Editor::open(backend.clone(), tenant, config, Arc::new(TracingSink)).await?;
    Ok(Session {
        editor,
        backend,
        json_path,
    })
}
