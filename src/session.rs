use crate::error::{Result, RunnerError};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Canonical name of the source copy inside every session directory.
pub const SOURCE_FILE_NAME: &str = "main.c";

/// One isolated unit of work: a directory holding a single source file and everything built from it.
#[derive(Debug)]
pub struct BuildSession {
    id: Uuid,
    root: PathBuf,
    created_at: DateTime<Utc>,
    outputs: Mutex<BTreeSet<PathBuf>>,
    cancel: CancellationToken,
}

impl BuildSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_path(&self) -> PathBuf {
        self.root.join(SOURCE_FILE_NAME)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Records a produced file. Safe to call from concurrently finishing builds.
    pub fn record_output(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        if !path.starts_with(&self.root) {
            return Err(RunnerError::InvalidInput(format!(
                "output {:?} is outside session directory {:?}",
                path, self.root
            )));
        }
        self.outputs.lock().insert(path);
        Ok(())
    }

    pub fn outputs(&self) -> Vec<PathBuf> {
        self.outputs.lock().iter().cloned().collect()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Creates, tracks and removes session directories under one work root.
pub struct SessionManager {
    root: PathBuf,
    sessions: Arc<RwLock<HashMap<Uuid, Arc<BuildSession>>>>,
}

impl SessionManager {
    /// Creates the work root if needed. The root is stored canonicalized so
    /// session paths can be bind-mounted and compared by prefix.
    pub async fn new(work_root: impl AsRef<Path>) -> Result<Self> {
        let work_root = work_root.as_ref();
        fs::create_dir_all(work_root).await?;
        let root = fs::canonicalize(work_root).await?;
        info!("Session work root: {}", root.display());

        Ok(Self {
            root,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn work_root(&self) -> &Path {
        &self.root
    }

    pub async fn create_session(&self, source: &[u8]) -> Result<Arc<BuildSession>> {
        if source.is_empty() {
            return Err(RunnerError::InvalidInput("source file is empty".to_string()));
        }

        let id = Uuid::new_v4();
        let dir = self.root.join(id.to_string());
        // create_dir (not create_dir_all) fails if the directory already exists
        fs::create_dir(&dir).await?;
        fs::write(dir.join(SOURCE_FILE_NAME), source).await?;

        let session = Arc::new(BuildSession {
            id,
            root: dir,
            created_at: Utc::now(),
            outputs: Mutex::new(BTreeSet::new()),
            cancel: CancellationToken::new(),
        });
        self.sessions.write().insert(id, session.clone());

        info!(session = %id, "Created session ({} source bytes)", source.len());
        Ok(session)
    }

    pub fn get(&self, session_id: &Uuid) -> Option<Arc<BuildSession>> {
        self.sessions.read().get(session_id).cloned()
    }

    pub fn list_sessions(&self) -> Vec<Uuid> {
        self.sessions.read().keys().copied().collect()
    }

    /// Cancels every in-flight build of the session.
    pub fn cancel_session(&self, session_id: &Uuid) -> Result<()> {
        let session = self
            .get(session_id)
            .ok_or_else(|| RunnerError::SessionNotFound(session_id.to_string()))?;
        session.cancel();
        info!(session = %session_id, "Session cancelled");
        Ok(())
    }

    /// Forgets a finished session without touching its directory.
    /// It can still be removed later with [`SessionManager::teardown_by_id`].
    pub fn release(&self, session_id: &Uuid) -> bool {
        let released = self.sessions.write().remove(session_id).is_some();
        if released {
            debug!(session = %session_id, "Released session");
        }
        released
    }

    pub async fn teardown(&self, session: &BuildSession) -> Result<()> {
        self.remove(&session.id).await
    }

    /// Removes a session directory by id. Ids that do not parse as a UUID are
    /// rejected, so the id can never address anything outside the work root.
    pub async fn teardown_by_id(&self, session_id: &str) -> Result<()> {
        let id = Uuid::parse_str(session_id.trim())
            .map_err(|_| RunnerError::InvalidInput(format!("invalid session id: {}", session_id)))?;
        self.remove(&id).await
    }

    async fn remove(&self, id: &Uuid) -> Result<()> {
        if let Some(session) = self.sessions.write().remove(id) {
            session.cancel();
        }

        let dir = self.root.join(id.to_string());
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!(session = %id, "Removed session directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(session = %id, "Session directory already gone");
                Ok(())
            }
            Err(e) => {
                warn!(session = %id, error = %e, "Failed to remove session directory");
                Err(e.into())
            }
        }
    }
}

impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            sessions: self.sessions.clone(),
        }
    }
}
