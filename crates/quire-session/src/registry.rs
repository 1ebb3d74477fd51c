use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use crate::config::SessionConfig;
use crate::session::RepoSession;

/// Sessions by working-copy path. A session is created on first use and
/// lives until closed.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    config: SessionConfig,
    sessions: RwLock<HashMap<PathBuf, Arc<RepoSession>>>,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, workdir: &Path) -> Option<Arc<RepoSession>> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(workdir).cloned()
    }

    pub fn get_or_create(&self, workdir: &Path) -> Arc<RepoSession> {
        if let Some(session) = self.get(workdir) {
            return session;
        }
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let session = sessions.entry(workdir.to_path_buf()).or_insert_with(|| {
            info!(workdir = %workdir.display(), "opened repository session");
            Arc::new(RepoSession::new(workdir, self.config.clone()))
        });
        Arc::clone(session)
    }

    /// Remove the session for `workdir` and close its status channel.
    pub fn close(&self, workdir: &Path) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(workdir);
        match removed {
            Some(session) => {
                session.shutdown();
                info!(workdir = %workdir.display(), "closed repository session");
                true
            }
            None => false,
        }
    }

    pub fn shutdown_all(&self) {
        let drained: Vec<Arc<RepoSession>> = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, session)| session)
            .collect();
        for session in &drained {
            session.shutdown();
        }
        info!(sessions = drained.len(), "shut down all repository sessions");
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
