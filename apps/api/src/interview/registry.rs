use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::errors::AppError;
use crate::interview::engine::InterviewEngine;
use crate::models::role::InterviewStage;

/// One interview driven over HTTP.
pub struct LiveInterview {
    /// Also the id of the stored session once the interview ends.
    pub id: String,
    pub role_id: String,
    pub stage: InterviewStage,
    pub engine: InterviewEngine,
    /// Set once the finished transcript has been written to the role.
    pub persisted: bool,
}

/// In-process table of live interviews.
///
/// Each entry sits behind its own async mutex, so turns for one session are
/// serialized while different sessions proceed independently.
#[derive(Default)]
pub struct InterviewRegistry {
    sessions: RwLock<HashMap<String, Arc<Mutex<LiveInterview>>>>,
}

impl InterviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, interview: LiveInterview) -> Arc<Mutex<LiveInterview>> {
        let id = interview.id.clone();
        let entry = Arc::new(Mutex::new(interview));
        self.sessions.write().await.insert(id, entry.clone());
        entry
    }

    pub async fn get(&self, id: &str) -> Result<Arc<Mutex<LiveInterview>>, AppError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Interview {id} not found")))
    }

    /// Drops an interview once it no longer needs to be served live.
    pub async fn remove(&self, id: &str) -> Option<Arc<Mutex<LiveInterview>>> {
        self.sessions.write().await.remove(id)
    }

    #[cfg(test)]
    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }
}
