/// Per-user document paths.
///
/// Everything lives under `artifacts/{app_id}/users/{uid}/`; existing data
/// uses this prefix so it must not change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPaths {
    app_id: String,
    uid: String,
}

impl UserPaths {
    pub fn new(app_id: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            uid: uid.into(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    fn root(&self) -> String {
        format!("artifacts/{}/users/{}", self.app_id, self.uid)
    }

    /// Collection of persisted workout sessions.
    pub fn sessions(&self) -> String {
        format!("{}/sessions", self.root())
    }

    pub fn session(&self, id: &str) -> String {
        format!("{}/{}", self.sessions(), id)
    }

    pub fn rate_limit(&self, action: &str) -> String {
        format!("{}/rateLimits/{}", self.root(), action)
    }

    /// The pre-migration single log document.
    pub fn legacy_logs(&self) -> String {
        format!("{}/workoutLogs/history", self.root())
    }

    /// Last-activity marker touched after every flush.
    pub fn activity(&self) -> String {
        format!("{}/profile/activity", self.root())
    }
}
