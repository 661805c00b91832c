//! Authoritative in-memory table of sessions.
//!
//! Backed by a sharded concurrent map ([`DashMap`]) so independent
//! session mutations never contend on a global lock; per-entry atomicity
//! is all the engine needs. Creation uses compare-and-insert semantics:
//! a second `create` with the same id is rejected, and entries are
//! retained after they end so an id can never be resurrected.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::access::{AccessValidator, PERMISSION_SESSION_CREATE};
use crate::error::VisorError;
use crate::hub::message::SessionRequest;
use crate::session::{QualitySettings, Session, SessionId, SessionKind, SessionStatus, unix_ms};

/// Sessions older than this are transitioned to `TimedOut` by the sweep.
pub const SESSION_MAX_LIFETIME: Duration = Duration::from_secs(8 * 60 * 60);

// ── SessionHandle ────────────────────────────────────────────────

/// What a capture pipeline is given when a session starts: the id, a
/// live read handle on the quality settings, and the session's own
/// cancellation token. The [`Session`] record itself stays in the
/// registry.
#[derive(Debug)]
pub struct SessionHandle {
    pub id: SessionId,
    pub kind: SessionKind,
    pub monitor_index: u8,
    pub quality_rx: watch::Receiver<QualitySettings>,
    pub cancel: CancellationToken,
}

// ── SessionRegistry ──────────────────────────────────────────────

struct SessionEntry {
    session: Session,
    quality: watch::Sender<QualitySettings>,
    cancel: CancellationToken,
}

/// Concurrency-safe session table.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionEntry>,
    max_sessions: usize,
    max_lifetime: Duration,
}

impl SessionRegistry {
    /// Create a registry bounded at `max_sessions` concurrent sessions.
    pub fn new(max_sessions: usize) -> Self {
        Self::with_max_lifetime(max_sessions, SESSION_MAX_LIFETIME)
    }

    /// Registry with an explicit session lifetime (tests use short ones).
    pub fn with_max_lifetime(max_sessions: usize, max_lifetime: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            max_sessions,
            max_lifetime,
        }
    }

    /// Validate a session request against the external access service.
    ///
    /// Both checks are single network calls; any transport failure is a
    /// validation failure (warned, not retried).
    pub async fn validate(
        &self,
        request: &SessionRequest,
        validator: &dyn AccessValidator,
    ) -> bool {
        if let Some(pin) = &request.pin {
            match validator.validate_pin(pin).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(session = %request.session_id, "session rejected: bad PIN");
                    return false;
                }
                Err(e) => {
                    warn!(session = %request.session_id, "PIN validation unavailable: {e}");
                    return false;
                }
            }
        }

        if let Some(user_id) = &request.user_id {
            match validator
                .check_permission(user_id, PERMISSION_SESSION_CREATE)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    warn!(session = %request.session_id, user = %user_id,
                          "session rejected: missing permission");
                    return false;
                }
                Err(e) => {
                    warn!(session = %request.session_id, "permission check unavailable: {e}");
                    return false;
                }
            }
        }

        true
    }

    /// Insert a new `Active` session.
    ///
    /// Compare-and-insert: if the id is already present — active or
    /// terminal — the call fails with [`VisorError::SessionExists`].
    pub fn create(&self, request: &SessionRequest) -> Result<SessionHandle, VisorError> {
        if self.active_count() >= self.max_sessions {
            return Err(VisorError::SessionLimit(self.max_sessions));
        }

        match self.sessions.entry(request.session_id.clone()) {
            Entry::Occupied(_) => Err(VisorError::SessionExists(request.session_id.clone())),
            Entry::Vacant(slot) => {
                let session = Session {
                    id: request.session_id.clone(),
                    user_id: request.user_id.clone(),
                    device_id: request.device_id.clone(),
                    kind: request.kind,
                    status: SessionStatus::Active,
                    started_at: Instant::now(),
                    started_at_ms: unix_ms(),
                    ended_at_ms: None,
                    monitor_index: request.monitor_index,
                };
                let (quality_tx, quality_rx) =
                    watch::channel(request.quality.clone().clamped());
                let cancel = CancellationToken::new();

                let handle = SessionHandle {
                    id: session.id.clone(),
                    kind: session.kind,
                    monitor_index: session.monitor_index,
                    quality_rx,
                    cancel: cancel.clone(),
                };

                slot.insert(SessionEntry {
                    session,
                    quality: quality_tx,
                    cancel,
                });
                Ok(handle)
            }
        }
    }

    /// Mark a session `Ended`, stamp its end time, and cancel its token.
    ///
    /// Returns whether a session with this id existed. Terminal sessions
    /// are left untouched (status transitions are one-directional).
    pub fn end(&self, id: &str) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut entry) => {
                if entry.session.status == SessionStatus::Active {
                    entry.session.status = SessionStatus::Ended;
                    entry.session.ended_at_ms = Some(unix_ms());
                    entry.cancel.cancel();
                }
                true
            }
            None => false,
        }
    }

    /// O(1) guard used before processing inbound events for a session.
    pub fn is_active(&self, id: &str) -> bool {
        self.sessions
            .get(id)
            .map(|e| e.session.is_active())
            .unwrap_or(false)
    }

    /// Snapshot of a session record.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.get(id).map(|e| e.session.clone())
    }

    /// Kind of a session, if known.
    pub fn kind(&self, id: &str) -> Option<SessionKind> {
        self.sessions.get(id).map(|e| e.session.kind)
    }

    /// Atomically replace a session's quality settings.
    ///
    /// The running capture loop observes the new snapshot on its next
    /// iteration, never mid-frame.
    pub fn set_quality(&self, id: &str, quality: QualitySettings) -> Result<(), VisorError> {
        match self.sessions.get(id) {
            Some(entry) => {
                entry.quality.send_replace(quality.clamped());
                Ok(())
            }
            None => Err(VisorError::SessionNotFound(id.to_string())),
        }
    }

    /// Transition every over-age `Active` session to `TimedOut`, cancel
    /// its token, and return the swept ids so the caller can run the
    /// same teardown/announcement path as an explicit end.
    pub fn sweep_timeouts(&self) -> Vec<SessionId> {
        let mut swept = Vec::new();
        for mut entry in self.sessions.iter_mut() {
            if entry.session.status == SessionStatus::Active
                && entry.session.started_at.elapsed() > self.max_lifetime
            {
                entry.session.status = SessionStatus::TimedOut;
                entry.session.ended_at_ms = Some(unix_ms());
                entry.cancel.cancel();
                swept.push(entry.session.id.clone());
            }
        }
        swept
    }

    /// End every active session (host shutdown). Returns the ended ids.
    pub fn end_all(&self) -> Vec<SessionId> {
        let ids: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|e| e.session.is_active())
            .map(|e| e.session.id.clone())
            .collect();
        for id in &ids {
            self.end(id);
        }
        ids
    }

    /// Ids of all `Active` sessions.
    pub fn active_ids(&self) -> Vec<SessionId> {
        self.sessions
            .iter()
            .filter(|e| e.session.is_active())
            .map(|e| e.session.id.clone())
            .collect()
    }

    /// Number of `Active` sessions.
    pub fn active_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|e| e.session.is_active())
            .count()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::message::SessionRequest;

    fn request(id: &str) -> SessionRequest {
        SessionRequest {
            session_id: id.to_string(),
            user_id: None,
            device_id: "dev-1".to_string(),
            kind: SessionKind::Control,
            pin: None,
            monitor_index: 0,
            quality: QualitySettings::default(),
        }
    }

    #[tokio::test]
    async fn create_then_duplicate_rejected() {
        let reg = SessionRegistry::new(4);
        reg.create(&request("s1")).unwrap();

        let err = reg.create(&request("s1")).unwrap_err();
        assert!(matches!(err, VisorError::SessionExists(_)));
        assert_eq!(reg.active_count(), 1);
    }

    #[tokio::test]
    async fn ended_id_cannot_be_recreated() {
        let reg = SessionRegistry::new(4);
        reg.create(&request("s1")).unwrap();
        assert!(reg.end("s1"));

        let err = reg.create(&request("s1")).unwrap_err();
        assert!(matches!(err, VisorError::SessionExists(_)));
    }

    #[tokio::test]
    async fn end_is_monotonic_and_reports_existence() {
        let reg = SessionRegistry::new(4);
        reg.create(&request("s1")).unwrap();

        assert!(reg.end("s1"));
        assert_eq!(reg.get("s1").unwrap().status, SessionStatus::Ended);
        // A second end keeps the status and still reports existence.
        assert!(reg.end("s1"));
        assert_eq!(reg.get("s1").unwrap().status, SessionStatus::Ended);

        assert!(!reg.end("missing"));
    }

    #[tokio::test]
    async fn end_cancels_session_token() {
        let reg = SessionRegistry::new(4);
        let handle = reg.create(&request("s1")).unwrap();
        assert!(!handle.cancel.is_cancelled());
        reg.end("s1");
        assert!(handle.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn session_limit_enforced() {
        let reg = SessionRegistry::new(1);
        reg.create(&request("s1")).unwrap();
        let err = reg.create(&request("s2")).unwrap_err();
        assert!(matches!(err, VisorError::SessionLimit(1)));

        // Ending frees a slot.
        reg.end("s1");
        reg.create(&request("s2")).unwrap();
    }

    #[tokio::test]
    async fn quality_replace_is_observed_by_handle() {
        let reg = SessionRegistry::new(4);
        let handle = reg.create(&request("s1")).unwrap();
        assert_eq!(handle.quality_rx.borrow().target_fps, 30);

        let mut q = QualitySettings::default();
        q.target_fps = 10;
        reg.set_quality("s1", q).unwrap();
        assert_eq!(handle.quality_rx.borrow().target_fps, 10);

        assert!(reg.set_quality("missing", QualitySettings::default()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_respects_the_eight_hour_boundary() {
        let reg = SessionRegistry::new(4);
        reg.create(&request("s1")).unwrap();

        // One second before the limit: untouched.
        tokio::time::advance(SESSION_MAX_LIFETIME - Duration::from_secs(1)).await;
        assert!(reg.sweep_timeouts().is_empty());
        assert!(reg.is_active("s1"));

        // One second past it: swept exactly once.
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(reg.sweep_timeouts(), vec!["s1".to_string()]);
        assert_eq!(reg.get("s1").unwrap().status, SessionStatus::TimedOut);
        assert!(reg.sweep_timeouts().is_empty());

        // Monotonic: an explicit end after the sweep keeps TimedOut.
        assert!(reg.end("s1"));
        assert_eq!(reg.get("s1").unwrap().status, SessionStatus::TimedOut);
    }

    #[tokio::test]
    async fn end_all_ends_only_active_sessions() {
        let reg = SessionRegistry::new(4);
        reg.create(&request("s1")).unwrap();
        reg.create(&request("s2")).unwrap();
        reg.end("s1");

        let ended = reg.end_all();
        assert_eq!(ended, vec!["s2".to_string()]);
        assert_eq!(reg.active_count(), 0);
    }
}
