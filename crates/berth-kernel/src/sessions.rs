// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sessions, append-only notes, and advisory file claims.
//!
//! File claims are a communication layer, not a mutex: a conflicting path
//! is surfaced with the current holder, and the caller may force through.
//! Notes are never edited; they disappear only with their session.

use std::sync::Arc;

use berth_core::{now_ms, BerthError, Identity, SessionStatus};
use berth_store::queries::{claims as claims_q, notes as notes_q, sessions as sessions_q};
use berth_store::{ClaimConflict, Database, FileClaimRow, NoteRow, SessionRow};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::activity::ActivityLog;

/// Purpose given to sessions created implicitly by a bare note.
const QUICK_NOTE_PURPOSE: &str = "quick note";

const DEFAULT_NOTE_TYPE: &str = "note";

/// Inputs for starting a session.
#[derive(Debug, Clone, Default)]
pub struct StartSession {
    pub purpose: String,
    pub files: Vec<String>,
    pub identity: Option<Identity>,
    pub agent_id: Option<String>,
    pub force: bool,
}

/// Result of starting a session: the session always exists; conflicting
/// paths were skipped unless forced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOutcome {
    pub session: SessionRow,
    pub claimed: Vec<String>,
    pub conflicts: Vec<ClaimConflict>,
}

/// Result of adding files to a running session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFilesOutcome {
    pub claimed: Vec<String>,
    pub conflicts: Vec<ClaimConflict>,
}

/// Inputs for appending a note.
#[derive(Debug, Clone, Default)]
pub struct AddNote {
    pub session_id: Option<String>,
    pub content: String,
    pub note_type: Option<String>,
    pub created_by: Option<String>,
}

/// A session with its full timeline and claim set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    pub session: SessionRow,
    pub notes: Vec<NoteRow>,
    pub files: Vec<FileClaimRow>,
}

/// Session service.
pub struct SessionService {
    db: Arc<Database>,
    activity: Arc<ActivityLog>,
    default_agent_id: Option<String>,
}

impl SessionService {
    pub fn new(
        db: Arc<Database>,
        activity: Arc<ActivityLog>,
        default_agent_id: Option<String>,
    ) -> Self {
        Self {
            db,
            activity,
            default_agent_id,
        }
    }

    fn resolve_creator(&self, supplied: Option<String>) -> String {
        supplied
            .filter(|s| !s.is_empty())
            .or_else(|| self.default_agent_id.clone())
            .unwrap_or_else(|| "anonymous".to_string())
    }

    /// Create a session and claim its initial files.
    pub async fn start(&self, input: StartSession) -> Result<StartOutcome, BerthError> {
        if input.purpose.trim().is_empty() {
            return Err(BerthError::validation("session purpose must not be empty"));
        }
        let now = now_ms();
        let session = SessionRow {
            id: Uuid::new_v4().to_string(),
            purpose: input.purpose.clone(),
            created_by: self.resolve_creator(input.agent_id),
            identity: input.identity.as_ref().map(|i| i.as_str().to_string()),
            status: SessionStatus::Active.to_string(),
            created_at: now,
            updated_at: now,
        };
        sessions_q::insert(&self.db, &session).await?;

        let (claimed, conflicts) = self
            .claim_paths(&session.id, input.files, input.force, now)
            .await?;

        info!(
            session = session.id.as_str(),
            claimed = claimed.len(),
            conflicts = conflicts.len(),
            "session started"
        );
        self.activity
            .record(
                "session",
                "start",
                Some(&session.id),
                Some(serde_json::json!({ "purpose": session.purpose })),
                Some(&session.created_by),
            )
            .await;

        Ok(StartOutcome {
            session,
            claimed,
            conflicts,
        })
    }

    async fn claim_paths(
        &self,
        session_id: &str,
        paths: Vec<String>,
        force: bool,
        now: i64,
    ) -> Result<(Vec<String>, Vec<ClaimConflict>), BerthError> {
        if paths.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        let conflicts = claims_q::conflicts(&self.db, paths.clone(), session_id).await?;
        let mut claimed = Vec::new();
        for path in paths {
            let conflicted = conflicts.iter().any(|c| c.path == path);
            if conflicted && !force {
                debug!(session = session_id, path = path.as_str(), "claim skipped: conflict");
                continue;
            }
            if claims_q::insert(&self.db, session_id, &path, now).await? {
                claimed.push(path);
            }
        }
        Ok((claimed, conflicts))
    }

    /// Move a session to a terminal status. Idempotent once terminal: a
    /// repeat call returns the session unchanged.
    pub async fn end(
        &self,
        id: &str,
        status: SessionStatus,
        note: Option<String>,
    ) -> Result<SessionRow, BerthError> {
        if !status.is_terminal() {
            return Err(BerthError::validation(
                "end status must be completed or abandoned",
            ));
        }
        let session = sessions_q::get(&self.db, id)
            .await?
            .ok_or_else(|| BerthError::not_found("session", id))?;

        if session.status != SessionStatus::Active.to_string() {
            return Ok(session);
        }

        let now = now_ms();
        if let Some(content) = note {
            notes_q::insert(
                &self.db,
                id,
                DEFAULT_NOTE_TYPE,
                &content,
                &session.created_by,
                now,
            )
            .await?;
        }
        sessions_q::finish(&self.db, id, &status.to_string(), now).await?;
        self.activity
            .record(
                "session",
                "end",
                Some(id),
                Some(serde_json::json!({ "status": status.to_string() })),
                Some(&session.created_by),
            )
            .await;

        Ok(SessionRow {
            status: status.to_string(),
            updated_at: now,
            ..session
        })
    }

    /// Delete a session; notes and file claims cascade.
    pub async fn delete(&self, id: &str) -> Result<(), BerthError> {
        let removed = sessions_q::delete(&self.db, id).await?;
        if !removed {
            return Err(BerthError::not_found("session", id));
        }
        self.activity
            .record("session", "delete", Some(id), None, None)
            .await;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<SessionRow, BerthError> {
        sessions_q::get(&self.db, id)
            .await?
            .ok_or_else(|| BerthError::not_found("session", id))
    }

    /// Full detail: session plus timeline plus claims.
    pub async fn detail(&self, id: &str) -> Result<SessionDetail, BerthError> {
        let session = self.get(id).await?;
        let notes = notes_q::list_for_session(&self.db, id, None, 1000).await?;
        let files = claims_q::list_for_session(&self.db, id).await?;
        Ok(SessionDetail {
            session,
            notes,
            files,
        })
    }

    pub async fn list(
        &self,
        status: Option<SessionStatus>,
        limit: i64,
    ) -> Result<Vec<SessionRow>, BerthError> {
        sessions_q::list(&self.db, status.map(|s| s.to_string()).as_deref(), limit).await
    }

    /// Append a note. With no session id, the caller's most recent active
    /// session is used; with none of those either, an implicit session is
    /// created.
    pub async fn add_note(&self, input: AddNote) -> Result<NoteRow, BerthError> {
        if input.content.trim().is_empty() {
            return Err(BerthError::validation("note content must not be empty"));
        }
        let creator = self.resolve_creator(input.created_by.clone());
        let now = now_ms();

        let session = match &input.session_id {
            Some(id) => {
                let session = sessions_q::get(&self.db, id)
                    .await?
                    .ok_or_else(|| BerthError::not_found("session", id.clone()))?;
                if session.status != SessionStatus::Active.to_string() {
                    return Err(BerthError::conflict(format!(
                        "session {id} is {} and read-only",
                        session.status
                    )));
                }
                session
            }
            None => match sessions_q::latest_active_for(&self.db, &creator).await? {
                Some(session) => session,
                None => {
                    let outcome = self
                        .start(StartSession {
                            purpose: QUICK_NOTE_PURPOSE.to_string(),
                            agent_id: Some(creator.clone()),
                            ..Default::default()
                        })
                        .await?;
                    outcome.session
                }
            },
        };

        let note_type = input
            .note_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_NOTE_TYPE.to_string());
        let note_id = notes_q::insert(
            &self.db,
            &session.id,
            &note_type,
            &input.content,
            &creator,
            now,
        )
        .await?;
        sessions_q::touch_updated(&self.db, &session.id, now).await?;
        self.activity
            .record("note", "add", Some(&session.id), None, Some(&creator))
            .await;

        Ok(NoteRow {
            id: note_id,
            session_id: session.id,
            note_type,
            content: input.content,
            created_by: creator,
            created_at: now,
        })
    }

    /// Notes for one session (append order) or across sessions (newest first).
    pub async fn list_notes(
        &self,
        session_id: Option<&str>,
        note_type: Option<&str>,
        limit: i64,
    ) -> Result<Vec<NoteRow>, BerthError> {
        match session_id {
            Some(id) => {
                // Listing notes of an unknown session is a 404, not an empty list.
                self.get(id).await?;
                notes_q::list_for_session(&self.db, id, note_type, limit).await
            }
            None => notes_q::list_recent(&self.db, note_type, limit).await,
        }
    }

    /// Add claims to a running session. Same advisory semantics as start.
    pub async fn add_files(
        &self,
        id: &str,
        paths: Vec<String>,
        force: bool,
    ) -> Result<AddFilesOutcome, BerthError> {
        let session = self.get(id).await?;
        if session.status != SessionStatus::Active.to_string() {
            return Err(BerthError::conflict(format!(
                "session {id} is {} and read-only",
                session.status
            )));
        }
        let now = now_ms();
        let (claimed, conflicts) = self.claim_paths(id, paths, force, now).await?;
        sessions_q::touch_updated(&self.db, id, now).await?;
        self.activity
            .record(
                "session",
                "add_files",
                Some(id),
                Some(serde_json::json!({ "claimed": claimed })),
                Some(&session.created_by),
            )
            .await;
        Ok(AddFilesOutcome { claimed, conflicts })
    }

    /// Drop claims from a running session. Returns the count removed.
    pub async fn remove_files(&self, id: &str, paths: Vec<String>) -> Result<u64, BerthError> {
        let session = self.get(id).await?;
        if session.status != SessionStatus::Active.to_string() {
            return Err(BerthError::conflict(format!(
                "session {id} is {} and read-only",
                session.status
            )));
        }
        let now = now_ms();
        let removed = claims_q::delete(&self.db, id, paths).await?;
        sessions_q::touch_updated(&self.db, id, now).await?;
        self.activity
            .record("session", "remove_files", Some(id), None, Some(&session.created_by))
            .await;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup() -> (SessionService, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Arc::new(
            Database::open(dir.path().join("t.db").to_str().unwrap())
                .await
                .unwrap(),
        );
        let activity = Arc::new(ActivityLog::new(db.clone()));
        let service = SessionService::new(db, activity, Some("default-agent".to_string()));
        (service, dir)
    }

    fn start_input(purpose: &str, agent: &str, files: &[&str]) -> StartSession {
        StartSession {
            purpose: purpose.to_string(),
            files: files.iter().map(|s| s.to_string()).collect(),
            identity: None,
            agent_id: Some(agent.to_string()),
            force: false,
        }
    }

    #[tokio::test]
    async fn start_claims_files_and_reports_conflicts() {
        let (service, _dir) = setup().await;
        let first = service
            .start(start_input("refactor auth", "alpha", &["src/auth.rs"]))
            .await
            .unwrap();
        assert_eq!(first.claimed, vec!["src/auth.rs"]);
        assert!(first.conflicts.is_empty());

        // Second session wants the same path: session created, claim skipped.
        let second = service
            .start(start_input("also auth", "beta", &["src/auth.rs", "src/db.rs"]))
            .await
            .unwrap();
        assert_eq!(second.claimed, vec!["src/db.rs"]);
        assert_eq!(second.conflicts.len(), 1);
        assert_eq!(second.conflicts[0].held_by, "alpha");

        let detail = service.detail(&second.session.id).await.unwrap();
        assert_eq!(detail.files.len(), 1, "conflicting path not claimed");
    }

    #[tokio::test]
    async fn force_claims_conflicting_paths() {
        let (service, _dir) = setup().await;
        service
            .start(start_input("one", "alpha", &["shared.rs"]))
            .await
            .unwrap();

        let mut input = start_input("two", "beta", &["shared.rs"]);
        input.force = true;
        let outcome = service.start(input).await.unwrap();
        assert_eq!(outcome.claimed, vec!["shared.rs"]);
        assert_eq!(outcome.conflicts.len(), 1, "conflict still reported");
    }

    #[tokio::test]
    async fn end_is_idempotent_and_sticky() {
        let (service, _dir) = setup().await;
        let started = service
            .start(start_input("work", "alpha", &[]))
            .await
            .unwrap();
        let id = started.session.id;

        let ended = service
            .end(&id, SessionStatus::Completed, Some("done".to_string()))
            .await
            .unwrap();
        assert_eq!(ended.status, "completed");

        // A second end with a different terminal status changes nothing.
        let again = service.end(&id, SessionStatus::Abandoned, None).await.unwrap();
        assert_eq!(again.status, "completed");

        // The farewell note landed before the transition.
        let detail = service.detail(&id).await.unwrap();
        assert_eq!(detail.notes.len(), 1);
        assert_eq!(detail.notes[0].content, "done");
    }

    #[tokio::test]
    async fn delete_cascades_notes_and_claims() {
        let (service, _dir) = setup().await;
        let started = service
            .start(start_input("work", "alpha", &["a.rs"]))
            .await
            .unwrap();
        let id = started.session.id;
        service
            .add_note(AddNote {
                session_id: Some(id.clone()),
                content: "note".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        service.delete(&id).await.unwrap();
        assert!(matches!(
            service.detail(&id).await,
            Err(BerthError::NotFound { .. })
        ));
        let orphans = service.list_notes(None, None, 100).await.unwrap();
        assert!(orphans.is_empty());
    }

    #[tokio::test]
    async fn bare_note_finds_or_creates_a_session() {
        let (service, _dir) = setup().await;

        // No session anywhere: an implicit one appears.
        let note = service
            .add_note(AddNote {
                content: "remember this".to_string(),
                created_by: Some("alpha".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let session = service.get(&note.session_id).await.unwrap();
        assert_eq!(session.purpose, "quick note");
        assert_eq!(session.created_by, "alpha");

        // Next bare note reuses the same active session.
        let second = service
            .add_note(AddNote {
                content: "and this".to_string(),
                created_by: Some("alpha".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(second.session_id, note.session_id);
    }

    #[tokio::test]
    async fn terminal_sessions_are_read_only() {
        let (service, _dir) = setup().await;
        let started = service.start(start_input("work", "alpha", &[])).await.unwrap();
        let id = started.session.id;
        service.end(&id, SessionStatus::Completed, None).await.unwrap();

        let note = service
            .add_note(AddNote {
                session_id: Some(id.clone()),
                content: "too late".to_string(),
                ..Default::default()
            })
            .await;
        assert!(matches!(note, Err(BerthError::Conflict { .. })));

        let files = service.add_files(&id, vec!["x.rs".to_string()], false).await;
        assert!(matches!(files, Err(BerthError::Conflict { .. })));
    }

    #[tokio::test]
    async fn remove_files_releases_claims() {
        let (service, _dir) = setup().await;
        let started = service
            .start(start_input("work", "alpha", &["a.rs", "b.rs"]))
            .await
            .unwrap();
        let id = started.session.id;

        let removed = service
            .remove_files(&id, vec!["a.rs".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);

        // The path is claimable by others now.
        let other = service
            .start(start_input("other", "beta", &["a.rs"]))
            .await
            .unwrap();
        assert_eq!(other.claimed, vec!["a.rs"]);
        assert!(other.conflicts.is_empty());
    }
}
