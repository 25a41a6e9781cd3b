// src/auth.rs
//! Capability guard. Every mutating engine operation asks `authorize` before
//! it touches the network; nothing else decides who may do what.

use std::fmt;

use crate::backend::Backend;
use crate::error::{FetchTarget, SyncError};
use crate::model::Principal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ReadPartitions,
    ListKeywords,
    AddKeyword,
    RemoveKeyword,
    Refilter,
    SubmitFeedback,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::ReadPartitions => "reading partitions",
            Action::ListKeywords => "listing keywords",
            Action::AddKeyword => "adding a keyword",
            Action::RemoveKeyword => "removing a keyword",
            Action::Refilter => "refilter",
            Action::SubmitFeedback => "submitting feedback",
        })
    }
}

impl Action {
    /// Kind of account the action needs, as shown in refusals.
    pub fn requirement(self) -> &'static str {
        match self {
            Action::ReadPartitions | Action::ListKeywords => "no account",
            Action::SubmitFeedback => "a signed-in account",
            Action::AddKeyword | Action::RemoveKeyword | Action::Refilter => {
                "a staff or superuser account"
            }
        }
    }
}

pub fn authorize(principal: &Principal, action: Action) -> bool {
    match action {
        Action::ReadPartitions | Action::ListKeywords => true,
        // The feedback endpoint only demands a logged-in user.
        Action::SubmitFeedback => principal.is_authenticated(),
        Action::AddKeyword | Action::RemoveKeyword | Action::Refilter => {
            principal.is_staff || principal.is_superuser
        }
    }
}

pub fn require(principal: &Principal, action: Action) -> Result<(), SyncError> {
    if authorize(principal, action) {
        Ok(())
    } else {
        tracing::debug!(target: "auth", ?action, user = ?principal.username, "action refused");
        Err(SyncError::Unauthorized { action })
    }
}

/// Ask the backend who we are. Falls back to the anonymous (read-only)
/// principal when no token is configured or the lookup fails.
pub async fn resolve_principal(backend: &dyn Backend) -> Principal {
    if !backend.has_credentials() {
        return Principal::anonymous();
    }
    match backend.current_principal().await {
        Ok(p) => {
            tracing::info!(
                target: "auth",
                user = ?p.username,
                is_staff = p.is_staff,
                is_superuser = p.is_superuser,
                "resolved principal"
            );
            p
        }
        Err(source) => {
            let rejected = matches!(source.status(), Some(401 | 403));
            let err = SyncError::FetchFailed {
                target: FetchTarget::Principal,
                source,
            };
            tracing::warn!(
                target: "auth",
                backend = backend.name(),
                rejected,
                error = %err,
                "principal lookup failed; continuing read-only"
            );
            Principal::anonymous()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutations_need_staff_or_superuser() {
        let plain = Principal::user("alice");
        let staff = Principal::staff("bob");
        let root = Principal {
            username: Some("root".into()),
            is_staff: false,
            is_superuser: true,
        };
        for action in [Action::AddKeyword, Action::RemoveKeyword, Action::Refilter] {
            assert!(!authorize(&plain, action), "{action} must be refused");
            assert!(authorize(&staff, action));
            assert!(authorize(&root, action));
        }
    }

    #[test]
    fn reads_are_open_and_feedback_needs_login() {
        let anon = Principal::anonymous();
        assert!(authorize(&anon, Action::ReadPartitions));
        assert!(authorize(&anon, Action::ListKeywords));
        assert!(!authorize(&anon, Action::SubmitFeedback));
        assert!(authorize(&Principal::user("alice"), Action::SubmitFeedback));
        assert!(matches!(
            require(&anon, Action::Refilter),
            Err(SyncError::Unauthorized {
                action: Action::Refilter
            })
        ));
    }
}
