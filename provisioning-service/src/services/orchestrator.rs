//! Provisioning orchestrator.
//!
//! Sequences identity creation, session restore and the directory write
//! under one explicit protocol. The two stores share no transaction, so the
//! workflow does not pretend atomicity: it classifies every run into a
//! closed outcome set where partial failure (an identity account with no
//! directory record) is a first-class, reportable state.

use std::sync::Arc;
use tokio::sync::Mutex;
use validator::Validate;

use crate::dtos::provisioning::ProvisionAccountRequest;
use crate::models::{DirectoryProfile, DirectoryRecord, IdentityId};
use crate::services::catalog::RoleCatalog;
use crate::services::directory::DirectoryStore;
use crate::services::error::{DirectoryError, IdentityError, OrphanReason, ProvisionError};
use crate::services::identity::{DisplayAttributes, IdentityProvider};
use crate::services::session::SessionGuard;

/// Terminal classification of one provisioning run.
#[derive(Debug)]
pub enum ProvisionOutcome {
    /// Both stores hold the account; the caller should reload its listings.
    Completed(DirectoryRecord),
    /// Nothing was created; a plain retry is safe.
    Failed(ProvisionError),
    /// The identity account exists without a directory record. The caller
    /// must not re-run the whole workflow (the email is now registered);
    /// the directory half can be retried alone with this identity id.
    Orphan {
        identity_id: IdentityId,
        reason: OrphanReason,
    },
}

#[derive(Debug, Clone, Copy)]
enum WorkflowState {
    ValidatingInput,
    CreatingIdentity,
    RestoringSession,
    WritingDirectory,
}

impl WorkflowState {
    fn as_str(self) -> &'static str {
        match self {
            WorkflowState::ValidatingInput => "validating_input",
            WorkflowState::CreatingIdentity => "creating_identity",
            WorkflowState::RestoringSession => "restoring_session",
            WorkflowState::WritingDirectory => "writing_directory",
        }
    }
}

#[derive(Clone)]
pub struct ProvisioningService {
    identity: Arc<dyn IdentityProvider>,
    directory: Arc<dyn DirectoryStore>,
    guard: SessionGuard,
    catalog: RoleCatalog,
    /// Single-flight lock: the ambient session is one shared resource, so at
    /// most one workflow may sit between snapshot and restore at a time.
    flight: Arc<Mutex<()>>,
}

impl ProvisioningService {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        directory: Arc<dyn DirectoryStore>,
        guard: SessionGuard,
        catalog: RoleCatalog,
    ) -> Self {
        Self {
            identity,
            directory,
            guard,
            catalog,
            flight: Arc::new(Mutex::new(())),
        }
    }

    /// Run the full provisioning protocol for one request.
    pub async fn provision(&self, req: ProvisionAccountRequest) -> ProvisionOutcome {
        tracing::debug!(
            state = WorkflowState::ValidatingInput.as_str(),
            email = %req.email,
            "Provisioning started"
        );
        if let Err(err) = self.validate(&req).await {
            return ProvisionOutcome::Failed(err);
        }

        // Steps 2-5 form the critical section over the ambient session.
        // The owned guard moves into the uncancellable region below.
        let flight = self.flight.clone().lock_owned().await;

        let Some(snapshot) = self.guard.snapshot().await else {
            return ProvisionOutcome::Failed(ProvisionError::NoOperatorSession);
        };

        tracing::debug!(
            state = WorkflowState::CreatingIdentity.as_str(),
            email = %req.email,
            "Creating identity account"
        );
        let attributes = DisplayAttributes {
            given_name: req.given_name.clone(),
            family_name: req.family_name.clone(),
        };
        let identity_id = match self
            .identity
            .create_account(&req.email, &req.password, attributes)
            .await
        {
            Ok(id) => id,
            Err(err @ IdentityError::Transient(_)) => {
                // No guarantee about the session after a transient failure:
                // re-verify, and restore if the slot no longer matches.
                if !self.guard.current_matches(&snapshot).await {
                    if let Err(restore_err) = self.guard.restore(&snapshot).await {
                        tracing::error!(
                            error = %restore_err,
                            "Session mutated during failed identity call and restore failed"
                        );
                    }
                }
                return ProvisionOutcome::Failed(ProvisionError::Identity(err));
            }
            Err(err) => {
                // Duplicate and weak-credential failures leave the session
                // untouched; nothing to roll back.
                return ProvisionOutcome::Failed(ProvisionError::Identity(err));
            }
        };

        // From here to the directory result the workflow must not be
        // abandoned: the ambient session belongs to the new account until
        // restore runs, and the created identity must never be dropped
        // silently. The region runs in its own task so a cancelled caller
        // defers rather than aborts it.
        let guard = self.guard.clone();
        let directory = self.directory.clone();
        let profile = req.profile();
        let role_id = req.role_id;
        let region = tokio::spawn(async move {
            let _flight = flight;

            tracing::debug!(
                state = WorkflowState::RestoringSession.as_str(),
                identity_id = %identity_id,
                "Restoring operator session"
            );
            if let Err(err) = guard.restore(&snapshot).await {
                tracing::error!(
                    identity_id = %identity_id,
                    error = %err,
                    "Identity account orphaned: operator session could not be restored"
                );
                return ProvisionOutcome::Orphan {
                    identity_id,
                    reason: OrphanReason::SessionRestore(err),
                };
            }

            tracing::debug!(
                state = WorkflowState::WritingDirectory.as_str(),
                identity_id = %identity_id,
                "Writing directory record"
            );
            match write_directory(directory.as_ref(), identity_id, &profile, role_id).await {
                Ok(record) => {
                    tracing::info!(
                        identity_id = %identity_id,
                        record_id = record.id,
                        "Provisioning completed"
                    );
                    ProvisionOutcome::Completed(record)
                }
                Err(reason) => {
                    tracing::error!(
                        identity_id = %identity_id,
                        reason = %reason,
                        "Identity account orphaned: directory record was not written"
                    );
                    ProvisionOutcome::Orphan {
                        identity_id,
                        reason,
                    }
                }
            }
        });

        match region.await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(
                    identity_id = %identity_id,
                    error = %err,
                    "Provisioning region did not complete"
                );
                ProvisionOutcome::Orphan {
                    identity_id,
                    reason: OrphanReason::Unverified,
                }
            }
        }
    }

    /// Retry only the directory half for an identity account that was left
    /// orphaned. Does not touch the identity provider, so it cannot collide
    /// on the email.
    pub async fn complete_orphan(
        &self,
        identity_id: IdentityId,
        profile: DirectoryProfile,
        role_id: i32,
    ) -> ProvisionOutcome {
        if !self.catalog.contains(role_id).await {
            return ProvisionOutcome::Failed(ProvisionError::Validation(format!(
                "unknown role id {}",
                role_id
            )));
        }

        // Still a session-dependent operation: serialize with full runs.
        let _flight = self.flight.lock().await;

        if self.guard.snapshot().await.is_none() {
            return ProvisionOutcome::Failed(ProvisionError::NoOperatorSession);
        }

        match write_directory(self.directory.as_ref(), identity_id, &profile, role_id).await {
            Ok(record) => {
                tracing::info!(
                    identity_id = %identity_id,
                    record_id = record.id,
                    "Orphaned account completed"
                );
                ProvisionOutcome::Completed(record)
            }
            Err(reason) => ProvisionOutcome::Orphan {
                identity_id,
                reason,
            },
        }
    }

    /// Local checks only; no remote call happens before these pass.
    async fn validate(&self, req: &ProvisionAccountRequest) -> Result<(), ProvisionError> {
        req.validate()
            .map_err(|e| ProvisionError::Validation(e.to_string()))?;
        if !self.catalog.contains(req.role_id).await {
            return Err(ProvisionError::Validation(format!(
                "unknown role id {}",
                req.role_id
            )));
        }
        Ok(())
    }
}

/// Directory write with the retry-safety normalization: a conflict means a
/// record already exists for this identity, which is success, and an
/// ambiguous timeout is reported for verification rather than discarded.
async fn write_directory(
    directory: &dyn DirectoryStore,
    identity_id: IdentityId,
    profile: &DirectoryProfile,
    role_id: i32,
) -> Result<DirectoryRecord, OrphanReason> {
    match directory.insert_account(identity_id, profile, role_id).await {
        Ok(record) => Ok(record),
        Err(DirectoryError::Conflict) => {
            tracing::info!(
                identity_id = %identity_id,
                "Directory record already exists, treating insert as idempotent success"
            );
            match directory.find_by_identity(identity_id).await {
                Ok(Some(record)) => Ok(record),
                // The conflict proves a record exists; if it cannot be
                // fetched right now the run still needs verification.
                Ok(None) | Err(_) => Err(OrphanReason::Unverified),
            }
        }
        Err(DirectoryError::Timeout) => Err(OrphanReason::Unverified),
        Err(err) => Err(OrphanReason::Directory(err)),
    }
}
