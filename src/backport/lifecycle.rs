use statig::prelude::*;

/// Progress of one backport operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    BranchCreated { backport_branch: String },
    PickStarted { sha: String },
    Applied,
    ConflictDetected { files: usize },
    AutoFixed,
    ResolutionStarted,
    CommitFinalized,
    AuthorReset,
    Pushed,
    LocalBranchDeleted,
    PullRequestPublished { number: u64 },
}

/// Tracks one target branch from branch creation to published pull request.
/// Out-of-order events are logged and ignored.
#[derive(Debug, Default)]
pub struct BackportLifecycle {
    pub target_branch: String,
    pub backport_branch: Option<String>,
    pub picked: usize,
    pub conflicts: usize,
}

impl BackportLifecycle {
    pub fn new(target_branch: impl Into<String>) -> Self {
        Self {
            target_branch: target_branch.into(),
            ..Default::default()
        }
    }

    fn ignore(&self, state: &str, event: &LifecycleEvent) -> Outcome<State> {
        tracing::warn!(
            target_branch = %self.target_branch,
            state,
            ?event,
            "Ignoring out-of-order lifecycle event"
        );
        Handled
    }
}

#[state_machine(initial = "State::pending()", state(derive(Debug, Clone, PartialEq, Eq)))]
impl BackportLifecycle {
    #[state]
    fn pending(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::BranchCreated { backport_branch } => {
                self.backport_branch = Some(backport_branch.clone());
                tracing::debug!(
                    target_branch = %self.target_branch,
                    backport_branch = %backport_branch,
                    "Backport branch created"
                );
                Transition(State::branch_created())
            }
            _ => self.ignore("pending", event),
        }
    }

    #[state]
    fn branch_created(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::PickStarted { sha } => {
                tracing::debug!(target_branch = %self.target_branch, sha = %sha, "Picking commit");
                Transition(State::picking())
            }
            _ => self.ignore("branch_created", event),
        }
    }

    #[state]
    fn picking(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Applied => {
                self.picked += 1;
                Transition(State::commit_finalized())
            }
            LifecycleEvent::ConflictDetected { files } => {
                self.conflicts += 1;
                tracing::debug!(target_branch = %self.target_branch, files, "Conflict detected");
                Transition(State::conflict_detected())
            }
            _ => self.ignore("picking", event),
        }
    }

    #[state]
    fn conflict_detected(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::AutoFixed | LifecycleEvent::ResolutionStarted => {
                Transition(State::resolving())
            }
            _ => self.ignore("conflict_detected", event),
        }
    }

    #[state]
    fn resolving(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::CommitFinalized => {
                self.picked += 1;
                Transition(State::commit_finalized())
            }
            _ => self.ignore("resolving", event),
        }
    }

    #[state]
    fn commit_finalized(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::PickStarted { sha } => {
                tracing::debug!(target_branch = %self.target_branch, sha = %sha, "Picking commit");
                Transition(State::picking())
            }
            LifecycleEvent::AuthorReset => Transition(State::author_reset()),
            LifecycleEvent::Pushed => Transition(State::pushed()),
            _ => self.ignore("commit_finalized", event),
        }
    }

    #[state]
    fn author_reset(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Pushed => Transition(State::pushed()),
            _ => self.ignore("author_reset", event),
        }
    }

    #[state]
    fn pushed(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::LocalBranchDeleted => Transition(State::local_branch_deleted()),
            _ => self.ignore("pushed", event),
        }
    }

    #[state]
    fn local_branch_deleted(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::PullRequestPublished { number } => {
                tracing::info!(
                    target_branch = %self.target_branch,
                    backport_branch = ?self.backport_branch,
                    picked = self.picked,
                    conflicts = self.conflicts,
                    number,
                    "Backport published"
                );
                Transition(State::published())
            }
            _ => self.ignore("local_branch_deleted", event),
        }
    }

    #[state]
    fn published(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        self.ignore("published", event)
    }
}
