use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier assigned to a proposal by the store on first save.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(pub Uuid);

impl ProposalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProposalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle stage of a proposal, in forward order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Draft,
    Generating,
    Validating,
    PendingApproval,
    Approved,
    Merged,
    Deployed,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Draft,
        Stage::Generating,
        Stage::Validating,
        Stage::PendingApproval,
        Stage::Approved,
        Stage::Merged,
        Stage::Deployed,
    ];

    /// Position in the forward progression.
    pub fn ordinal(self) -> u8 {
        match self {
            Stage::Draft => 0,
            Stage::Generating => 1,
            Stage::Validating => 2,
            Stage::PendingApproval => 3,
            Stage::Approved => 4,
            Stage::Merged => 5,
            Stage::Deployed => 6,
        }
    }

    /// Whether moving from `self` to `next` is allowed: forward moves, or a
    /// failed generation or validation falling back to `draft`.
    pub fn can_move_to(self, next: Stage) -> bool {
        if next == Stage::Draft {
            return matches!(
                self,
                Stage::Generating | Stage::Validating | Stage::PendingApproval
            );
        }
        next.ordinal() > self.ordinal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Draft => "draft",
            Stage::Generating => "generating",
            Stage::Validating => "validating",
            Stage::PendingApproval => "pending_approval",
            Stage::Approved => "approved",
            Stage::Merged => "merged",
            Stage::Deployed => "deployed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed code units a proposal carries.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Frontend,
    Backend,
    Database,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Frontend,
        ArtifactKind::Backend,
        ArtifactKind::Database,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Frontend => "frontend",
            ArtifactKind::Backend => "backend",
            ArtifactKind::Database => "database",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArtifactKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown artifact {s:?} (expected frontend, backend or database)"))
    }
}

/// Generated source for each artifact kind. Empty means "not generated yet".
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    #[serde(default)]
    pub frontend: String,
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub database: String,
}

impl Artifacts {
    pub fn get(&self, kind: ArtifactKind) -> &str {
        match kind {
            ArtifactKind::Frontend => &self.frontend,
            ArtifactKind::Backend => &self.backend,
            ArtifactKind::Database => &self.database,
        }
    }

    pub fn set(&mut self, kind: ArtifactKind, content: impl Into<String>) {
        let slot = match kind {
            ArtifactKind::Frontend => &mut self.frontend,
            ArtifactKind::Backend => &mut self.backend,
            ArtifactKind::Database => &mut self.database,
        };
        *slot = content.into();
    }

    pub fn is_empty(&self) -> bool {
        ArtifactKind::ALL.iter().all(|k| self.get(*k).trim().is_empty())
    }
}

/// One generation attempt and everything the lifecycle learned about it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: Option<ProposalId>,
    pub title: String,
    pub description: String,
    pub artifacts: Artifacts,
    pub stage: Stage,
    pub validation_score: Option<u8>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub integration_ref: Option<String>,
    #[serde(default)]
    pub deployment_url: Option<String>,
}

impl Proposal {
    /// Creates an unsaved draft.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            description: description.into(),
            artifacts: Artifacts::default(),
            stage: Stage::Draft,
            validation_score: None,
            recommendations: Vec::new(),
            integration_ref: None,
            deployment_url: None,
        }
    }

    /// Sets the stage. Staying put is always fine; anything else must be a
    /// move [`Stage::can_move_to`] allows.
    pub(crate) fn move_to(&mut self, next: Stage) {
        debug_assert!(
            next == self.stage || self.stage.can_move_to(next),
            "illegal stage move {} -> {next}",
            self.stage
        );
        self.stage = next;
    }
}
