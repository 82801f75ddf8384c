use serde::{Deserialize, Serialize};

/// One stage of an institution's admission workflow. Stages form a directed
/// graph through `next_stages`; reachability and acyclicity are deliberately
/// not validated, misconfigured workflows are served as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDefinition {
    pub stage_id: u32,
    pub status_key: String,
    pub name: String,
    #[serde(default)]
    pub next_stages: Vec<u32>,
    /// Empty means any role may drive the transition into this stage.
    #[serde(default)]
    pub allowed_roles: Vec<String>,
    #[serde(default)]
    pub is_initial: bool,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub requires_documents: bool,
    #[serde(default)]
    pub requires_payment: bool,
}

/// Ordered stage list plus the optional pointer used when no stage carries
/// the initial flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub stages: Vec<StageDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_initial_stage: Option<u32>,
}

/// Owned projection of a stage, safe to hand to responses and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage_id: u32,
    pub status_key: String,
    pub name: String,
    pub is_final: bool,
}

impl From<&StageDefinition> for StageSummary {
    fn from(stage: &StageDefinition) -> Self {
        Self {
            stage_id: stage.stage_id,
            status_key: stage.status_key.clone(),
            name: stage.name.clone(),
            is_final: stage.is_final,
        }
    }
}

/// A transition the workflow allows, with the flags the caller must act on
/// before considering the move complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionGrant {
    pub from: StageSummary,
    pub to: StageSummary,
    pub requires_approval: bool,
    pub requires_documents: bool,
    pub requires_payment: bool,
}

/// Why a proposed transition was refused. Each variant carries enough to
/// build operator-facing guidance.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransitionDenial {
    #[error("institution has no admission workflow configured")]
    NoWorkflowConfigured,
    #[error("current status '{current_status}' is not a stage of the configured workflow")]
    InvalidCurrentStatus { current_status: String },
    #[error("target stage {target_stage_id} does not exist in the configured workflow")]
    UnknownTargetStage { target_stage_id: u32 },
    #[error("transition from '{from}' to '{to}' is not allowed")]
    TransitionNotAllowed {
        from: String,
        to: String,
        allowed: Vec<StageSummary>,
    },
    #[error("role '{actor_role}' is not authorized to move enrollments into '{target}'")]
    RoleNotAuthorized {
        actor_role: String,
        target: String,
        required_roles: Vec<String>,
    },
}

impl TransitionDenial {
    /// Stable machine-checkable reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            TransitionDenial::NoWorkflowConfigured => "no_workflow_configured",
            TransitionDenial::InvalidCurrentStatus { .. } => "invalid_current_status",
            TransitionDenial::UnknownTargetStage { .. } => "unknown_target_stage",
            TransitionDenial::TransitionNotAllowed { .. } => "transition_not_allowed",
            TransitionDenial::RoleNotAuthorized { .. } => "role_not_authorized",
        }
    }
}

impl WorkflowDefinition {
    pub fn stage_by_id(&self, stage_id: u32) -> Option<&StageDefinition> {
        self.stages.iter().find(|stage| stage.stage_id == stage_id)
    }

    pub fn stage_by_status(&self, status_key: &str) -> Option<&StageDefinition> {
        self.stages.iter().find(|stage| stage.status_key == status_key)
    }

    /// Resolution order: the stage flagged initial, else the stage named by
    /// `default_initial_stage`, else the first stage in definition order.
    pub fn initial_stage(&self) -> Option<&StageDefinition> {
        self.stages
            .iter()
            .find(|stage| stage.is_initial)
            .or_else(|| {
                self.default_initial_stage
                    .and_then(|stage_id| self.stage_by_id(stage_id))
            })
            .or_else(|| self.stages.first())
    }

    /// Decides whether an enrollment currently at `current_status_key` may
    /// move to `target_stage_id` when driven by `actor_role`. Pure function
    /// over this definition; the enrollment's status is the only mutable
    /// input.
    pub fn validate_transition(
        &self,
        current_status_key: &str,
        target_stage_id: u32,
        actor_role: &str,
    ) -> Result<TransitionGrant, TransitionDenial> {
        if self.stages.is_empty() {
            return Err(TransitionDenial::NoWorkflowConfigured);
        }

        let current = self.stage_by_status(current_status_key).ok_or_else(|| {
            TransitionDenial::InvalidCurrentStatus {
                current_status: current_status_key.to_string(),
            }
        })?;

        let target = self
            .stage_by_id(target_stage_id)
            .ok_or(TransitionDenial::UnknownTargetStage { target_stage_id })?;

        if !current.next_stages.contains(&target.stage_id) {
            let allowed = current
                .next_stages
                .iter()
                .filter_map(|stage_id| self.stage_by_id(*stage_id))
                .map(StageSummary::from)
                .collect();
            return Err(TransitionDenial::TransitionNotAllowed {
                from: current.status_key.clone(),
                to: target.status_key.clone(),
                allowed,
            });
        }

        if !target.allowed_roles.is_empty()
            && !target.allowed_roles.iter().any(|role| role == actor_role)
        {
            return Err(TransitionDenial::RoleNotAuthorized {
                actor_role: actor_role.to_string(),
                target: target.status_key.clone(),
                required_roles: target.allowed_roles.clone(),
            });
        }

        Ok(TransitionGrant {
            from: StageSummary::from(current),
            to: StageSummary::from(target),
            requires_approval: target.requires_approval,
            requires_documents: target.requires_documents,
            requires_payment: target.requires_payment,
        })
    }
}
