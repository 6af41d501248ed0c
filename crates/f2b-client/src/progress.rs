//! Pipeline step tracking driven by free-form status text.
//!
//! The server reports progress as human-readable phrases. Each phrase is
//! matched (case-insensitive substring) against [`STATUS_RULES`] in order and
//! the first matching rule's effects are applied to a copy of the steps.
//! Unrecognized text leaves the steps untouched.

use serde::Serialize;

/// Label reported when no step is active.
pub const NO_ACTIVE_STEP_LABEL: &str = "Waiting";

/// Server-side pipeline stages, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Clone,
    Extract,
    Schema,
    Priority,
    Generate,
    Postman,
    Construct,
}

impl StepId {
    /// Every step in pipeline order.
    pub const ALL: [StepId; 7] = [
        StepId::Clone,
        StepId::Extract,
        StepId::Schema,
        StepId::Priority,
        StepId::Generate,
        StepId::Postman,
        StepId::Construct,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clone => "clone",
            Self::Extract => "extract",
            Self::Schema => "schema",
            Self::Priority => "priority",
            Self::Generate => "generate",
            Self::Postman => "postman",
            Self::Construct => "construct",
        }
    }

    /// Human-readable label for progress displays.
    pub fn label(self) -> &'static str {
        match self {
            Self::Clone => "Cloning repository",
            Self::Extract => "Extracting API endpoints",
            Self::Schema => "Designing database schema",
            Self::Priority => "Prioritizing endpoints",
            Self::Generate => "Generating backend code",
            Self::Postman => "Building Postman collection",
            Self::Construct => "Constructing project",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    #[default]
    Pending,
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressStep {
    pub id: StepId,
    pub label: &'static str,
    pub state: StepState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    Activate(StepId),
    Complete(StepId),
}

/// One row of the phrase table: any needle matching triggers every effect.
struct StatusRule {
    needles: &'static [&'static str],
    effects: &'static [Effect],
}

// Order matters: the first matching row wins. Needles are lowercase.
const STATUS_RULES: &[StatusRule] = &[
    StatusRule {
        needles: &["cloning", "starting code generation"],
        effects: &[Effect::Activate(StepId::Clone)],
    },
    StatusRule {
        needles: &["cloned successfully"],
        effects: &[
            Effect::Complete(StepId::Clone),
            Effect::Activate(StepId::Extract),
        ],
    },
    StatusRule {
        needles: &["endpoints extracted successfully"],
        effects: &[
            Effect::Complete(StepId::Extract),
            Effect::Activate(StepId::Schema),
            Effect::Activate(StepId::Priority),
        ],
    },
    // Priority work runs alongside schema design and may still be going.
    StatusRule {
        needles: &["schema generated successfully"],
        effects: &[Effect::Complete(StepId::Schema)],
    },
    StatusRule {
        needles: &["priority set successfully"],
        effects: &[
            Effect::Complete(StepId::Priority),
            Effect::Activate(StepId::Generate),
        ],
    },
    StatusRule {
        needles: &["backend code generated successfully"],
        effects: &[
            Effect::Complete(StepId::Generate),
            Effect::Activate(StepId::Postman),
        ],
    },
    StatusRule {
        needles: &["postman collection generated successfully"],
        effects: &[
            Effect::Complete(StepId::Postman),
            Effect::Activate(StepId::Construct),
        ],
    },
    StatusRule {
        needles: &["code constructed successfully"],
        effects: &[Effect::Complete(StepId::Construct)],
    },
];

fn matching_rule(status: &str) -> Option<&'static StatusRule> {
    let lowered = status.to_lowercase();
    STATUS_RULES
        .iter()
        .find(|rule| rule.needles.iter().any(|needle| lowered.contains(needle)))
}

/// Fixed, ordered set of pipeline steps. Only step states ever change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ProgressSteps {
    steps: Vec<ProgressStep>,
}

impl Default for ProgressSteps {
    fn default() -> Self {
        Self::initial()
    }
}

impl ProgressSteps {
    /// All steps pending.
    pub fn initial() -> Self {
        Self {
            steps: StepId::ALL
                .iter()
                .map(|&id| ProgressStep {
                    id,
                    label: id.label(),
                    state: StepState::Pending,
                })
                .collect(),
        }
    }

    pub fn as_slice(&self) -> &[ProgressStep] {
        &self.steps
    }

    pub fn state_of(&self, id: StepId) -> StepState {
        self.steps
            .iter()
            .find(|step| step.id == id)
            .map(|step| step.state)
            .unwrap_or_default()
    }

    /// Returns the steps after applying `status`; `self` is left untouched.
    pub fn apply(&self, status: &str) -> ProgressSteps {
        let mut next = self.clone();
        if let Some(rule) = matching_rule(status) {
            for effect in rule.effects {
                match *effect {
                    Effect::Activate(id) => next.set(id, StepState::Active),
                    Effect::Complete(id) => next.set(id, StepState::Completed),
                }
            }
        }
        next
    }

    /// Returns true if `status` matches a row of the phrase table.
    pub fn recognizes(status: &str) -> bool {
        matching_rule(status).is_some()
    }

    /// Every step marked completed, used once the job has produced its result.
    pub fn completed(&self) -> ProgressSteps {
        let mut next = self.clone();
        for step in &mut next.steps {
            step.state = StepState::Completed;
        }
        next
    }

    pub fn active(&self) -> impl Iterator<Item = &ProgressStep> {
        self.steps
            .iter()
            .filter(|step| step.state == StepState::Active)
    }

    /// The first active step's label, or [`NO_ACTIVE_STEP_LABEL`].
    pub fn current_label(&self) -> &'static str {
        self.active()
            .next()
            .map(|step| step.label)
            .unwrap_or(NO_ACTIVE_STEP_LABEL)
    }

    fn set(&mut self, id: StepId, state: StepState) {
        if let Some(step) = self.steps.iter_mut().find(|step| step.id == id) {
            step.state = state;
        }
    }
}
