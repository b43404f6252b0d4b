use std::fmt;

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityRef;

/// How a delegation policy is applied while a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelegationMode {
    /// Delegation is offered as tools and checked against the policy.
    #[default]
    Enforced,
    /// The policy is only rendered into the agent's prompt.
    Advisory,
}

impl DelegationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DelegationMode::Enforced => "enforced",
            DelegationMode::Advisory => "advisory",
        }
    }
}

/// Coworker roles an agent may hand work to. Empty means no delegation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegationPolicy {
    coworkers: Vec<String>,
}

impl DelegationPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn to<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            coworkers: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.coworkers.is_empty()
    }

    pub fn coworkers(&self) -> &[String] {
        &self.coworkers
    }

    /// Role names are matched case-insensitively, ignoring surrounding
    /// whitespace and quotes that models like to add.
    pub fn allows(&self, role: &str) -> bool {
        let wanted = normalize_role(role);
        self.coworkers
            .iter()
            .any(|coworker| normalize_role(coworker) == wanted)
    }
}

pub(crate) fn normalize_role(role: &str) -> String {
    role.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_lowercase()
}

/// A named role with a goal, a behavioural charter and optional tools.
#[derive(Clone)]
pub struct Agent {
    role: String,
    goal: String,
    backstory: String,
    capabilities: Vec<CapabilityRef>,
    delegation: DelegationPolicy,
}

impl Agent {
    pub fn new(
        role: impl Into<String>,
        goal: impl Into<String>,
        backstory: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            goal: goal.into(),
            backstory: backstory.into(),
            capabilities: Vec::new(),
            delegation: DelegationPolicy::none(),
        }
    }

    pub fn with_capability(mut self, capability: CapabilityRef) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn with_delegation(mut self, policy: DelegationPolicy) -> Self {
        self.delegation = policy;
        self
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn backstory(&self) -> &str {
        &self.backstory
    }

    pub fn capabilities(&self) -> &[CapabilityRef] {
        &self.capabilities
    }

    pub fn delegation(&self) -> &DelegationPolicy {
        &self.delegation
    }

    pub fn can_delegate(&self) -> bool {
        !self.delegation.is_empty()
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("role", &self.role)
            .field("capabilities", &self.capabilities)
            .field("delegation", &self.delegation)
            .finish()
    }
}
