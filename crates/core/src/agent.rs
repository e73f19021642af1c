//! Agent roles and their fixed lookup tables.
//!
//! Every step in a pipeline is executed "as" some role. A role determines the
//! system prompt sent with the step and the memory type recorded for it.
//! Unknown role names are kept verbatim as [`AgentRole::Custom`] and fall
//! back to generic defaults.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Memory type used for roles without a dedicated entry.
pub const GENERAL_MEMORY_TYPE: &str = "general-experience";

/// A named behavioral profile applied to one completion call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgentRole {
    Interpreter,
    Analysis,
    Retrieval,
    Coder,
    Judge,
    CodeJudge,
    Supervisor,
    WorkflowDirector,
    MemoryPruner,
    Custom(String),
}

impl AgentRole {
    /// All roles with a dedicated table entry.
    pub const KNOWN: [AgentRole; 9] = [
        AgentRole::Interpreter,
        AgentRole::Analysis,
        AgentRole::Retrieval,
        AgentRole::Coder,
        AgentRole::Judge,
        AgentRole::CodeJudge,
        AgentRole::Supervisor,
        AgentRole::WorkflowDirector,
        AgentRole::MemoryPruner,
    ];

    /// Parse a role name. Matching is case-insensitive and tolerant of
    /// `_` vs `-`; anything unrecognized becomes `Custom`.
    pub fn parse(name: &str) -> Self {
        let normalized = name.trim().to_lowercase().replace('_', "-");
        match normalized.as_str() {
            "interpreter" => AgentRole::Interpreter,
            "analysis" => AgentRole::Analysis,
            "retrieval" => AgentRole::Retrieval,
            "coder" => AgentRole::Coder,
            "judge" => AgentRole::Judge,
            "code-judge" => AgentRole::CodeJudge,
            "supervisor" => AgentRole::Supervisor,
            "workflow-director" => AgentRole::WorkflowDirector,
            "memory-pruner" => AgentRole::MemoryPruner,
            _ => AgentRole::Custom(name.trim().to_string()),
        }
    }

    /// Canonical kebab-case name.
    pub fn as_str(&self) -> &str {
        match self {
            AgentRole::Interpreter => "interpreter",
            AgentRole::Analysis => "analysis",
            AgentRole::Retrieval => "retrieval",
            AgentRole::Coder => "coder",
            AgentRole::Judge => "judge",
            AgentRole::CodeJudge => "code-judge",
            AgentRole::Supervisor => "supervisor",
            AgentRole::WorkflowDirector => "workflow-director",
            AgentRole::MemoryPruner => "memory-pruner",
            AgentRole::Custom(name) => name,
        }
    }

    /// The memory type recorded for steps executed by this role.
    pub fn memory_type(&self) -> &'static str {
        match self {
            AgentRole::Interpreter => "requirements-analysis",
            AgentRole::Analysis => "code-analysis",
            AgentRole::Retrieval => "knowledge-retrieval",
            AgentRole::Coder => "implementation-patterns",
            AgentRole::Judge | AgentRole::CodeJudge => "quality-assessment",
            AgentRole::Supervisor => "workflow-coordination",
            AgentRole::WorkflowDirector | AgentRole::MemoryPruner | AgentRole::Custom(_) => {
                GENERAL_MEMORY_TYPE
            }
        }
    }

    /// Fixed system prompt for this role.
    pub fn system_prompt(&self) -> String {
        let prompt = match self {
            AgentRole::Interpreter => {
                "You are the interpreter agent. Restate the user's request as precise \
                 requirements, note ambiguities and constraints, and identify which kind of \
                 specialist work the request needs."
            }
            AgentRole::Analysis => {
                "You are the analysis agent. Examine the code or problem described, identify \
                 structure, complexity, risks and defects, and report concrete findings."
            }
            AgentRole::Retrieval => {
                "You are the retrieval agent. Gather the background knowledge, documentation \
                 and prior art relevant to the request and summarize what matters."
            }
            AgentRole::Coder => {
                "You are the coder agent. Produce complete, working code that satisfies the \
                 requirements and analysis you are given. Prefer clarity over cleverness."
            }
            AgentRole::Judge => {
                "You are the judge agent. Evaluate the work produced so far against the \
                 original request and list any issues that still need to be fixed."
            }
            AgentRole::CodeJudge => {
                "You are the code judge agent. Review the generated code for correctness, \
                 error handling, style and test coverage, and state clearly whether fixes \
                 are needed."
            }
            AgentRole::Supervisor => {
                "You are the supervisor agent. Review everything the team produced and write \
                 the final deliverable for the user: a concise summary of what was done, the \
                 key results, and any open problems."
            }
            AgentRole::WorkflowDirector => {
                "You are the workflow director. You plan which specialist agents should run, \
                 in which order, and with what instructions, to satisfy a request."
            }
            AgentRole::MemoryPruner => {
                "You are the memory pruning agent. You decide which recorded agent memories \
                 remain useful for a new task and which are stale or redundant."
            }
            AgentRole::Custom(name) => {
                return format!(
                    "You are a specialized {name} agent. Apply your expertise to the task \
                     and report your results clearly."
                );
            }
        };
        prompt.to_string()
    }

    /// The supervisor closes a pipeline; nothing is scheduled after it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentRole::Supervisor)
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for AgentRole {
    fn from(name: &str) -> Self {
        AgentRole::parse(name)
    }
}

impl Serialize for AgentRole {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AgentRole {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(AgentRole::parse(&name))
    }
}
