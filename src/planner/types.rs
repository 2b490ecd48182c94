use serde::{Deserialize, Deserializer, Serialize};

/// Ordering tier for follow-up questions. Declaration order is ask order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    Important,
    Optional,
}

impl<'de> Deserialize<'de> for Priority {
    /// Case-insensitive. Unknown tiers are asked last; null takes the default.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(value) = Option::<String>::deserialize(deserializer)? else {
            return Ok(Priority::default());
        };
        Ok(match value.trim().to_ascii_lowercase().as_str() {
            "critical" => Priority::Critical,
            "important" => Priority::Important,
            _ => Priority::Optional,
        })
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Important
    }
}

/// A piece of information the planner still needs from the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUp {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, alias = "rationale")]
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextStep {
    #[serde(rename = "ask")]
    Ask,
    #[serde(rename = "execute")]
    Execute,
}

impl Default for NextStep {
    fn default() -> Self {
        NextStep::Ask
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    GatheringInput,
    Executing,
}

/// Evolving record of one task across turns. Replaced wholesale by each
/// planner response after validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    #[serde(default)]
    pub task_summary: String,
    #[serde(alias = "followup_required")]
    pub needs_more_input: bool,
    #[serde(default, alias = "action", deserialize_with = "lenient_next_step")]
    pub next_step: NextStep,
    #[serde(default)]
    pub followups: Vec<FollowUp>,
    #[serde(default, alias = "answers", alias = "answer", deserialize_with = "empty_as_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "empty_as_none")]
    pub user_response: Option<String>,
}

impl Default for TaskState {
    fn default() -> Self {
        Self::seed()
    }
}

impl TaskState {
    /// State at task start: nothing known, input needed, no questions yet.
    pub fn seed() -> Self {
        Self {
            task_summary: String::new(),
            needs_more_input: true,
            next_step: NextStep::Ask,
            followups: Vec::new(),
            result: None,
            user_response: None,
        }
    }

    /// Terminal state carrying `result`.
    pub fn finished(summary: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            task_summary: summary.into(),
            needs_more_input: false,
            next_step: NextStep::Execute,
            followups: Vec::new(),
            result: Some(result.into()),
            user_response: None,
        }
    }

    /// In-loop state asking `followups`.
    pub fn asking(summary: impl Into<String>, followups: Vec<FollowUp>) -> Self {
        Self {
            task_summary: summary.into(),
            needs_more_input: true,
            next_step: NextStep::Ask,
            followups,
            result: None,
            user_response: None,
        }
    }

    pub fn phase(&self) -> TaskPhase {
        if self.needs_more_input {
            TaskPhase::GatheringInput
        } else {
            TaskPhase::Executing
        }
    }

    /// needs_more_input <=> questions pending <=> no result.
    pub fn check(&self) -> Result<(), String> {
        let has_questions = !self.followups.is_empty();
        let has_result = self.result.as_deref().is_some_and(|r| !r.trim().is_empty());

        match (self.needs_more_input, has_questions, has_result) {
            (true, true, false) | (false, false, true) => Ok(()),
            (true, false, _) => Err("needs more input but no follow-up questions".to_string()),
            (true, true, true) => Err("needs more input but already carries a result".to_string()),
            (false, true, _) => Err("finished but still has follow-up questions".to_string()),
            (false, false, false) => Err("finished without a result".to_string()),
        }
    }

    /// Questions in ask order: critical, important, optional; planner order
    /// within a tier.
    pub fn ordered_followups(&self) -> Vec<FollowUp> {
        let mut ordered = self.followups.clone();
        ordered.sort_by_key(|f| f.priority);
        ordered
    }
}

impl FollowUp {
    pub fn new(field: &str, question: &str, priority: Priority) -> Self {
        Self {
            field: field.to_string(),
            question: question.to_string(),
            priority,
            reason: String::new(),
        }
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn lenient_next_step<'de, D>(deserializer: D) -> Result<NextStep, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(match value.as_deref().map(str::trim) {
        Some("execute") | Some("create_plan") => NextStep::Execute,
        // Anything else is re-derived from needs_more_input during validation.
        _ => NextStep::Ask,
    })
}
