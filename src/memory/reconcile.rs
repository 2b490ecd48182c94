use crate::memory::ids::{category_of, is_well_formed, next_id};
use crate::memory::types::{Category, Fact, FactId, FactStore, SaveSummary};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One proposed fact: an id plus the full sentence it should read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactProposal {
    #[serde(default)]
    pub fact_id: FactId,
    #[serde(rename = "fact", alias = "text", default)]
    pub text: String,
}

impl FactProposal {
    pub fn new(fact_id: impl Into<FactId>, text: impl Into<String>) -> Self {
        Self {
            fact_id: fact_id.into(),
            text: text.into(),
        }
    }
}

/// Externally produced instruction for the fact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ReconciliationDecision {
    Add {
        #[serde(default)]
        additions: Vec<FactProposal>,
    },
    Update {
        #[serde(default)]
        updates: Vec<FactProposal>,
    },
    Both {
        #[serde(default)]
        updates: Vec<FactProposal>,
        #[serde(default)]
        additions: Vec<FactProposal>,
    },
    #[serde(rename = "nothing", alias = "noop", alias = "no_op")]
    NoOp,
}

impl ReconciliationDecision {
    pub fn is_noop(&self) -> bool {
        matches!(self, ReconciliationDecision::NoOp)
    }

    pub fn updates(&self) -> &[FactProposal] {
        match self {
            ReconciliationDecision::Update { updates } | ReconciliationDecision::Both { updates, .. } => updates.as_slice(),
            _ => &[],
        }
    }

    pub fn additions(&self) -> &[FactProposal] {
        match self {
            ReconciliationDecision::Add { additions } | ReconciliationDecision::Both { additions, .. } => additions.as_slice(),
            _ => &[],
        }
    }
}

/// What an application actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub added: Vec<FactId>,
    pub updated: Vec<FactId>,
    /// Update targets that did not exist.
    pub skipped: Vec<FactId>,
    /// Add entries whose id already existed; applied as updates.
    pub collisions: Vec<FactId>,
    /// (proposed, minted) for add entries that arrived without a usable id.
    pub minted: Vec<(FactId, FactId)>,
    /// Entries dropped for carrying no text, or for needing an id when none
    /// is left in their category.
    pub malformed: usize,
    pub saved: Option<SaveSummary>,
}

impl ApplyReport {
    pub fn changed(&self) -> bool {
        !(self.added.is_empty() && self.updated.is_empty() && self.collisions.is_empty())
    }
}

/// Apply `decision` to `store` in place. Updates run before additions.
/// Never fails: misses, collisions and empty entries are absorbed and reported.
pub fn apply(store: &mut FactStore, decision: &ReconciliationDecision, now: &str) -> ApplyReport {
    let mut report = ApplyReport::default();

    for update in decision.updates() {
        if update.text.trim().is_empty() {
            warn!("Dropping update for '{}' with empty text", update.fact_id);
            report.malformed += 1;
            continue;
        }
        if revise(store, &update.fact_id, &update.text, now) {
            info!("Updated fact: {}", update.fact_id);
            report.updated.push(update.fact_id.clone());
        } else {
            warn!("Could not find fact with id '{}', skipping update", update.fact_id);
            report.skipped.push(update.fact_id.clone());
        }
    }

    for addition in decision.additions() {
        if addition.text.trim().is_empty() {
            warn!("Dropping addition '{}' with empty text", addition.fact_id);
            report.malformed += 1;
            continue;
        }

        let mut fact_id = addition.fact_id.trim().to_string();
        if !is_well_formed(&fact_id) {
            let category = category_of(&fact_id);
            let Some(minted) = next_id(&category, store) else {
                warn!("No free id left in {}, dropping addition '{}'", category, fact_id);
                report.malformed += 1;
                continue;
            };
            warn!("Addition id '{}' is not usable, minted '{}'", fact_id, minted);
            report.minted.push((fact_id, minted.clone()));
            fact_id = minted;
        }

        if revise(store, &fact_id, &addition.text, now) {
            warn!("Addition '{}' collides with an existing fact, applied as update", fact_id);
            report.collisions.push(fact_id);
            continue;
        }

        let category = category_of(&fact_id);
        store
            .categories
            .entry(category.clone())
            .or_insert_with(|| Category::new(&category))
            .facts
            .push(Fact::new(fact_id.clone(), addition.text.clone(), now));
        info!("Added new fact: {} to category {}", fact_id, category);
        report.added.push(fact_id);
    }

    report
}

fn revise(store: &mut FactStore, fact_id: &str, text: &str, now: &str) -> bool {
    let Ok(location) = store.find_fact(fact_id) else {
        return false;
    };
    match store.categories.get_mut(&location.category) {
        Some(category) => {
            category.facts[location.index].revise(text, now);
            true
        }
        None => false,
    }
}
