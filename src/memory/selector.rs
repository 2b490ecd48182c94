use crate::memory::types::{CategorizedFact, Category, CategoryName, Fact, FactId, FactStore};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;

/// Category subset handed to the planner, best-first as the ranker ordered it.
/// Serializes as a JSON object whose keys keep that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategorySelection {
    pub categories: Vec<(CategoryName, Category)>,
}

impl CategorySelection {
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|(n, _)| n.as_str())
    }
}

impl Serialize for CategorySelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.categories.iter().map(|(n, c)| (n, c)))
    }
}

/// A fact picked by the fact ranker, with its place in the ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedFact {
    /// 1-based.
    pub rank: usize,
    pub category: CategoryName,
    pub fact_id: FactId,
    pub fact: Fact,
    pub similarity_score: f32,
}

/// Read-only views over a store snapshot. Nothing here mutates.
pub struct RelevanceSelector;

impl RelevanceSelector {
    /// Categories named in `names` (first `limit` only) that exist in `store`,
    /// in the order given. Unknown names are dropped without error and
    /// repeated names collapse onto their first position.
    pub fn by_category_names(store: &FactStore, names: &[String], limit: usize) -> CategorySelection {
        let mut seen: HashSet<&str> = HashSet::new();
        let categories = names
            .iter()
            .take(limit)
            .filter(|&name| seen.insert(name.as_str()))
            .filter_map(|name| {
                store
                    .categories
                    .get(name)
                    .map(|category| (name.clone(), category.clone()))
            })
            .collect();
        CategorySelection { categories }
    }

    /// Resolve a best-first `(fact id, score)` ranking against the corpus.
    /// First occurrence of an id wins; ids not in the corpus are skipped.
    pub fn by_ranked_facts(
        corpus: &[CategorizedFact],
        ranking: &[(FactId, f32)],
        limit: usize,
    ) -> Vec<RankedFact> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut results = Vec::new();

        for (fact_id, score) in ranking {
            if results.len() >= limit {
                break;
            }
            if !seen.insert(fact_id.as_str()) {
                continue;
            }
            let Some(entry) = corpus.iter().find(|c| &c.fact.id == fact_id) else {
                continue;
            };
            results.push(RankedFact {
                rank: results.len() + 1,
                category: entry.category.clone(),
                fact_id: fact_id.clone(),
                fact: entry.fact.clone(),
                similarity_score: *score,
            });
        }

        results
    }
}
