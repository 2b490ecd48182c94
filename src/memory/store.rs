use crate::error::{EngineError, EngineResult};
use crate::memory::ids::category_of;
use crate::memory::reconcile::{self, ApplyReport, ReconciliationDecision};
use crate::memory::types::{CategorizedFact, FactLocation, FactStore, SaveSummary, Violation};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::{error, info, warn};

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strict load. A missing file is an empty store; anything that is not a
    /// category -> facts mapping is `CorruptStore`.
    pub fn load(path: &Path) -> EngineResult<Self> {
        if !path.exists() {
            warn!("Fact store {} not found, starting empty", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| EngineError::CorruptStore {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(&content).map_err(|reason| EngineError::CorruptStore {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Best-effort load: corruption degrades to an empty store.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(store) => {
                for v in store.violations() {
                    warn!("Loaded store {} has an invariant problem: {}", path.display(), v);
                }
                store
            }
            Err(e) => {
                error!("{}; continuing with an empty store", e);
                Self::default()
            }
        }
    }

    pub fn from_json(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| e.to_string())
    }

    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string_pretty(self).map_err(|e| e.to_string())
    }

    pub fn save(&self, path: &Path) -> EngineResult<SaveSummary> {
        let persistence = |reason: String| EngineError::Persistence {
            path: path.to_path_buf(),
            reason,
        };
        let json = self.to_json().map_err(persistence)?;
        fs::write(path, json).map_err(|e| persistence(e.to_string()))?;

        let summary = self.summary();
        info!(
            "Saved {} facts across {} categories to {}",
            summary.facts,
            summary.categories,
            path.display()
        );
        Ok(summary)
    }

    pub fn summary(&self) -> SaveSummary {
        SaveSummary {
            facts: self.fact_count(),
            categories: self.categories.len(),
        }
    }

    pub fn fact_count(&self) -> usize {
        self.categories.values().map(|c| c.facts.len()).sum()
    }

    /// Linear scan. Uniqueness makes the first hit the only hit.
    pub fn find_fact(&self, fact_id: &str) -> EngineResult<FactLocation> {
        for (name, category) in &self.categories {
            if let Some(index) = category.facts.iter().position(|f| f.id == fact_id) {
                return Ok(FactLocation {
                    category: name.clone(),
                    index,
                });
            }
        }
        Err(EngineError::NotFound(fact_id.to_string()))
    }

    pub fn contains(&self, fact_id: &str) -> bool {
        self.find_fact(fact_id).is_ok()
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    /// All facts, category order then insertion order.
    pub fn flatten(&self) -> Vec<CategorizedFact> {
        self.categories
            .iter()
            .flat_map(|(name, category)| {
                category.facts.iter().map(move |fact| CategorizedFact {
                    category: name.clone(),
                    fact: fact.clone(),
                })
            })
            .collect()
    }

    pub fn violations(&self) -> BTreeSet<Violation> {
        let mut seen = HashSet::new();
        let mut out = BTreeSet::new();
        for (name, category) in &self.categories {
            for fact in &category.facts {
                if !seen.insert(fact.id.as_str()) {
                    out.insert(Violation::DuplicateId(fact.id.clone()));
                }
                let expected = category_of(&fact.id);
                if &expected != name {
                    out.insert(Violation::MisfiledFact {
                        id: fact.id.clone(),
                        filed_under: name.clone(),
                        expected,
                    });
                }
            }
        }
        out
    }
}

fn registry() -> &'static Mutex<HashMap<PathBuf, Weak<RwLock<FactStore>>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Weak<RwLock<FactStore>>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Stable identity for a store path, whether or not the file exists yet.
fn store_identity(path: &Path) -> PathBuf {
    if let Ok(p) = fs::canonicalize(path) {
        return p;
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match (fs::canonicalize(parent), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

/// Process-wide handle to one persisted fact store.
///
/// Single writer: a reconciliation holds the write lock from the moment it
/// reads the facts it reasons about until its save completes. Readers get
/// snapshots and never observe a half-applied decision.
#[derive(Clone)]
pub struct SharedFactStore {
    path: PathBuf,
    inner: Arc<RwLock<FactStore>>,
}

impl SharedFactStore {
    /// Opening a path that is already open in this process returns a handle
    /// to the same in-memory store and lock.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let identity = store_identity(&path);
        let mut map = registry().lock().unwrap_or_else(|p| p.into_inner());

        if let Some(inner) = map.get(&identity).and_then(Weak::upgrade) {
            return Self { path, inner };
        }

        let inner = Arc::new(RwLock::new(FactStore::load_or_empty(&path)));
        map.insert(identity, Arc::downgrade(&inner));
        map.retain(|_, w| w.strong_count() > 0);
        Self { path, inner }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn snapshot(&self) -> FactStore {
        self.inner.read().await.clone()
    }

    /// Take the single-writer lock.
    pub async fn writer(&self) -> StoreWriter<'_> {
        StoreWriter {
            path: &self.path,
            guard: self.inner.write().await,
        }
    }

    /// Apply an already-known decision (no proposal step).
    pub async fn apply(&self, decision: &ReconciliationDecision, now: &str) -> EngineResult<ApplyReport> {
        self.writer().await.apply(decision, now)
    }
}

pub struct StoreWriter<'a> {
    path: &'a Path,
    guard: RwLockWriteGuard<'a, FactStore>,
}

impl StoreWriter<'_> {
    pub fn facts(&self) -> &FactStore {
        &self.guard
    }

    /// Mutate, validate, persist. On validation failure nothing changes.
    /// On persistence failure the in-memory store keeps the change (usable for
    /// this process) and the error is returned.
    pub fn apply(&mut self, decision: &ReconciliationDecision, now: &str) -> EngineResult<ApplyReport> {
        if decision.is_noop() {
            info!("No changes to apply");
            return Ok(ApplyReport::default());
        }

        let before = self.guard.violations();
        let mut working = self.guard.clone();
        let mut report = reconcile::apply(&mut working, decision, now);

        let introduced: Vec<String> = working
            .violations()
            .difference(&before)
            .map(ToString::to_string)
            .collect();
        if !introduced.is_empty() {
            error!("Rejected reconciliation: {}", introduced.join("; "));
            return Err(EngineError::InvariantViolation(introduced.join("; ")));
        }

        *self.guard = working;
        report.saved = Some(self.guard.save(self.path)?);
        Ok(report)
    }
}
