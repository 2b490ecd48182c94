use crate::memory::types::{CategoryName, FactId, FactStore};

pub const ID_SEPARATOR: char = '_';
pub const SEQUENCE_WIDTH: usize = 3;
pub const DEFAULT_CATEGORY: &str = "Lifestyle";

/// Static prefix -> category table. Closed set; not inferred.
const CATEGORY_TABLE: &[(&str, &str)] = &[
    ("travel", "Travel"),
    ("health", "Health"),
    ("family", "Family"),
    ("pet", "Pets"),
    ("hobby", "Hobbies"),
    ("work", "Work"),
    ("financial", "Financial"),
    ("education", "Education"),
    ("lifestyle", "Lifestyle"),
    ("social", "Social"),
    ("personality", "Personality"),
    ("values", "Values"),
    ("preferences", "Preferences"),
];

/// Substring before the first separator (the whole id if there is none).
pub fn prefix_of(fact_id: &str) -> &str {
    fact_id.split(ID_SEPARATOR).next().unwrap_or("")
}

/// Category a fact id belongs to. Unknown prefixes fall back to `Lifestyle`.
pub fn category_of(fact_id: &str) -> CategoryName {
    let prefix = prefix_of(fact_id).to_ascii_lowercase();
    CATEGORY_TABLE
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, c)| *c)
        .unwrap_or(DEFAULT_CATEGORY)
        .to_string()
}

/// Id prefix used when minting ids for `category`.
pub fn prefix_for(category: &str) -> String {
    CATEGORY_TABLE
        .iter()
        .find(|(_, c)| c.eq_ignore_ascii_case(category))
        .map(|(p, _)| p.to_string())
        .unwrap_or_else(|| category.to_ascii_lowercase())
}

/// Numeric sequence of an id, if it has the `<prefix>_<digits>` shape.
pub fn sequence_of(fact_id: &str) -> Option<u32> {
    let (prefix, seq) = fact_id.split_once(ID_SEPARATOR)?;
    if prefix.is_empty() || seq.is_empty() || !seq.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    seq.parse().ok()
}

pub fn is_well_formed(fact_id: &str) -> bool {
    sequence_of(fact_id).is_some()
}

/// Next free id in `category`'s namespace: max existing sequence + 1,
/// zero padded. Scans the whole store so the result never collides.
/// `None` once the namespace is exhausted.
pub fn next_id(category: &str, store: &FactStore) -> Option<FactId> {
    let prefix = prefix_for(category);
    let max = store
        .categories
        .values()
        .flat_map(|c| c.facts.iter())
        .filter(|f| prefix_of(&f.id).eq_ignore_ascii_case(&prefix))
        .filter_map(|f| sequence_of(&f.id))
        .max()
        .unwrap_or(0);

    let next = max.checked_add(1)?;
    Some(format!("{}{}{:0width$}", prefix, ID_SEPARATOR, next, width = SEQUENCE_WIDTH))
}
