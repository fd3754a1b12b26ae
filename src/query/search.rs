//! Tiered string search
//!
//! A keyword is matched in tiers of increasing cost and decreasing
//! precision: exact, prefix, then substring. Each tier's ids are appended to
//! an insertion-ordered set so earlier tiers rank first. Rows whose
//! relevance is below the requested minimum are dropped from every tier.

use super::builder::QueryBuilder;
use crate::entity::food::default_relevance;
use crate::schema::{food, Table};
use crate::storage::Executor;
use crate::value::Value;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

/// Coarse visibility bucket of a searchable row
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchRelevance {
    Hidden,
    Low,
    Normal,
    High,
}

impl SearchRelevance {
    /// Bucket for a stored level, clamped to the known range
    pub fn from_level(level: i64) -> Self {
        match level {
            i64::MIN..=0 => SearchRelevance::Hidden,
            1 => SearchRelevance::Low,
            2 => SearchRelevance::Normal,
            _ => SearchRelevance::High,
        }
    }

    pub fn level(&self) -> i64 {
        match self {
            SearchRelevance::Hidden => 0,
            SearchRelevance::Low => 1,
            SearchRelevance::Normal => 2,
            SearchRelevance::High => 3,
        }
    }

    /// Lowest bucket; searching with it returns every match
    pub fn lowest() -> Self {
        SearchRelevance::Hidden
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchRelevance::Hidden => "hidden",
            SearchRelevance::Low => "low",
            SearchRelevance::Normal => "normal",
            SearchRelevance::High => "high",
        }
    }
}

impl FromStr for SearchRelevance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "hidden" => Ok(SearchRelevance::Hidden),
            "low" => Ok(SearchRelevance::Low),
            "normal" => Ok(SearchRelevance::Normal),
            "high" => Ok(SearchRelevance::High),
            _ => Err(Error::Type(format!("Unknown relevance: {}", s))),
        }
    }
}

impl std::fmt::Display for SearchRelevance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ids in first-inserted order, without duplicates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedIdSet {
    order: Vec<i64>,
    members: HashSet<i64>,
}

impl OrderedIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id` unless already present. Returns whether it was added.
    pub fn insert(&mut self, id: i64) -> bool {
        if self.members.insert(id) {
            self.order.push(id);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.members.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.order.iter().copied()
    }

    pub fn truncate(&mut self, len: usize) {
        for id in self.order.drain(len.min(self.order.len())..) {
            self.members.remove(&id);
        }
    }

    /// Keep only ids also in `other`, preserving this set's order
    pub fn retain_in(&mut self, other: &OrderedIdSet) {
        self.order.retain(|id| other.contains(*id));
        self.members.retain(|id| other.contains(*id));
    }

    pub fn into_vec(self) -> Vec<i64> {
        self.order
    }
}

impl Extend<i64> for OrderedIdSet {
    fn extend<I: IntoIterator<Item = i64>>(&mut self, iter: I) {
        for id in iter {
            self.insert(id);
        }
    }
}

impl FromIterator<i64> for OrderedIdSet {
    fn from_iter<I: IntoIterator<Item = i64>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

/// Which columns of a table a search looks at, and how relevance is decided
#[derive(Debug, Clone, Copy)]
pub struct SearchColumns {
    pub table: &'static Table,
    pub primary: &'static str,
    pub secondary: &'static [&'static str],
    /// Nullable integer override of the default bucket
    pub relevance: &'static str,
    /// Category discriminator the default bucket is keyed on
    pub category: &'static str,
    pub default_relevance: fn(&str) -> SearchRelevance,
}

impl SearchColumns {
    /// Food search: index name first, then display columns
    pub fn foods() -> Self {
        Self {
            table: food::table(),
            primary: food::INDEX_NAME.name(),
            secondary: &["name", "variety", "brand", "notes"],
            relevance: food::SEARCH_RELEVANCE.name(),
            category: food::FOOD_TYPE.name(),
            default_relevance,
        }
    }

    fn all(&self) -> Vec<&'static str> {
        std::iter::once(self.primary).chain(self.secondary.iter().copied()).collect()
    }
}

/// Escape LIKE wildcards so `keyword` matches literally (escape char `\`)
pub fn escape_like(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Search one keyword. `max_results` of `None` is unbounded.
pub fn search(
    db: &impl Executor,
    columns: &SearchColumns,
    keyword: &str,
    max_results: Option<usize>,
    min_relevance: SearchRelevance,
) -> Result<OrderedIdSet> {
    let keyword = keyword.trim();
    let mut found = OrderedIdSet::new();
    if keyword.is_empty() || max_results == Some(0) {
        return Ok(found);
    }
    let escaped = escape_like(keyword);
    let exact = escaped.clone();
    let prefix = format!("{}%", escaped);
    let substring = format!("%{}%", escaped);
    let primary = [columns.primary];
    let secondary = columns.secondary;
    let all = columns.all();
    let length = keyword.chars().count();

    let mut tiers: Vec<(&[&str], &str)> = Vec::new();
    tiers.push((&primary[..], exact.as_str()));
    tiers.push((secondary, exact.as_str()));
    if length <= 2 {
        tiers.push((&primary[..], prefix.as_str()));
        tiers.push((secondary, prefix.as_str()));
    } else {
        tiers.push((&all[..], prefix.as_str()));
        tiers.push((&primary[..], substring.as_str()));
    }
    if length >= 4 {
        tiers.push((secondary, substring.as_str()));
    }

    for (tier_columns, pattern) in tiers {
        let patterns = vec![pattern; tier_columns.len()];
        let rows = QueryBuilder::new(columns.table)
            .filter_like(tier_columns, &patterns)
            .order_by("id")
            .select_columns(db, &["id", columns.relevance, columns.category])?;
        for row in rows {
            let Some(id) = row[0].as_i64() else { continue };
            if relevance_of(columns, &row[1], &row[2]) < min_relevance {
                continue;
            }
            found.insert(id);
            if max_results.is_some_and(|max| found.len() >= max) {
                return Ok(found);
            }
        }
    }
    Ok(found)
}

/// Search several keywords, intersecting (`match_all`) or unioning the
/// per-keyword results in keyword order
pub fn search_multi(
    db: &impl Executor,
    columns: &SearchColumns,
    keywords: &[&str],
    match_all: bool,
    max_results: Option<usize>,
    min_relevance: SearchRelevance,
) -> Result<OrderedIdSet> {
    let mut combined: Option<OrderedIdSet> = None;
    for keyword in keywords {
        let ids = search(db, columns, keyword, None, min_relevance)?;
        combined = Some(match combined {
            None => ids,
            Some(mut acc) if match_all => {
                acc.retain_in(&ids);
                acc
            }
            Some(mut acc) => {
                acc.extend(ids.iter());
                acc
            }
        });
    }
    let mut result = combined.unwrap_or_default();
    if let Some(max) = max_results {
        result.truncate(max);
    }
    Ok(result)
}

fn relevance_of(columns: &SearchColumns, level: &Value, category: &Value) -> SearchRelevance {
    match level.as_i64() {
        Some(level) => SearchRelevance::from_level(level),
        None => (columns.default_relevance)(category.as_str().unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RowData;
    use crate::storage::Database;

    fn add(db: &Database, index_name: &str, name: &str, food_type: &str, level: Option<i64>) -> i64 {
        let mut row = RowData::new(food::table());
        row.set(food::INDEX_NAME, index_name.to_string()).unwrap();
        row.set(food::NAME, name.to_string()).unwrap();
        row.set(food::FOOD_TYPE, food_type.to_string()).unwrap();
        row.set_opt(food::SEARCH_RELEVANCE, level).unwrap();
        db.insert(&row).unwrap()
    }

    fn chicken_db() -> (Database, i64, i64) {
        let db = Database::open_in_memory().unwrap();
        let breast = add(&db, "chicken-breast", "Chicken Breast", "primary", None);
        let soup = add(&db, "chicken-soup", "Chicken Soup", "composite", None);
        (db, breast, soup)
    }

    #[test]
    fn test_prefix_tier_finds_both() {
        let (db, breast, soup) = chicken_db();
        let ids = search(&db, &SearchColumns::foods(), "chick", None, SearchRelevance::lowest()).unwrap();
        assert_eq!(ids.into_vec(), vec![breast, soup]);
    }

    #[test]
    fn test_short_keyword_does_not_match_mid_string() {
        let (db, _, _) = chicken_db();
        let ids = search(&db, &SearchColumns::foods(), "ic", None, SearchRelevance::lowest()).unwrap();
        assert!(ids.is_empty());

        let icing = add(&db, "icing-sugar", "Icing Sugar", "primary", None);
        let ids = search(&db, &SearchColumns::foods(), "ic", None, SearchRelevance::lowest()).unwrap();
        assert_eq!(ids.into_vec(), vec![icing]);
    }

    #[test]
    fn test_tiers_rank_exact_first() {
        let db = Database::open_in_memory().unwrap();
        let milky = add(&db, "milky-way", "Milky Way", "primary", None);
        let soy = add(&db, "soy-milk", "Soy Milk", "primary", None);
        let milk = add(&db, "milk", "Milk", "primary", None);
        let ids = search(&db, &SearchColumns::foods(), "milk", None, SearchRelevance::lowest()).unwrap();
        assert_eq!(ids.into_vec(), vec![milk, milky, soy]);

        let top = search(&db, &SearchColumns::foods(), "milk", Some(2), SearchRelevance::lowest()).unwrap();
        assert_eq!(top.into_vec(), vec![milk, milky]);
    }

    #[test]
    fn test_relevance_filter() {
        let (db, breast, soup) = chicken_db();
        let hidden = add(&db, "chicken-stock", "Chicken Stock", "primary", Some(0));
        let boosted = add(&db, "chicken-pie", "Chicken Pie", "composite", Some(3));

        let ids = search(&db, &SearchColumns::foods(), "chicken", None, SearchRelevance::Normal).unwrap();
        assert!(ids.contains(breast));
        assert!(ids.contains(boosted));
        assert!(!ids.contains(soup));
        assert!(!ids.contains(hidden));

        let all = search(&db, &SearchColumns::foods(), "chicken", None, SearchRelevance::lowest()).unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_wildcards_are_literal() {
        let db = Database::open_in_memory().unwrap();
        add(&db, "oats", "Oats", "primary", None);
        let ids = search(&db, &SearchColumns::foods(), "%", None, SearchRelevance::lowest()).unwrap();
        assert!(ids.is_empty());
        assert_eq!(escape_like(r"50%_a\b"), r"50\%\_a\\b");
    }

    #[test]
    fn test_multi_keyword_and_is_subset_of_or() {
        let db = Database::open_in_memory().unwrap();
        let soup = add(&db, "chicken-soup", "Chicken Soup", "primary", None);
        add(&db, "chicken-breast", "Chicken Breast", "primary", None);
        add(&db, "tomato-soup", "Tomato Soup", "primary", None);
        let cols = SearchColumns::foods();

        let and = search_multi(&db, &cols, &["chicken", "soup"], true, None, SearchRelevance::lowest()).unwrap();
        let or = search_multi(&db, &cols, &["chicken", "soup"], false, None, SearchRelevance::lowest()).unwrap();
        assert_eq!(and.clone().into_vec(), vec![soup]);
        assert_eq!(or.len(), 3);
        assert!(and.iter().all(|id| or.contains(id)));

        assert!(search_multi(&db, &cols, &[], true, None, SearchRelevance::lowest()).unwrap().is_empty());
    }

    #[test]
    fn test_ordered_id_set() {
        let mut set: OrderedIdSet = [3, 1, 3, 2].into_iter().collect();
        assert_eq!(set.clone().into_vec(), vec![3, 1, 2]);
        set.truncate(2);
        assert!(!set.contains(2));
        assert!(!set.insert(1));
        assert!(set.insert(2));
        assert_eq!(set.into_vec(), vec![3, 1, 2]);
    }
}
