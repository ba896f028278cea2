// Candidate filters applied inside the eligibility query, before ranking
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::Advertisement;

pub trait Filter {
    fn matches(&self, ad: &Advertisement) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterCondition {
    /// Campaign window contains the instant
    ActiveAt(DateTime<Utc>),
    /// Reject ads whose positive keywords mention any of these terms
    ExcludeTerms(HashSet<String>),
    /// Reject ads whose own negative keywords mention any of these terms
    RequestTerms(HashSet<String>),
    And(Vec<FilterCondition>),
}

/// A filter over advertisements built from a [`FilterCondition`] tree
#[derive(Debug, Clone, PartialEq)]
pub struct AdFilter {
    condition: FilterCondition,
}

impl AdFilter {
    pub fn new(condition: FilterCondition) -> Self {
        Self { condition }
    }

    pub fn condition(&self) -> &FilterCondition {
        &self.condition
    }

    fn matches_condition(condition: &FilterCondition, ad: &Advertisement) -> bool {
        match condition {
            FilterCondition::ActiveAt(at) => ad.is_active_at(*at),
            FilterCondition::ExcludeTerms(terms) => !mentions_any(&ad.positive_keywords, terms),
            FilterCondition::RequestTerms(terms) => !mentions_any(&ad.negative_keywords, terms),
            FilterCondition::And(conditions) => {
                conditions.iter().all(|c| Self::matches_condition(c, ad))
            }
        }
    }
}

impl Filter for AdFilter {
    fn matches(&self, ad: &Advertisement) -> bool {
        Self::matches_condition(&self.condition, ad)
    }
}

/// Lowercased alphanumeric terms of a keyword string
pub fn keyword_terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn mentions_any(text: &str, terms: &HashSet<String>) -> bool {
    if terms.is_empty() {
        return false;
    }
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .any(|t| terms.contains(&t.to_lowercase()))
}
