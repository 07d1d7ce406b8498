// src/engine/policy.rs

//! Policy model: which data categories a request touches and how.

use serde::Deserialize;

use crate::engine::task::ActionType;
use crate::errors::{PrivdagError, Result};

/// One execution rule of a policy.
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub action: ActionType,
    /// Data-category prefixes this rule targets (`user.contact` selects
    /// `user.contact.email` and everything else below it).
    #[serde(default)]
    pub data_categories: Vec<String>,
    /// Masking strategy key for erasure rules; the runtime resolves it
    /// against its strategy registry.
    #[serde(default)]
    pub masking_strategy: Option<String>,
}

/// The active policy for a privacy request.
#[derive(Debug, Clone, Deserialize)]
pub struct Policy {
    pub key: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Policy {
    /// A policy with no rule for the requested action is a configuration
    /// error and aborts the request before any task starts.
    pub fn validate_for(&self, action: ActionType) -> Result<()> {
        if self.rules.is_empty() {
            return Err(PrivdagError::PolicyError(format!(
                "policy '{}' has no rules",
                self.key
            )));
        }
        if !self.rules.iter().any(|rule| rule.action == action) {
            return Err(PrivdagError::PolicyError(format!(
                "policy '{}' has no rule for action '{}'",
                self.key,
                action.as_str()
            )));
        }
        Ok(())
    }

    pub fn rules_for(&self, action: ActionType) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |rule| rule.action == action)
    }

    /// Whether a field's data category is selected by the given rule.
    pub fn category_matches(rule_category: &str, field_category: &str) -> bool {
        field_category == rule_category
            || field_category
                .strip_prefix(rule_category)
                .is_some_and(|rest| rest.starts_with('.'))
    }
}
