//! Invalidation Engine
//!
//! Pattern matching over cache keys and the rule table mapping domain
//! events to bulk invalidations.

use crate::cache::tier::TierName;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Patterns
// =============================================================================

/// Key predicate used by predicate patterns
pub type KeyPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Selects the keys an invalidation removes
#[derive(Clone)]
pub enum InvalidationPattern {
    /// Key contains the string
    Substring(String),
    /// Key equals the string
    Exact(String),
    /// Regex matches somewhere in the key
    Regex(regex::Regex),
    /// Shell-style glob matches the whole key
    Glob(glob::Pattern),
    /// Arbitrary predicate
    Predicate(KeyPredicate),
}

impl InvalidationPattern {
    pub fn substring(s: impl Into<String>) -> Self {
        InvalidationPattern::Substring(s.into())
    }

    pub fn exact(key: impl Into<String>) -> Self {
        InvalidationPattern::Exact(key.into())
    }

    /// Compile a regex pattern
    pub fn regex(pattern: &str) -> Result<Self> {
        regex::Regex::new(pattern)
            .map(InvalidationPattern::Regex)
            .map_err(|e| Error::InvalidPattern(format!("regex {:?}: {}", pattern, e)))
    }

    /// Compile a glob pattern
    pub fn glob(pattern: &str) -> Result<Self> {
        glob::Pattern::new(pattern)
            .map(InvalidationPattern::Glob)
            .map_err(|e| Error::InvalidPattern(format!("glob {:?}: {}", pattern, e)))
    }

    pub fn predicate(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        InvalidationPattern::Predicate(Arc::new(f))
    }

    /// Build a pattern from its wire form (`kind` + `pattern` string)
    pub fn parse(kind: PatternKind, pattern: &str) -> Result<Self> {
        match kind {
            PatternKind::Substring => Ok(Self::substring(pattern)),
            PatternKind::Exact => Ok(Self::exact(pattern)),
            PatternKind::Regex => Self::regex(pattern),
            PatternKind::Glob => Self::glob(pattern),
        }
    }

    /// Check if `key` is selected
    pub fn matches(&self, key: &str) -> bool {
        match self {
            InvalidationPattern::Substring(s) => key.contains(s.as_str()),
            InvalidationPattern::Exact(s) => key == s,
            InvalidationPattern::Regex(re) => re.is_match(key),
            InvalidationPattern::Glob(pattern) => pattern.matches(key),
            InvalidationPattern::Predicate(f) => f(key),
        }
    }
}

impl fmt::Debug for InvalidationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidationPattern::Substring(s) => f.debug_tuple("Substring").field(s).finish(),
            InvalidationPattern::Exact(s) => f.debug_tuple("Exact").field(s).finish(),
            InvalidationPattern::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            InvalidationPattern::Glob(p) => f.debug_tuple("Glob").field(&p.as_str()).finish(),
            InvalidationPattern::Predicate(_) => f.write_str("Predicate(<fn>)"),
        }
    }
}

impl fmt::Display for InvalidationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidationPattern::Substring(s) => write!(f, "{}", s),
            InvalidationPattern::Exact(s) => write!(f, "={}", s),
            InvalidationPattern::Regex(re) => write!(f, "/{}/", re.as_str()),
            InvalidationPattern::Glob(p) => write!(f, "glob:{}", p.as_str()),
            InvalidationPattern::Predicate(_) => write!(f, "<predicate>"),
        }
    }
}

impl From<&str> for InvalidationPattern {
    fn from(s: &str) -> Self {
        InvalidationPattern::Substring(s.to_string())
    }
}

impl From<String> for InvalidationPattern {
    fn from(s: String) -> Self {
        InvalidationPattern::Substring(s)
    }
}

impl From<regex::Regex> for InvalidationPattern {
    fn from(re: regex::Regex) -> Self {
        InvalidationPattern::Regex(re)
    }
}

/// Wire name of a string-expressible pattern kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    #[default]
    Substring,
    Exact,
    Regex,
    Glob,
}

// =============================================================================
// Options
// =============================================================================

/// Restricts an invalidation to some tiers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationOptions {
    /// Tier names to search (None = all tiers)
    #[serde(default)]
    pub cache_types: Option<Vec<String>>,
}

impl InvalidationOptions {
    /// Search every tier
    pub fn all() -> Self {
        Self::default()
    }

    /// Search only the named tiers
    pub fn tiers<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cache_types: Some(names.into_iter().map(Into::into).collect()),
        }
    }

    /// Resolve tier names, failing on unknown names
    pub fn resolve(&self) -> Result<Vec<TierName>> {
        match &self.cache_types {
            None => Ok(TierName::ALL.to_vec()),
            Some(names) => names.iter().map(|n| n.parse()).collect(),
        }
    }
}

// =============================================================================
// Smart Invalidation Rules
// =============================================================================

/// One step of a rule
#[derive(Debug, Clone)]
enum RuleStep {
    /// Invalidate a fixed pattern across all tiers
    Pattern(InvalidationPattern),
    /// Invalidate `{prefix}:{id}` where id is read from the payload
    KeyFromPayload {
        prefix: &'static str,
        field: &'static str,
    },
    /// Capacity-evict the tier named in the payload
    CompactTier,
}

/// Concrete action produced for an event
#[derive(Debug, Clone)]
pub enum InvalidationAction {
    /// Remove matching keys from every tier
    Invalidate(InvalidationPattern),
    /// Run capacity eviction on one tier
    Compact(TierName),
}

/// Table mapping domain event names to invalidation steps
#[derive(Debug, Clone)]
pub struct SmartInvalidationRules {
    rules: HashMap<&'static str, Vec<RuleStep>>,
}

impl SmartInvalidationRules {
    /// Build the built-in rule table
    pub fn new() -> Result<Self> {
        let post_listing = vec![
            RuleStep::Pattern(InvalidationPattern::regex("posts")?),
            RuleStep::Pattern(InvalidationPattern::regex("blog")?),
            RuleStep::Pattern(InvalidationPattern::regex("api.*posts")?),
        ];

        let mut post_changed = vec![RuleStep::KeyFromPayload {
            prefix: "post",
            field: "postId",
        }];
        post_changed.extend(post_listing.iter().cloned());

        let mut rules = HashMap::new();
        rules.insert("post_created", post_listing);
        rules.insert("post_updated", post_changed.clone());
        rules.insert("post_deleted", post_changed);
        rules.insert(
            "user_updated",
            vec![
                RuleStep::KeyFromPayload {
                    prefix: "user",
                    field: "userId",
                },
                RuleStep::Pattern(InvalidationPattern::regex("sessions")?),
            ],
        );
        rules.insert(
            "ai_config_changed",
            vec![
                RuleStep::Pattern(InvalidationPattern::regex("ai")?),
                RuleStep::Pattern(InvalidationPattern::regex("providers")?),
            ],
        );
        rules.insert("cache_full", vec![RuleStep::CompactTier]);

        Ok(Self { rules })
    }

    /// Whether `event` has a rule
    pub fn knows(&self, event: &str) -> bool {
        self.rules.contains_key(event)
    }

    /// Known event names
    pub fn events(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.rules.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Expand `event` into actions; unknown events expand to nothing
    pub fn actions(&self, event: &str, payload: &Value) -> Result<Vec<InvalidationAction>> {
        let Some(steps) = self.rules.get(event) else {
            return Ok(Vec::new());
        };

        let mut actions = Vec::with_capacity(steps.len());
        for step in steps {
            match step {
                RuleStep::Pattern(pattern) => {
                    actions.push(InvalidationAction::Invalidate(pattern.clone()));
                }
                RuleStep::KeyFromPayload { prefix, field } => {
                    if let Some(id) = payload_id(payload, field) {
                        actions.push(InvalidationAction::Invalidate(InvalidationPattern::exact(
                            format!("{}:{}", prefix, id),
                        )));
                    }
                }
                RuleStep::CompactTier => {
                    let name = payload_id(payload, "tier").ok_or_else(|| {
                        Error::Configuration(format!("{} requires a tier name payload", event))
                    })?;
                    actions.push(InvalidationAction::Compact(name.parse()?));
                }
            }
        }
        Ok(actions)
    }
}

/// Extract an identifier from a scalar payload or from `field`/`id` of an object
fn payload_id(payload: &Value, field: &str) -> Option<String> {
    match payload {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map
            .get(field)
            .or_else(|| map.get("id"))
            .and_then(|v| payload_id(v, field)),
        _ => None,
    }
}
