//! Test case definitions and loading

pub mod loader;

pub use loader::{parse_cases, DatasetLoadError, DatasetSource};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::providers::{Message, Role};

/// Identifier of a test case; HealthBench uses string UUIDs, the bundled
/// sample uses integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CaseId {
    Number(i64),
    Text(String),
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseId::Number(n) => write!(f, "{}", n),
            CaseId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for CaseId {
    fn from(n: i64) -> Self {
        CaseId::Number(n)
    }
}

impl From<&str> for CaseId {
    fn from(s: &str) -> Self {
        CaseId::Text(s.to_string())
    }
}

/// A single gradable property of a response.
///
/// Negative points mark a penalty criterion: the desired outcome is that the
/// response does *not* exhibit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    #[serde(alias = "criteria")]
    pub criterion: String,
    pub points: f64,
}

impl Criterion {
    pub fn new(criterion: impl Into<String>, points: f64) -> Self {
        Self {
            criterion: criterion.into(),
            points,
        }
    }

    pub fn is_penalty(&self) -> bool {
        self.points < 0.0
    }
}

/// Ordered criteria for one test case
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rubric(Vec<Criterion>);

impl Rubric {
    pub fn new(criteria: Vec<Criterion>) -> Self {
        Self(criteria)
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Criterion> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Best achievable score: every reward earned and every penalty avoided
    pub fn max_score(&self) -> f64 {
        self.0.iter().map(|c| c.points.abs()).sum()
    }
}

impl FromIterator<Criterion> for Rubric {
    fn from_iter<I: IntoIterator<Item = Criterion>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Rubric {
    type Item = &'a Criterion;
    type IntoIter = std::slice::Iter<'a, Criterion>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A benchmark test case: a conversation prefix and the rubric its next
/// assistant turn is graded against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: CaseId,
    pub conversation: Vec<Message>,
    pub rubric: Rubric,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TestCase {
    pub fn new(id: impl Into<CaseId>, conversation: Vec<Message>, rubric: Rubric) -> Self {
        Self {
            id: id.into(),
            conversation,
            rubric,
            tags: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// A case without any conversation cannot be presented to a model
    pub fn is_malformed(&self) -> bool {
        self.conversation.is_empty()
    }

    /// The question presented to the model: the last user turn, or the last
    /// turn of any role when the conversation has no user turn.
    pub fn question(&self) -> &str {
        self.conversation
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .or_else(|| self.conversation.last())
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}
