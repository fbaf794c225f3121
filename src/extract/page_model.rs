use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Structural understanding of a single page
// ============================================================================

/// Interactive role of an extracted element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementRole {
    Button,
    Link,
    Input,
    Select,
    Textarea,
}

/// Locator strategy, declared in stability order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectorStrategy {
    Identifier,
    TestId,
    Name,
    Text,
    StructuralPath,
}

impl SelectorStrategy {
    /// Fixed rank; lower is more stable.
    pub fn rank(self) -> u8 {
        match self {
            SelectorStrategy::Identifier => 0,
            SelectorStrategy::TestId => 1,
            SelectorStrategy::Name => 2,
            SelectorStrategy::Text => 3,
            SelectorStrategy::StructuralPath => 4,
        }
    }
}

/// One candidate locator for an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorCandidate {
    pub strategy: SelectorStrategy,
    pub value: String,
    pub rank: u8,
}

impl SelectorCandidate {
    pub fn new(strategy: SelectorStrategy, value: impl Into<String>) -> Self {
        Self {
            strategy,
            value: value.into(),
            rank: strategy.rank(),
        }
    }
}

/// Identity of an element inside its `PageAnalysis` (document order index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub usize);

/// A visible, interactive element. Immutable once extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    pub role: ElementRole,
    pub tag: String,
    pub text: String,
    /// All attributes; ordered so derived data never depends on parse order
    pub attributes: BTreeMap<String, String>,
    /// Ranked candidates, most stable first. Never empty.
    pub selectors: Vec<SelectorCandidate>,
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Most stable locator.
    pub fn best_selector(&self) -> Option<&SelectorCandidate> {
        self.selectors.first()
    }

    /// Human-facing label: visible text, then aria-label, placeholder, name.
    pub fn label(&self) -> String {
        if !self.text.is_empty() {
            return self.text.clone();
        }
        ["aria-label", "placeholder", "name", "id"]
            .iter()
            .find_map(|k| self.attribute(k))
            .unwrap_or("")
            .to_string()
    }
}

/// A form and the elements that belong to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    /// `id` or `name` attribute of the form, if any
    pub key: Option<String>,
    pub action: Option<String>,
    pub method: Option<String>,
    pub fields: Vec<ElementId>,
}

// ============================================================================
// User flows
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Navigate,
    Click,
    Fill,
    Select,
    Assert,
    Other,
}

/// One action in a flow, optionally pointing at page elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    pub kind: ActionKind,
    pub description: String,
    #[serde(default)]
    pub targets: Vec<ElementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// A named, ordered sequence of user actions. Never has zero steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFlow {
    pub name: String,
    pub description: String,
    pub steps: Vec<ActionStep>,
}

impl UserFlow {
    /// Elements referenced by any step, in first-reference order.
    pub fn referenced_elements(&self) -> Vec<ElementId> {
        let mut ids = Vec::new();
        for id in self.steps.iter().flat_map(|s| s.targets.iter()) {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }
}

// ============================================================================
// PageAnalysis
// ============================================================================

/// Everything known about a page before generation starts.
///
/// Produced once per analysis pass and shared read-only by every flow
/// pipeline. Persisted as `analysis/analysis.json` in the test repository so
/// later runs can skip the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub url: String,
    pub title: String,
    pub elements: Vec<Element>,
    pub forms: Vec<Form>,
    #[serde(default)]
    pub flows: Vec<UserFlow>,
    /// Script-evaluated probes (framework presence and similar)
    #[serde(default)]
    pub probes: BTreeMap<String, serde_json::Value>,
    /// Scripts and styles stripped, truncated to the prompt budget
    pub simplified_markup: String,
    /// SHA-1 of the raw markup the analysis was built from
    pub fingerprint: String,
}

impl PageAnalysis {
    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id.0).filter(|e| e.id == id)
    }
}
