use serde::{Deserialize, Serialize};

use crate::extract::page_model::PageAnalysis;
use crate::generate::common_steps::{COMMON_IMPORTS, definitions_for};

/// Primary step keyword. `And`/`But`/`*` resolve to the preceding one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKeyword {
    Given,
    When,
    Then,
}

impl StepKeyword {
    pub fn as_str(self) -> &'static str {
        match self {
            StepKeyword::Given => "given",
            StepKeyword::When => "when",
            StepKeyword::Then => "then",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            StepKeyword::Given => "Given",
            StepKeyword::When => "When",
            StepKeyword::Then => "Then",
        }
    }
}

/// One step line of a scenario document, keyword resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepPhrase {
    pub keyword: StepKeyword,
    pub phrase: String,
}

impl StepPhrase {
    pub fn new(keyword: StepKeyword, phrase: impl Into<String>) -> Self {
        Self {
            keyword,
            phrase: phrase.into(),
        }
    }
}

/// Ordered, de-duplicated step phrases of a scenario document.
///
/// Comments, table rows and doc-string blocks are skipped. Continuation
/// keywords inherit the nearest preceding primary keyword, or `Given` when
/// none precedes them.
pub fn extract_step_phrases(scenario: &str) -> Vec<StepPhrase> {
    let mut phrases: Vec<StepPhrase> = Vec::new();
    let mut current = StepKeyword::Given;
    let mut in_docstring = false;

    for line in scenario.lines() {
        let line = line.trim();
        if line.starts_with("\"\"\"") || line.starts_with("```") {
            in_docstring = !in_docstring;
            continue;
        }
        if in_docstring || line.is_empty() || line.starts_with('#') || line.starts_with('|') {
            continue;
        }

        let (keyword, rest) = if let Some(rest) = line.strip_prefix("Given ") {
            (StepKeyword::Given, rest)
        } else if let Some(rest) = line.strip_prefix("When ") {
            (StepKeyword::When, rest)
        } else if let Some(rest) = line.strip_prefix("Then ") {
            (StepKeyword::Then, rest)
        } else if let Some(rest) = line
            .strip_prefix("And ")
            .or_else(|| line.strip_prefix("But "))
            .or_else(|| line.strip_prefix("* "))
        {
            (current, rest)
        } else {
            continue;
        };

        current = keyword;
        let phrase = rest.trim();
        if phrase.is_empty() {
            continue;
        }
        let step = StepPhrase::new(keyword, phrase);
        if !phrases.contains(&step) {
            phrases.push(step);
        }
    }

    phrases
}

// ============================================================================
// Built-in smoke pair
// ============================================================================

/// Scenario block every generic suite carries: the page loads and has a title.
pub fn smoke_scenario_block(analysis: &PageAnalysis) -> String {
    let title_step = if analysis.title.trim().is_empty() {
        "the page title should not be empty".to_string()
    } else {
        format!(
            "the page title should contain \"{}\"",
            analysis.title.trim().replace('"', "'")
        )
    };

    format!(
        "  Scenario: Page loads successfully\n    Given I am on \"{}\"\n    Then the page should load\n    And {}\n",
        analysis.url, title_step
    )
}

/// Complete generic scenario document that needs no generative service.
pub fn smoke_scenario(analysis: &PageAnalysis) -> String {
    let name = if analysis.title.trim().is_empty() {
        analysis.url.as_str()
    } else {
        analysis.title.trim()
    };
    format!(
        "Feature: {} smoke test\n  Basic availability checks for {}\n\n{}",
        name,
        analysis.url,
        smoke_scenario_block(analysis)
    )
}

/// Common definitions behind every phrase `smoke_scenario` can emit.
pub const SMOKE_STEPS: [&str; 4] = [
    "open_page",
    "page_loaded",
    "title_contains",
    "title_not_empty",
];

/// Step bindings matching every phrase `smoke_scenario` can emit.
pub fn smoke_bindings(feature_rel_path: &str) -> String {
    format!(
        "{}from pytest_bdd import scenarios\n\nscenarios(\"{}\")\n{}",
        COMMON_IMPORTS,
        feature_rel_path,
        definitions_for(&SMOKE_STEPS)
    )
}

/// Whether a generic scenario already checks the title; if not the smoke
/// block is appended.
pub fn mentions_title(phrases: &[StepPhrase]) -> bool {
    phrases
        .iter()
        .any(|p| p.phrase.to_lowercase().contains("title"))
}
