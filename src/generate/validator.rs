use std::fmt;

use tree_sitter::{Node, Parser};

use crate::generate::bindings::{Coverage, check_coverage};
use crate::generate::scenario::StepPhrase;

/// First syntax problem found in a step-binding module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    /// 1-based physical line, 0 when the parser itself is unavailable
    pub line: usize,
    pub message: String,
}

impl fmt::Display for SyntaxIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

fn issue(line: usize, message: impl Into<String>) -> SyntaxIssue {
    SyntaxIssue {
        line,
        message: message.into(),
    }
}

// ============================================================================
// Python syntax
// ============================================================================

const SNIPPET_CHARS: usize = 40;

fn line_of(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

/// Earliest ERROR or MISSING node in document order.
fn first_problem<'t>(node: Node<'t>) -> Option<Node<'t>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = first_problem(child) {
            return Some(found);
        }
    }
    None
}

/// The grammar accepts a header followed by a bare newline as an empty
/// block; Python does not.
fn first_empty_block<'t>(node: Node<'t>) -> Option<Node<'t>> {
    if node.kind() == "block" && node.named_child_count() == 0 {
        return Some(node);
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if let Some(found) = first_empty_block(child) {
            return Some(found);
        }
    }
    None
}

fn describe_problem(node: Node<'_>, source: &str) -> SyntaxIssue {
    if node.is_missing() {
        return issue(line_of(node), format!("missing `{}`", node.kind()));
    }
    let text = node.utf8_text(source.as_bytes()).unwrap_or_default();
    let snippet: String = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .chars()
        .take(SNIPPET_CHARS)
        .collect();
    if snippet.is_empty() {
        issue(line_of(node), "invalid syntax")
    } else {
        issue(line_of(node), format!("invalid syntax near `{}`", snippet))
    }
}

/// Parse a step-binding module as Python and report the first problem.
pub fn check_python_syntax(source: &str) -> Result<(), SyntaxIssue> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| issue(0, format!("python grammar unavailable: {}", e)))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| issue(0, "python parser produced no tree"))?;
    let root = tree.root_node();

    if root.has_error() {
        return Err(match first_problem(root) {
            Some(node) => describe_problem(node, source),
            None => issue(1, "invalid syntax"),
        });
    }
    if let Some(block) = first_empty_block(root) {
        let header = block.parent().map_or_else(|| line_of(block), line_of);
        return Err(issue(
            header,
            format!("expected an indented block after line {}", header),
        ));
    }
    Ok(())
}

// ============================================================================
// Scenario structure
// ============================================================================

const SCENARIO_HEADERS: [&str; 4] = [
    "Scenario:",
    "Scenario Outline:",
    "Scenario Template:",
    "Example:",
];

const STEP_PREFIXES: [&str; 6] = ["Given ", "When ", "Then ", "And ", "But ", "* "];

/// Feature header present, at least one scenario, every scenario has steps
/// and every outline has examples.
pub fn check_scenario_structure(text: &str) -> Result<(), String> {
    let mut has_feature = false;
    let mut scenarios = 0;
    // (header line, steps seen, is outline, examples seen)
    let mut open: Option<(usize, usize, bool, bool)> = None;

    let close = |open: Option<(usize, usize, bool, bool)>| -> Result<(), String> {
        match open {
            Some((at, 0, _, _)) => Err(format!("scenario at line {} has no steps", at)),
            Some((at, _, true, false)) => {
                Err(format!("scenario outline at line {} has no Examples", at))
            }
            _ => Ok(()),
        }
    };

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.starts_with("Feature:") {
            has_feature = true;
        } else if SCENARIO_HEADERS.iter().any(|h| line.starts_with(h)) {
            close(open.take())?;
            scenarios += 1;
            let outline = line.starts_with("Scenario Outline:") || line.starts_with("Scenario Template:");
            open = Some((index + 1, 0, outline, false));
        } else if line.starts_with("Examples:") || line.starts_with("Scenarios:") {
            if let Some(o) = open.as_mut() {
                o.3 = true;
            }
        } else if STEP_PREFIXES.iter().any(|k| line.starts_with(k)) {
            if let Some(o) = open.as_mut() {
                o.1 += 1;
            }
        }
    }
    close(open)?;

    if !has_feature {
        return Err("missing 'Feature:' header".to_string());
    }
    if scenarios == 0 {
        return Err("feature contains no scenarios".to_string());
    }
    Ok(())
}

// ============================================================================
// Pair validation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub structure: Option<String>,
    pub syntax: Option<SyntaxIssue>,
    pub coverage: Coverage,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.structure.is_none()
            && self.syntax.is_none()
            && self.coverage.is_complete()
            && self.coverage.ambiguous.is_empty()
    }

    /// True when the scenario itself must be regenerated, not just bindings.
    pub fn scenario_invalid(&self) -> bool {
        self.structure.is_some()
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(s) = &self.structure {
            parts.push(format!("scenario: {}", s));
        }
        if let Some(s) = &self.syntax {
            parts.push(format!("step bindings: {}", s));
        }
        if !self.coverage.missing.is_empty() {
            let missing: Vec<_> = self
                .coverage
                .missing
                .iter()
                .map(|p| format!("{} {}", p.keyword.title(), p.phrase))
                .collect();
            parts.push(format!("unbound steps: {}", missing.join("; ")));
        }
        if !self.coverage.ambiguous.is_empty() {
            let ambiguous: Vec<_> = self
                .coverage
                .ambiguous
                .iter()
                .map(|p| format!("{} {}", p.keyword.title(), p.phrase))
                .collect();
            parts.push(format!("steps bound more than once: {}", ambiguous.join("; ")));
        }
        parts.join(" | ")
    }
}

/// Check a scenario/binding pair before anything is written.
///
/// A step matched by more than one binding fails the pair: pytest-bdd would
/// pick one of them silently.
pub fn validate_pair(
    scenario_text: &str,
    phrases: &[StepPhrase],
    binding_text: &str,
) -> ValidationReport {
    ValidationReport {
        structure: check_scenario_structure(scenario_text).err(),
        syntax: check_python_syntax(binding_text).err(),
        coverage: check_coverage(phrases, binding_text),
    }
}
