use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Which kind of document a raw response is expected to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Scenario,
    StepBinding,
}

/// `Low` means no code boundary was found and the text is returned as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cleaned {
    pub text: String,
    pub confidence: Confidence,
}

const GHERKIN_START: [&str; 6] = [
    "Feature:",
    "Scenario:",
    "Scenario Outline:",
    "Scenario Template:",
    "Background:",
    "# language:",
];

const GHERKIN_LINE: [&str; 14] = [
    "Feature:",
    "Scenario:",
    "Scenario Outline:",
    "Scenario Template:",
    "Background:",
    "Examples:",
    "Rule:",
    "Given ",
    "When ",
    "Then ",
    "And ",
    "But ",
    "* ",
    "\"\"\"",
];

const PYTHON_KEYWORDS: [&str; 27] = [
    "pass", "return", "assert", "await", "raise", "break", "continue", "yield", "import", "from",
    "def", "async", "class", "if", "elif", "else", "for", "while", "with", "try", "except",
    "finally", "global", "nonlocal", "del", "lambda", "print",
];

fn python_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(import\s+[\w.]+|from\s+[\w.]+\s+import\b|@|def\s|async\s+def\s|class\s)")
            .expect("static regex")
    })
}

fn python_assignment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^[A-Za-z_][\w.\[\]'"]*(\s*,\s*[A-Za-z_]\w*)*\s*[-+*/%|&]?=[^=]"#)
            .expect("static regex")
    })
}

fn filler() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(here\s+(is|are)|here's|sure|certainly|of course|okay|ok\b|below\s+is|the\s+following|this\s+is)\b|:\s*$",
        )
        .expect("static regex")
    })
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

fn leading_whitespace(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

fn is_code_start(line: &str, kind: ArtifactKind) -> bool {
    let line = line.trim_start();
    match kind {
        ArtifactKind::Scenario => {
            line.starts_with('@') || GHERKIN_START.iter().any(|k| line.starts_with(k))
        }
        ArtifactKind::StepBinding => python_start().is_match(line),
    }
}

fn is_plausible_end(line: &str, kind: ArtifactKind) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || is_fence(trimmed) {
        return false;
    }
    if is_code_start(trimmed, kind) {
        return true;
    }
    match kind {
        ArtifactKind::Scenario => {
            trimmed.starts_with('|')
                || trimmed.starts_with('#')
                || GHERKIN_LINE.iter().any(|k| trimmed.starts_with(k))
        }
        ArtifactKind::StepBinding => {
            let first_word = trimmed
                .split(|c: char| !(c.is_alphanumeric() || c == '_'))
                .next()
                .unwrap_or_default();
            trimmed.ends_with([')', ']', '}', '"', '\''])
                || trimmed.starts_with('#')
                || PYTHON_KEYWORDS.contains(&first_word)
                || python_assignment().is_match(trimmed)
        }
    }
}

/// Isolate the intended code from a raw generative response.
///
/// Strips one leading and one trailing fence line, leading filler prose,
/// everything before the first code-start line and everything after the last
/// structurally plausible line, then removes common indentation. When no
/// code start exists the trimmed input comes back unchanged with
/// `Confidence::Low`. `clean(clean(x).text) == clean(x)` for every input.
pub fn clean(raw: &str, kind: ArtifactKind) -> Cleaned {
    let mut lines: Vec<&str> = raw.lines().collect();

    while lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    if lines.first().is_some_and(|l| is_fence(l)) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| is_fence(l)) {
        lines.pop();
    }

    let preamble = lines
        .iter()
        .take_while(|l| {
            let t = l.trim();
            t.is_empty() || (!is_code_start(t, kind) && filler().is_match(t))
        })
        .count();
    let lines = &lines[preamble..];

    let Some(start) = lines.iter().position(|l| is_code_start(l, kind)) else {
        return Cleaned {
            text: raw.trim().to_string(),
            confidence: Confidence::Low,
        };
    };

    // The start line is itself plausible, so this never falls below `start`.
    let end = lines
        .iter()
        .rposition(|l| is_plausible_end(l, kind))
        .filter(|&end| end >= start)
        .unwrap_or(start);

    let body: Vec<&str> = lines[start..=end].iter().map(|l| l.trim_end()).collect();
    let indent = body
        .iter()
        .filter(|l| !l.is_empty())
        .map(|l| leading_whitespace(l))
        .min()
        .unwrap_or(0);

    let mut text = body
        .iter()
        .map(|l| match l.char_indices().nth(indent) {
            Some((cut, _)) => &l[cut..],
            None => "",
        })
        .collect::<Vec<_>>()
        .join("\n");
    text.push('\n');

    Cleaned {
        text,
        confidence: Confidence::High,
    }
}
