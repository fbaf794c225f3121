use std::sync::OnceLock;

use regex::Regex;

use crate::generate::scenario::{StepKeyword, StepPhrase};

/// A step pattern found in step-binding source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingPattern {
    /// `None` for keyword-agnostic `@step` bindings
    pub keyword: Option<StepKeyword>,
    pub pattern: String,
    pub normalized: String,
}

fn decorator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"@(given|when|then|step)\s*\(\s*(?:parsers\s*\.\s*(parse|cfparse|re)\s*\(\s*)?([rRuUbB]{0,2})("(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*')"#,
        )
        .expect("static regex")
    })
}

/// Every `@given/@when/@then/@step` pattern in `source`, in order.
pub fn extract_bindings(source: &str) -> Vec<BindingPattern> {
    decorator()
        .captures_iter(source)
        .filter_map(|caps| {
            let keyword = match &caps[1] {
                "given" => Some(StepKeyword::Given),
                "when" => Some(StepKeyword::When),
                "then" => Some(StepKeyword::Then),
                _ => None,
            };
            let parser = caps.get(2).map(|m| m.as_str());
            let raw_prefix = caps[3].to_ascii_lowercase().contains('r');
            let literal = &caps[4];
            let inner = literal.get(1..literal.len().saturating_sub(1))?;
            let pattern = if raw_prefix {
                inner.to_string()
            } else {
                unescape(inner)
            };
            let normalized = match parser {
                Some("re") => normalize_phrase(&regex_to_phrase(&pattern)),
                // `{{` and `}}` are literal braces in parse formats
                Some(_) => normalize_phrase(&pattern.replace("{{", "{").replace("}}", "}")),
                None => normalize_phrase(&pattern),
            };
            Some(BindingPattern {
                keyword,
                pattern,
                normalized,
            })
        })
        .collect()
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Turn a `parsers.re` pattern into a phrase with `<*>` for each group.
fn regex_to_phrase(pattern: &str) -> String {
    static GROUP: OnceLock<Regex> = OnceLock::new();
    static ESCAPED: OnceLock<Regex> = OnceLock::new();
    let group = GROUP.get_or_init(|| Regex::new(r"\((?:\?P<\w+>)?[^()]*\)").expect("static regex"));
    let escaped = ESCAPED.get_or_init(|| Regex::new(r"\\([^A-Za-z0-9])").expect("static regex"));

    let trimmed = pattern.trim_start_matches('^').trim_end_matches('$');
    let grouped = group.replace_all(trimmed, "<*>");
    escaped.replace_all(&grouped, "$1").into_owned()
}

struct Normalizers {
    double_quoted: Regex,
    single_quoted: Regex,
    braces: Regex,
    angles: Regex,
    number: Regex,
    spaces: Regex,
}

fn normalizers() -> &'static Normalizers {
    static N: OnceLock<Normalizers> = OnceLock::new();
    N.get_or_init(|| Normalizers {
        double_quoted: Regex::new(r#""[^"]*""#).expect("static regex"),
        single_quoted: Regex::new(r"(^|[\s(\[,:=])'[^']*'").expect("static regex"),
        braces: Regex::new(r"\{[^{}]*\}").expect("static regex"),
        angles: Regex::new(r"<[^<>]*>").expect("static regex"),
        number: Regex::new(r"\b\d+(?:\.\d+)?\b").expect("static regex"),
        spaces: Regex::new(r"\s+").expect("static regex"),
    })
}

/// Canonical form used to compare scenario phrases with binding patterns.
///
/// Quoted literals, `{name}` fields, `<param>` placeholders and numbers all
/// become `<*>`; case and whitespace are folded and a trailing period or
/// colon is dropped.
pub fn normalize_phrase(phrase: &str) -> String {
    let n = normalizers();
    let s = n.double_quoted.replace_all(phrase, "<*>");
    let s = n.single_quoted.replace_all(&s, "${1}<*>");
    let s = n.braces.replace_all(&s, "<*>");
    let s = n.angles.replace_all(&s, "<*>");
    let s = n.number.replace_all(&s, "<*>");
    let s = n.spaces.replace_all(s.trim(), " ");
    s.to_lowercase()
        .trim_end_matches(['.', ':'])
        .trim_end()
        .to_string()
}

// ============================================================================
// Coverage
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coverage {
    /// Phrases with no matching binding
    pub missing: Vec<StepPhrase>,
    /// Phrases matched by more than one binding
    pub ambiguous: Vec<StepPhrase>,
}

impl Coverage {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Check every phrase against the bindings found in `source`.
pub fn check_coverage(phrases: &[StepPhrase], source: &str) -> Coverage {
    let bindings = extract_bindings(source);
    let mut coverage = Coverage::default();

    for phrase in phrases {
        let normalized = normalize_phrase(&phrase.phrase);
        let matches = bindings
            .iter()
            .filter(|b| b.normalized == normalized)
            .filter(|b| b.keyword.is_none_or(|k| k == phrase.keyword))
            .count();
        match matches {
            0 => coverage.missing.push(phrase.clone()),
            1 => {}
            _ => coverage.ambiguous.push(phrase.clone()),
        }
    }

    coverage
}

// ============================================================================
// Stubs
// ============================================================================

/// Minimal bindings for `missing` so the pair stays complete.
///
/// Quoted literals become parse fields; given/when stubs wait for the page,
/// then stubs hold an assertion placeholder. `async_style` emits coroutine
/// functions for async step modules.
pub fn synthesize_stubs(missing: &[StepPhrase], async_style: bool) -> String {
    static QUOTED: OnceLock<Regex> = OnceLock::new();
    let quoted = QUOTED.get_or_init(|| Regex::new(r#""[^"]*""#).expect("static regex"));

    let mut out = String::from("\nfrom pytest_bdd import given, when, then, parsers\n");
    let (def, aw) = if async_style {
        ("async def", "await ")
    } else {
        ("def", "")
    };

    for (index, step) in missing.iter().enumerate() {
        let escaped = step.phrase.replace('{', "{{").replace('}', "}}");
        let mut args = Vec::new();
        let pattern = quoted.replace_all(&escaped, |_: &regex::Captures| {
            let name = format!("arg{}", args.len());
            let field = format!("\"{{{}}}\"", name);
            args.push(name);
            field
        });
        let literal = python_string(&pattern);

        let matcher = if args.is_empty() {
            // No fields: the braces escaped above would be literal here.
            python_string(&step.phrase)
        } else {
            format!("parsers.parse({})", literal)
        };

        let params = std::iter::once("page".to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(", ");

        let body = match step.keyword {
            StepKeyword::Then => {
                format!("    {}page.wait_for_load_state()\n    assert page is not None\n", aw)
            }
            StepKeyword::Given | StepKeyword::When => {
                format!("    {}page.wait_for_load_state()\n", aw)
            }
        };

        out.push_str(&format!(
            "\n\n@{}({})\n{} stub_{}_{}({}):\n{}",
            step.keyword.as_str(),
            matcher,
            def,
            step.keyword.as_str(),
            index + 1,
            params,
            body
        ));
    }

    out
}

fn python_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Point the module at its feature file, adding the call if absent.
pub fn ensure_scenarios_binding(source: &str, feature_rel_path: &str) -> String {
    static CALL: OnceLock<Regex> = OnceLock::new();
    let call = CALL.get_or_init(|| {
        Regex::new(r#"scenarios\(\s*[rR]?["'][^"'\n]*["']\s*\)"#).expect("static regex")
    });

    let replacement = format!("scenarios({})", python_string(feature_rel_path));
    if call.is_match(source) {
        return call
            .replace_all(source, regex::NoExpand(&replacement))
            .into_owned();
    }

    let mut out = source.trim_end().to_string();
    out.push_str("\n\nfrom pytest_bdd import scenarios\n\n");
    out.push_str(&replacement);
    out.push('\n');
    out
}
