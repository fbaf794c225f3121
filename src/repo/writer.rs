use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::error::RepositoryError;
use crate::extract::page_model::PageAnalysis;
use crate::generate::common_steps::library_module;
use crate::repo::access::TestRepo;

pub const FEATURES_DIR: &str = "features";
pub const STEPS_DIR: &str = "steps";
pub const ANALYSIS_FILE: &str = "analysis/analysis.json";

/// Filesystem-safe identifier: lowercase alphanumerics joined by `_`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "flow".to_string()
    } else {
        slug.to_string()
    }
}

/// Slug for the generic pass, taken from the URL path (`index` for `/`).
pub fn url_slug(url: &str) -> String {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let path = without_scheme
        .split_once('/')
        .map(|(_, path)| path)
        .unwrap_or("");
    let path = path
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_matches('/');
    if path.is_empty() {
        "index".to_string()
    } else {
        slugify(path)
    }
}

/// Where one flow's scenario and step module live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSlot {
    pub flow_ref: String,
    pub slug: String,
    pub scenario_rel: PathBuf,
    pub steps_rel: PathBuf,
}

impl ArtifactSlot {
    pub fn new(flow_ref: &str, slug: &str) -> Self {
        Self {
            flow_ref: flow_ref.to_string(),
            slug: slug.to_string(),
            scenario_rel: Path::new(FEATURES_DIR).join(format!("{}.feature", slug)),
            steps_rel: Path::new(STEPS_DIR).join(format!("test_{}.py", slug)),
        }
    }

    /// Feature path as seen from the step module.
    pub fn feature_ref(&self) -> String {
        format!("../{}/{}.feature", FEATURES_DIR, self.slug)
    }
}

/// Assign slots in input order. Colliding slugs get `_2`, `_3`, ... so the
/// result only depends on the order of `names`.
pub fn plan_slots(names: &[(String, String)]) -> Vec<ArtifactSlot> {
    let mut taken = HashSet::new();
    names
        .iter()
        .map(|(flow_ref, base)| {
            let base = slugify(base);
            let mut slug = base.clone();
            let mut n = 2;
            while !taken.insert(slug.clone()) {
                slug = format!("{}_{}", base, n);
                n += 1;
            }
            ArtifactSlot::new(flow_ref, &slug)
        })
        .collect()
}

// ============================================================================
// Writer
// ============================================================================

/// Persists artifact pairs into the test repository.
///
/// Pairs for different slots are written concurrently; writes to the same
/// slot are serialized by a per-path lock.
pub struct ArtifactWriter {
    repo: Arc<TestRepo>,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl ArtifactWriter {
    pub fn new(repo: TestRepo) -> Self {
        Self {
            repo: Arc::new(repo),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn repo(&self) -> &TestRepo {
        &self.repo
    }

    fn lock_for(&self, rel: &Path) -> Result<Arc<tokio::sync::Mutex<()>>, RepositoryError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| RepositoryError::Task("write lock table poisoned".into()))?;
        Ok(locks.entry(rel.to_path_buf()).or_default().clone())
    }

    /// Replace the slot's scenario and step module together.
    pub async fn write_pair(
        &self,
        slot: &ArtifactSlot,
        scenario_text: &str,
        steps_text: &str,
    ) -> Result<(PathBuf, PathBuf), RepositoryError> {
        let lock = self.lock_for(&slot.scenario_rel)?;
        let _guard = lock.lock().await;

        let repo = Arc::clone(&self.repo);
        let scenario_rel = slot.scenario_rel.clone();
        let steps_rel = slot.steps_rel.clone();
        let scenario = scenario_text.to_string();
        let steps = steps_text.to_string();

        tokio::task::spawn_blocking(move || {
            repo.replace_pair(
                (scenario_rel.as_path(), scenario.as_str()),
                (steps_rel.as_path(), steps.as_str()),
            )
        })
        .await
        .map_err(|e| RepositoryError::Task(e.to_string()))?
    }

    /// Persist the analysis document for reuse by later runs.
    pub fn write_analysis(&self, analysis: &PageAnalysis) -> Result<PathBuf, RepositoryError> {
        let path = Path::new(ANALYSIS_FILE);
        let json = serde_json::to_string_pretty(analysis).map_err(|e| {
            RepositoryError::AnalysisFormat {
                path: path.to_path_buf(),
                source: e,
            }
        })?;
        self.repo.write_atomic(path, &json)
    }

    /// Previously persisted analysis, if any.
    pub fn load_analysis(&self) -> Result<Option<PageAnalysis>, RepositoryError> {
        load_analysis_from(&self.repo, Path::new(ANALYSIS_FILE))
    }

    /// Lay out an empty suite. Existing files are never overwritten; returns
    /// the files that were created.
    pub fn scaffold(&self, app_name: &str) -> Result<Vec<PathBuf>, RepositoryError> {
        for dir in [FEATURES_DIR, STEPS_DIR, "analysis"] {
            self.repo.create_dir(Path::new(dir))?;
        }

        let conftest = CONFTEST.replace("__APP__", app_name);
        let example = EXAMPLE_FEATURE.replace("__APP__", app_name);
        let common = library_module();
        let files = [
            ("conftest.py", conftest.as_str()),
            ("steps/__init__.py", ""),
            ("steps/common_steps.py", common.as_str()),
            ("features/example.feature", example.as_str()),
            ("requirements.txt", REQUIREMENTS),
        ];

        let mut created = Vec::new();
        for (rel, contents) in files {
            if self.repo.write_new(Path::new(rel), contents)? {
                info!(file = rel, "created");
                created.push(PathBuf::from(rel));
            }
        }
        Ok(created)
    }
}

/// Load an analysis document from `rel` inside `repo`.
pub fn load_analysis_from(
    repo: &TestRepo,
    rel: &Path,
) -> Result<Option<PageAnalysis>, RepositoryError> {
    let Some(text) = repo.read(rel)? else {
        return Ok(None);
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| RepositoryError::AnalysisFormat {
            path: rel.to_path_buf(),
            source: e,
        })
}

const CONFTEST: &str = r#""""Shared fixtures for the __APP__ BDD suite."""
import pytest

from steps.common_steps import *  # noqa: F401,F403


@pytest.fixture(scope="session")
def browser_context_args(browser_context_args):
    return {**browser_context_args, "ignore_https_errors": True}
"#;

const EXAMPLE_FEATURE: &str = "Feature: __APP__ example
  Every step here is bound in steps/common_steps.py.
  Run `frontend-tester generate <url>` to write real suites.

  Scenario: Homepage loads
    Given I am on the homepage
    Then the page should load
    And the page title should not be empty
";

const REQUIREMENTS: &str = "pytest\npytest-bdd\npytest-playwright\n";
