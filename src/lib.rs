//! Generates pytest-bdd suites (Gherkin feature files plus step binding
//! modules) from live web pages.
//!
//! A page is captured and reduced to a [`extract::page_model::PageAnalysis`];
//! user flows are synthesized from it and each flow runs its own pipeline
//! from scenario text to a validated, written artifact pair.

pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod generate;
pub mod llm;
pub mod repo;
pub mod report;
pub mod trace;
