//! Process-wide template environment.
//!
//! Templates are embedded in the binary and validated once. [`init`] is
//! called early in `main` so a broken template surfaces as a fatal startup
//! error instead of failing halfway through a reconciliation.

use std::sync::OnceLock;

use minijinja::Environment;

use crate::error::Result;

/// Template name for changelog entries.
pub const CHANGELOG: &str = "changelog";
/// Template name for the release PR description.
pub const RELEASE_PR: &str = "release_pr";

static ENVIRONMENT: OnceLock<Environment<'static>> = OnceLock::new();

fn build() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.add_template(CHANGELOG, include_str!("templates/changelog.md.jinja"))?;
    env.add_template(RELEASE_PR, include_str!("templates/release_pr.md.jinja"))?;
    Ok(env)
}

/// Validate and install the template environment.
pub fn init() -> Result<()> {
    if ENVIRONMENT.get().is_some() {
        return Ok(());
    }
    let env = build()?;
    // A racing second init already installed the same templates.
    let _ = ENVIRONMENT.set(env);
    Ok(())
}

/// The shared template environment.
pub fn environment() -> &'static Environment<'static> {
    ENVIRONMENT.get_or_init(|| build().expect("embedded templates are valid"))
}
