//! Templates command implementation

use std::path::Path;

use anyhow::{Context, Result};
use potion::Engine;
use potion_dom::parse_fragment;

use super::{load_settings, read_file};

/// List the names of the templates defined in the page at `path`.
pub fn execute(path: &Path, config: Option<&Path>) -> Result<()> {
    let settings = load_settings(config)?;
    let engine = Engine::with_settings(settings).context("Invalid engine settings")?;

    let page = parse_fragment(&read_file(path)?, "body")
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    let found = engine.discover_templates(&page, page.root());
    if found == 0 {
        eprintln!("No templates found in {}", path.display());
    }
    for name in engine.templates().names() {
        println!("{}", name);
    }
    Ok(())
}
