//! Tokens command implementation

use std::path::Path;

use anyhow::{Context, Result};
use potion::tokenize;

use super::{load_settings, read_file};

/// Print the tokens of the template at `path` as a JSON array.
pub fn execute(path: &Path, config: Option<&Path>) -> Result<()> {
    let settings = load_settings(config)?;
    let pattern = settings.token_regex().context("Invalid token delimiters")?;
    let tokens = tokenize(&read_file(path)?, &pattern);
    println!("{}", serde_json::to_string_pretty(&tokens)?);
    Ok(())
}
