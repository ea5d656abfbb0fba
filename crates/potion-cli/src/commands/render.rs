/*
 * render.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Render command implementation.
//!
//! Renders a template file once against JSON data. Without `--data` the
//! template renders against an empty object.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use potion::{Engine, Value};
use tracing::info;

use super::{load_settings, read_file};

/// Arguments for the render command
#[derive(Debug)]
pub struct RenderArgs {
    pub template: PathBuf,
    pub data: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

/// Execute the render command
pub fn execute(args: RenderArgs) -> Result<()> {
    let settings = load_settings(args.config.as_deref())?;
    let engine = Engine::with_settings(settings).context("Invalid engine settings")?;

    let template = read_file(&args.template)?;
    let data = match &args.data {
        Some(path) => {
            let json: serde_json::Value = serde_json::from_str(&read_file(path)?)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?;
            Value::from(json)
        }
        None => Value::object(Default::default()),
    };

    let rendered = engine
        .render(&template, &data)
        .with_context(|| format!("Failed to render {}", args.template.display()))?;

    match &args.output {
        Some(path) => {
            fs::write(path, &rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(output = %path.display(), bytes = rendered.len(), "rendered template");
        }
        None => println!("{}", rendered),
    }
    Ok(())
}
