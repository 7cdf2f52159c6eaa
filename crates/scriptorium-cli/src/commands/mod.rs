//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command. All of them work
//! off a [`PresetCatalog`] built by [`load_catalog`].

pub mod pipeline;
pub mod presets;

use scriptorium_core::PresetCatalog;

/// Built-in presets plus those found in `preset_dir`, or in the default
/// search directories when no directory is given.
pub fn load_catalog(preset_dir: Option<&str>) -> Result<PresetCatalog, String> {
    let mut catalog = PresetCatalog::with_builtins();
    match preset_dir {
        Some(dir) => {
            let count = catalog.load_dir(dir).map_err(|e| e.to_string())?;
            tracing::info!("[Catalog] Loaded {} preset(s) from '{}'", count, dir);
        }
        None => {
            catalog.load_default_dirs();
        }
    }
    Ok(catalog)
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

/// Cut `s` to `max` characters, marking the cut with an ellipsis.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}
