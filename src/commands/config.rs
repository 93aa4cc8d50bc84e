use anyhow::{bail, Context, Result};
use devtrack::config::Config;
use std::path::Path;
use tracing::info;

/// Execute the generate-config command
///
/// Writes the default configuration as TOML. An existing file is only
/// replaced with `force`.
pub fn generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    let rendered = toml::to_string_pretty(&Config::default())?;
    std::fs::write(output, rendered)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(path = %output.display(), "Default configuration written");
    println!("✓ Wrote default configuration to {}", output.display());
    Ok(())
}
