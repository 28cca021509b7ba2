use crate::commands::Workspace;
use crate::config::{CONFIG_FILE, Config};
use crate::error::Result;

/// Create the coordination layout; an existing `config.json` is left alone.
pub fn run(ws: &Workspace) -> Result<()> {
    let registry = ws.registry();
    registry.ensure_dirs()?;

    if !ws.coord_dir.join(CONFIG_FILE).exists() {
        Config::default().save(&ws.coord_dir)?;
    }

    tracing::info!(coord_dir = %ws.coord_dir.display(), "coordination directory initialized");
    eprintln!("Initialized {}", ws.coord_dir.display());
    Ok(())
}
