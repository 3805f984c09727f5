use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use portalsync_engine::config::parser;
use portalsync_engine::report::{format_elapsed, OutboxNotifier};
use portalsync_engine::workspace::BatchWorkspace;
use portalsync_engine::{local_collaborators, run_batch};

/// Execute the `run` command: parse the deployment, run the batch, print a
/// summary. Fails if any service failed or any definition was invalid.
pub async fn execute(target: &Path, config: Option<PathBuf>) -> Result<()> {
    let config_path = super::config_path(target, config);
    let config = parser::parse_deployment(&config_path)
        .with_context(|| format!("Failed to parse deployment: {}", config_path.display()))?;

    let collaborators = local_collaborators(target, &config)?;
    let notifier = Arc::new(OutboxNotifier::new(BatchWorkspace::new(target).outbox_dir()));
    let result = run_batch(target, &config, collaborators, notifier).await?;

    println!("Batch '{}' finished.", target.display());
    for recorded in &result.succeeded {
        println!(
            "  OK      {} ({}) in {}",
            recorded.run.name,
            recorded.run.kind,
            format_elapsed(recorded.run.elapsed)
        );
    }
    for recorded in &result.failed {
        println!(
            "  FAILED  {} ({}) with code {}",
            recorded.run.name, recorded.run.kind, recorded.run.code
        );
    }
    for invalid in &result.invalid_definitions {
        println!("  INVALID {}: {}", invalid.path.display(), invalid.error);
    }
    println!("  Duration: {}", format_elapsed(result.elapsed));

    if result.is_success() {
        Ok(())
    } else {
        anyhow::bail!(
            "{} service(s) failed, {} invalid definition(s)",
            result.failed.len(),
            result.invalid_definitions.len()
        )
    }
}
