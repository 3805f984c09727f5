use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use portalsync_engine::batch::credentials_dir;
use portalsync_engine::config::{parser, validator};
use portalsync_engine::orchestrator::load_definition;
use portalsync_engine::workspace::BatchWorkspace;

/// Execute the `check` command: validate the deployment and every service
/// definition without touching any data or the portal.
pub fn execute(target: &Path, config: Option<PathBuf>) -> Result<()> {
    let config_path = super::config_path(target, config);
    let config = parser::parse_deployment(&config_path)
        .with_context(|| format!("Failed to parse deployment: {}", config_path.display()))?;
    validator::validate_deployment(&config)?;
    println!("Deployment:        OK");

    let credentials = credentials_dir(target, &config);
    let credentials_ok = credentials.is_dir();
    print_status("Credentials", credentials_ok, || {
        format!("{} does not exist", credentials.display())
    });

    let workspace = BatchWorkspace::new(target);
    let definitions = workspace
        .service_definitions()
        .with_context(|| format!("Failed to list {}", workspace.list_dir().display()))?;

    let mut invalid = 0;
    for path in &definitions {
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match load_definition(path) {
            Ok(def) if def.project.is_file() => print_status(&label, true, String::new),
            Ok(def) => {
                invalid += 1;
                print_status(&label, false, || {
                    format!("project {} does not exist", def.project.display())
                });
            }
            Err(e) => {
                invalid += 1;
                print_status(&label, false, || format!("{e:#}"));
            }
        }
    }

    if credentials_ok && invalid == 0 {
        println!("\nAll checks passed ({} definition(s)).", definitions.len());
        Ok(())
    } else {
        anyhow::bail!("One or more checks failed")
    }
}

fn print_status(label: &str, ok: bool, detail: impl FnOnce() -> String) {
    println!("{:18} {}", format!("{label}:"), if ok { "OK" } else { "FAILED" });
    if !ok {
        println!("  {}", detail());
    }
}
