//! `mindstack init`: write starter configuration and sales-avatar definitions.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;

use mindstack_infra::filesystem::DataLayout;

const CONFIG_TOML: &str = include_str!("../../assets/config.toml");
const SALES_INTENTS: &str = include_str!("../../assets/sales/intents.yaml");
const SALES_FLOWS: &str = include_str!("../../assets/sales/flows.yaml");
const PROMPTS: &str = include_str!("../../assets/prompts.yaml");

/// What happened to each starter file.
#[derive(Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(PathBuf),
    Skipped(PathBuf),
}

/// Write the starter files under `data_dir`, keeping existing files unless
/// `force` is set.
pub async fn write_starter_definitions(data_dir: &Path, force: bool) -> Result<Vec<WriteOutcome>> {
    let layout = DataLayout::new(data_dir);
    let files = [
        (data_dir.join("config.toml"), CONFIG_TOML),
        (layout.avatar_dir("sales").join("intents.yaml"), SALES_INTENTS),
        (layout.avatar_dir("sales").join("flows.yaml"), SALES_FLOWS),
        (layout.prompts_path(), PROMPTS),
    ];

    let mut outcomes = Vec::with_capacity(files.len());
    for (path, content) in files {
        let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
        if exists && !force {
            outcomes.push(WriteOutcome::Skipped(path));
            continue;
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        outcomes.push(WriteOutcome::Written(path));
    }
    Ok(outcomes)
}

pub async fn init(data_dir: &Path, force: bool, json: bool) -> Result<()> {
    let outcomes = write_starter_definitions(data_dir, force).await?;

    if json {
        let files: Vec<serde_json::Value> = outcomes
            .iter()
            .map(|o| match o {
                WriteOutcome::Written(p) => serde_json::json!({"path": p, "written": true}),
                WriteOutcome::Skipped(p) => serde_json::json!({"path": p, "written": false}),
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "data_dir": data_dir,
                "files": files,
            }))?
        );
        return Ok(());
    }

    println!();
    for outcome in &outcomes {
        match outcome {
            WriteOutcome::Written(p) => {
                println!("  {} {}", style("✓").green().bold(), p.display());
            }
            WriteOutcome::Skipped(p) => {
                println!(
                    "  {} {} {}",
                    style("-").dim(),
                    p.display(),
                    style("(exists, use --force to overwrite)").dim()
                );
            }
        }
    }
    println!();
    println!(
        "  Try it: {}",
        style("mindstack chat").cyan()
    );
    println!();
    Ok(())
}
