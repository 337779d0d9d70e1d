//! `neon-testing cleanup`

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::NeonTestingOptions;
use crate::services::NeonTesting;

#[derive(Debug, Serialize)]
pub struct CleanupOutput {
    pub project_id: String,
    pub deleted: Vec<String>,
}

impl CommandOutput for CleanupOutput {
    fn to_human(&self) -> String {
        if self.deleted.is_empty() {
            return format!("No test branches left in {}.", self.project_id);
        }
        let mut lines = vec![format!(
            "Deleted {} test branch(es) from {}:",
            self.deleted.len(),
            self.project_id
        )];
        lines.extend(self.deleted.iter().map(|id| format!("  {id}")));
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(options: NeonTestingOptions, json_mode: bool) -> Result<()> {
    let neon = NeonTesting::new(options).context("failed to create Neon client")?;
    let deleted = neon
        .delete_all_test_branches()
        .await
        .context("bulk cleanup failed")?;

    output(
        &CleanupOutput {
            project_id: neon.options().project_id.clone(),
            deleted,
        },
        json_mode,
    );
    Ok(())
}
