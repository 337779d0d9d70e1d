//! `neon-testing list`

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::output::{list_table, output, render_list, CommandOutput};
use crate::domain::models::{BranchListing, BranchRecord, NeonTestingOptions};
use crate::services::NeonTesting;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only show branches carrying the test marker
    #[arg(long)]
    pub marked_only: bool,
}

#[derive(Debug, Serialize)]
pub struct BranchRow {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub created_at: String,
    pub expires_at: Option<String>,
    pub marked: bool,
}

impl BranchRow {
    fn new(record: &BranchRecord, marked: bool) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            parent_id: record.parent_id.clone(),
            created_at: record.created_at.to_rfc3339(),
            expires_at: record.expires_at.map(|t| t.to_rfc3339()),
            marked,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BranchListOutput {
    pub project_id: String,
    pub branches: Vec<BranchRow>,
    pub total: usize,
}

impl BranchListOutput {
    pub fn from_listing(project_id: &str, listing: &BranchListing, marked_only: bool) -> Self {
        let branches: Vec<BranchRow> = listing
            .branches
            .iter()
            .map(|record| BranchRow::new(record, listing.is_marked(&record.id)))
            .filter(|row| !marked_only || row.marked)
            .collect();
        Self {
            project_id: project_id.to_string(),
            total: branches.len(),
            branches,
        }
    }
}

impl CommandOutput for BranchListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "name", "created", "expires", "test"]);
        for row in &self.branches {
            table.add_row(vec![
                row.id.clone(),
                row.name.clone(),
                row.created_at.clone(),
                row.expires_at.clone().unwrap_or_else(|| "-".to_string()),
                if row.marked { "yes" } else { "" }.to_string(),
            ]);
        }
        render_list("branch", &table, self.total)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: ListArgs, options: NeonTestingOptions, json_mode: bool) -> Result<()> {
    let neon = NeonTesting::new(options).context("failed to create Neon client")?;
    let project_id = neon.options().project_id.clone();

    let listing = neon
        .api()
        .list_branches(&project_id)
        .await
        .with_context(|| format!("failed to list branches of {project_id}"))?;

    output(
        &BranchListOutput::from_listing(&project_id, &listing, args.marked_only),
        json_mode,
    );
    Ok(())
}
