//! Project management commands for CLI.

use clap::Subcommand;
use pomoledger_core::{render_project_list, Config, ProjectStore};

use super::open_database;

#[derive(Subcommand)]
pub enum ProjectAction {
    /// Register a project without starting a session
    Add {
        /// Project name
        name: String,
    },
    /// List active projects with their focus totals
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: ProjectAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = open_database(&config)?;

    match action {
        ProjectAction::Add { name } => {
            let name = name.trim();
            if name.is_empty() {
                return Err("Project name required.".into());
            }
            if db.add_project(name)? {
                println!("Project '{name}' added.");
            } else {
                println!("Project '{name}' already exists.");
            }
        }
        ProjectAction::List { json } => {
            let projects = db.active_project_totals()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&projects)?);
            } else {
                println!("{}", render_project_list(&projects));
            }
        }
    }
    Ok(())
}
