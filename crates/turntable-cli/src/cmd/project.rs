use crate::output::{print_json, print_table, steps};
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;
use turntable_core::config::RigConfig;
use turntable_core::{FsProjectStore, ProjectStore};

#[derive(Subcommand)]
pub enum ProjectSubcommand {
    /// Create a project
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Degrees between photos (default: rotation.default_angle_step)
        #[arg(long)]
        angle_step: Option<u32>,
    },
    /// List projects, most recently updated first
    List,
    /// Show a project and its sessions
    Info { id: String },
    /// Change a project's name, description or angle step
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        angle_step: Option<u32>,
    },
    /// Delete a project and every photo it holds
    Delete { id: String },
}

pub fn run(root: &Path, subcmd: ProjectSubcommand, json: bool) -> anyhow::Result<()> {
    let store = FsProjectStore::new(root);
    match subcmd {
        ProjectSubcommand::Create {
            name,
            description,
            angle_step,
        } => create(root, &store, &name, &description, angle_step, json),
        ProjectSubcommand::List => list(&store, json),
        ProjectSubcommand::Info { id } => info(&store, &id, json),
        ProjectSubcommand::Update {
            id,
            name,
            description,
            angle_step,
        } => {
            let project = store
                .update(&id, name.as_deref(), description.as_deref(), angle_step)
                .with_context(|| format!("failed to update project {id}"))?;
            if json {
                return print_json(&project);
            }
            println!("Updated project {} ({}).", project.id, project.name);
            Ok(())
        }
        ProjectSubcommand::Delete { id } => {
            store
                .delete(&id)
                .with_context(|| format!("failed to delete project {id}"))?;
            if json {
                return print_json(&serde_json::json!({ "deleted": id }));
            }
            println!("Deleted project {id}.");
            Ok(())
        }
    }
}

fn create(
    root: &Path,
    store: &FsProjectStore,
    name: &str,
    description: &str,
    angle_step: Option<u32>,
    json: bool,
) -> anyhow::Result<()> {
    let step = match angle_step {
        Some(step) => step,
        None => {
            RigConfig::load(root)
                .context("failed to load config")?
                .rotation
                .default_angle_step
        }
    };
    let project = store
        .create(name, description, step)
        .context("failed to create project")?;

    if json {
        return print_json(&project);
    }
    println!("Created project {} ({}).", project.id, project.name);
    println!("  angle step: {}°", project.angle_step);
    if 360 % project.angle_step != 0 {
        println!(
            "  note: {}° does not divide 360; the last {}° of each turn is not captured",
            project.angle_step,
            360 % project.angle_step
        );
    }
    Ok(())
}

fn list(store: &FsProjectStore, json: bool) -> anyhow::Result<()> {
    let projects = store.list().context("failed to list projects")?;
    if json {
        return print_json(&projects);
    }
    if projects.is_empty() {
        println!("No projects. Create one with `turntable project create <name>`.");
        return Ok(());
    }

    let rows = projects
        .iter()
        .map(|p| {
            vec![
                p.id.clone(),
                p.name.clone(),
                format!("{}°", p.angle_step),
                p.sessions.len().to_string(),
                p.updated_at.format("%Y-%m-%d %H:%M").to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "STEP", "SESSIONS", "UPDATED"], rows);
    Ok(())
}

fn info(store: &FsProjectStore, id: &str, json: bool) -> anyhow::Result<()> {
    let project = store
        .load(id)
        .with_context(|| format!("failed to load project {id}"))?;
    if json {
        return print_json(&project);
    }

    println!("Project:     {}", project.name);
    println!("ID:          {}", project.id);
    if !project.description.is_empty() {
        println!("Description: {}", project.description);
    }
    println!("Angle step:  {}°", project.angle_step);
    println!("Created:     {}", project.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Path:        {}", project.path.display());
    println!();

    if project.sessions.is_empty() {
        println!("No sessions yet.");
        return Ok(());
    }
    let rows = project
        .sessions
        .iter()
        .map(|s| {
            vec![
                s.id.clone(),
                s.name.clone(),
                steps(s.steps_completed(), s.planned_steps()),
                if s.completed { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();
    print_table(&["SESSION", "NAME", "STEPS", "COMPLETE"], rows);
    Ok(())
}
