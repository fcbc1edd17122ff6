use super::rig;
use crate::output::{print_json, print_table, steps};
use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use std::path::Path;
use turntable_core::{FsProjectStore, ProjectStore, SessionError, SessionRecord};

#[derive(Subcommand)]
pub enum SessionSubcommand {
    /// Connect the rig and capture a full turn
    Start {
        /// Project id
        project: String,
        /// Session name (default: timestamp)
        #[arg(long)]
        name: Option<String>,
    },
    /// List a project's sessions
    List { project: String },
    /// Show one session and its photos
    Show { project: String, session: String },
    /// Delete a session and its photos
    Delete { project: String, session: String },
}

pub fn run(root: &Path, subcmd: SessionSubcommand, json: bool) -> anyhow::Result<()> {
    let store = FsProjectStore::new(root);
    match subcmd {
        SessionSubcommand::Start { project, name } => start(root, &store, &project, name, json),
        SessionSubcommand::List { project } => list(&store, &project, json),
        SessionSubcommand::Show { project, session } => show(&store, &project, &session, json),
        SessionSubcommand::Delete { project, session } => {
            store
                .delete_session(&project, &session)
                .with_context(|| format!("failed to delete session {session}"))?;
            if json {
                return print_json(&serde_json::json!({ "deleted": session }));
            }
            println!("Deleted session {session}.");
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// start
// ---------------------------------------------------------------------------

fn start(
    root: &Path,
    store: &FsProjectStore,
    project_id: &str,
    name: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let mut project = store
        .load(project_id)
        .with_context(|| format!("failed to load project {project_id}"))?;
    let name = name.unwrap_or_else(|| Utc::now().format("session %Y-%m-%d %H:%M:%S").to_string());

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async {
        let orchestrator = rig::connect(root).await?;
        let stop = rig::stop_on_ctrl_c();
        let outcome = orchestrator.start_session(&mut project, &name, &stop).await;
        orchestrator.rig().disconnect().await;
        anyhow::Ok(outcome)
    })?;

    match outcome {
        Ok(record) => {
            if json {
                return print_json(&record);
            }
            println!(
                "Session {} completed: {} steps of {}°.",
                record.id,
                steps(record.steps_completed(), record.planned_steps()),
                record.angle_step
            );
            if record.residual_arc() > 0 {
                println!("  last {}° of the turn not captured", record.residual_arc());
            }
            println!("  photos: {}", project.session_dir(&record.id).display());
            Ok(())
        }
        Err(SessionError::Halted(failure)) => {
            if json {
                print_json(&serde_json::json!({
                    "session": failure.record,
                    "planned_steps": failure.planned_steps,
                    "completed_steps": failure.completed_steps(),
                    "failed_while": failure.state,
                    "error": failure.cause.to_string(),
                }))?;
            } else {
                println!(
                    "Session {} halted: {} steps captured.",
                    failure.record.id,
                    steps(failure.completed_steps(), failure.planned_steps)
                );
            }
            Err(anyhow::Error::new(SessionError::Halted(failure)))
        }
        Err(e) => Err(anyhow::Error::new(e).context("capture session did not start")),
    }
}

// ---------------------------------------------------------------------------
// list / show
// ---------------------------------------------------------------------------

fn list(store: &FsProjectStore, project_id: &str, json: bool) -> anyhow::Result<()> {
    let project = store
        .load(project_id)
        .with_context(|| format!("failed to load project {project_id}"))?;
    if json {
        return print_json(&project.sessions);
    }
    if project.sessions.is_empty() {
        println!("No sessions for {}.", project.name);
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
                s.created_at.format("%Y-%m-%d %H:%M").to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "STEPS", "COMPLETE", "CREATED"], rows);
    Ok(())
}

fn show(store: &FsProjectStore, project_id: &str, session_id: &str, json: bool) -> anyhow::Result<()> {
    let project = store
        .load(project_id)
        .with_context(|| format!("failed to load project {project_id}"))?;
    let record: &SessionRecord = project
        .session(session_id)
        .with_context(|| format!("session not found: {session_id}"))?;
    if json {
        return print_json(record);
    }

    println!("Session:    {}", record.name);
    println!("ID:         {}", record.id);
    println!("Created:    {}", record.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Angle step: {}°", record.angle_step);
    println!(
        "Steps:      {}{}",
        steps(record.steps_completed(), record.planned_steps()),
        if record.completed { " (complete)" } else { "" }
    );
    println!();

    let rows = record
        .ordered_photos()
        .map(|(angle, path)| {
            let status = if path.is_file() { "" } else { "missing" };
            vec![
                format!("{angle:03}°"),
                path.display().to_string(),
                status.to_string(),
            ]
        })
        .collect();
    print_table(&["ANGLE", "PATH", ""], rows);
    Ok(())
}
