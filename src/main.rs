//! Storydesk maintenance CLI.
//!
//! Operator commands over the local database. Output is pretty-printed JSON;
//! a failed service call prints its error payload and exits non-zero.

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use serde::Serialize;

use storydesk_lib::resolve::split_id_list;
use storydesk_lib::services::{follow_ups, stakeholders};
use storydesk_lib::state::create_or_update_config;
use storydesk_lib::{AppState, ErrorPayload, ServiceError};

#[derive(Parser, Debug)]
#[command(name = "storydesk", version)]
#[command(about = "Maintenance commands for the Storydesk database")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge stakeholders whose names differ only in spacing, width or case
    Dedupe {
        /// Name to match
        name: String,
        /// Only merge rows of this project
        #[arg(long, value_name = "ID")]
        project: Option<String>,
    },

    /// Open follow-ups under a project whose action date has passed
    Overdue {
        project_id: String,
        /// Day to measure against (defaults to the local date)
        #[arg(long, value_name = "YYYY-MM-DD")]
        today: Option<String>,
    },

    /// One page of a story's or storyline's follow-ups, most recent first
    List {
        parent_id: String,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        offset: Option<i64>,
    },

    /// Show how a stakeholder selection would be brought into a project
    ImportPlan {
        project_id: String,
        /// Comma-separated stakeholder ids
        #[arg(value_name = "ID,ID,...")]
        ids: String,
    },

    /// Copy the missing stakeholders of a selection into a project
    Import {
        project_id: String,
        /// Comma-separated stakeholder ids
        #[arg(value_name = "ID,ID,...")]
        ids: String,
    },

    /// Print the configuration, saving any field given
    Config {
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..=200))]
        page_size: Option<i64>,
        #[arg(long, value_name = "true|false")]
        unique_names: Option<bool>,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a service result, or its error payload before failing.
fn emit<T: Serialize>(result: Result<T, ServiceError>) -> anyhow::Result<()> {
    match result {
        Ok(value) => print_json(&value),
        Err(err) => {
            print_json(&ErrorPayload::from(&err))?;
            Err(err.into())
        }
    }
}

fn run(command: Command, state: &AppState) -> anyhow::Result<()> {
    let config = state.config();
    match command {
        Command::Dedupe { name, project } => emit(state.with_db(|db| {
            stakeholders::deduplicate_by_name(db, &name, project.as_deref())
        })),
        Command::Overdue { project_id, today } => emit(state.with_db(|db| {
            follow_ups::list_overdue(db, &project_id, today.as_deref())
        })),
        Command::List {
            parent_id,
            limit,
            offset,
        } => emit(state.with_db(|db| {
            follow_ups::list_follow_ups(
                db,
                &parent_id,
                limit,
                offset,
                config.default_page_size,
                None,
            )
        })),
        Command::ImportPlan { project_id, ids } => emit(state.with_db(|db| {
            stakeholders::preview_import(db, &project_id, &split_id_list(&ids))
        })),
        Command::Import { project_id, ids } => emit(state.with_db(|db| {
            stakeholders::import_missing(
                db,
                &project_id,
                &split_id_list(&ids),
                config.enforce_unique_stakeholder_names,
            )
        })),
        Command::Config {
            page_size,
            unique_names,
        } => {
            if page_size.is_none() && unique_names.is_none() {
                return print_json(&config);
            }
            let updated = create_or_update_config(state, |c| {
                if let Some(size) = page_size {
                    c.default_page_size = size;
                }
                if let Some(unique) = unique_names {
                    c.enforce_unique_stakeholder_names = unique;
                }
            })
            .map_err(|e| anyhow!("Failed to save Storydesk config: {e}"))?;
            print_json(&updated)
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let state = AppState::new();
    run(cli.command, &state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use storydesk_lib::db::StoryDb;
    use storydesk_lib::services::stakeholders::{create_stakeholder, NewStakeholder};
    use storydesk_lib::types::Config;

    fn parse(args: &[&str]) -> Result<Command, clap::Error> {
        Cli::try_parse_from(std::iter::once("storydesk").chain(args.iter().copied()))
            .map(|cli| cli.command)
    }

    fn state_with_db() -> AppState {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = StoryDb::open_at(dir.path().join("story.db")).expect("open db");
        std::mem::forget(dir);
        AppState::with_parts(Config::default(), Some(db))
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_positionals_and_flags() {
        match parse(&["list", "st1", "--limit", "5"]).expect("list") {
            Command::List {
                parent_id,
                limit,
                offset,
            } => {
                assert_eq!(parent_id, "st1");
                assert_eq!(limit, Some(5));
                assert_eq!(offset, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
        match parse(&["dedupe", "王 纪虎", "--project", "p1"]).expect("dedupe") {
            Command::Dedupe { name, project } => {
                assert_eq!(name, "王 纪虎");
                assert_eq!(project.as_deref(), Some("p1"));
            }
            other => panic!("unexpected command {other:?}"),
        }
        match parse(&["config", "--unique-names", "false"]).expect("config") {
            Command::Config {
                page_size,
                unique_names,
            } => {
                assert_eq!(page_size, None);
                assert_eq!(unique_names, Some(false));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_rejects_bad_arguments() {
        assert!(parse(&["list", "st1", "--limit"]).is_err());
        assert!(parse(&["list", "st1", "--limit", "many"]).is_err());
        assert!(parse(&["config", "--page-size", "0"]).is_err());
        assert!(parse(&["import-plan", "p1"]).is_err());
        assert!(parse(&["reopen", "r1"]).is_err());
    }

    #[test]
    fn test_import_copies_selection_into_project() {
        let state = state_with_db();
        let global = state
            .with_db(|db| {
                create_stakeholder(
                    db,
                    NewStakeholder {
                        project_id: "p2".to_string(),
                        name: "Ada".to_string(),
                        ..Default::default()
                    },
                    true,
                )
            })
            .expect("seed");

        let ids = format!("{}, ghost", global.id);
        run(
            Command::Import {
                project_id: "p1".to_string(),
                ids: ids.clone(),
            },
            &state,
        )
        .expect("import");
        run(
            Command::Import {
                project_id: "p1".to_string(),
                ids,
            },
            &state,
        )
        .expect("rerun");

        let local = state
            .with_db(|db| Ok(db.get_project_stakeholders("p1", true)?))
            .expect("list");
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].name, "Ada");
    }

    #[test]
    fn test_closed_database_fails_the_command() {
        let state = AppState::with_parts(Config::default(), None);
        let result = run(
            Command::Overdue {
                project_id: "p1".to_string(),
                today: None,
            },
            &state,
        );
        assert!(result.is_err());
    }
}
