//! Project state commands: `kiln state`.

use anyhow::Result;
use console::style;
use kiln::init::{STATE_FILE, get_kiln_dir, is_initialized};
use kiln::state::StateStore;
use serde_json::Value;

use super::Session;
use crate::StateCommands;

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn cmd_state(session: &Session, command: StateCommands) -> Result<()> {
    use dialoguer::Confirm;

    let store = StateStore::new(get_kiln_dir(&session.project_dir).join(STATE_FILE));
    let require_project = || -> Result<()> {
        if !is_initialized(&session.project_dir) {
            anyhow::bail!(
                "Not a kiln project: {}. Run 'kiln init' first.",
                session.project_dir.display()
            );
        }
        Ok(())
    };

    match command {
        StateCommands::Get { key } => match store.get(&key) {
            Some(entry) => println!("{}", render(&entry.value)),
            None => anyhow::bail!("No state entry named '{}'", key),
        },
        StateCommands::Set { key, value } => {
            require_project()?;
            store.set(&key, &value)?;
        }
        StateCommands::Unset { key } => {
            require_project()?;
            if !store.remove(&key)? {
                println!("No state entry named '{}'", key);
            }
        }
        StateCommands::List => {
            let entries = store.entries();
            if entries.is_empty() {
                println!("No state entries");
            }
            for (key, entry) in entries {
                println!(
                    "{} = {} {}",
                    style(key).bold(),
                    render(&entry.value),
                    style(entry.updated_at.format("(%Y-%m-%d %H:%M:%S UTC)")).dim()
                );
            }
        }
        StateCommands::Clear => {
            require_project()?;
            if !session.yes {
                let confirm = Confirm::new()
                    .with_prompt("This will delete all state entries. Are you sure?")
                    .default(false)
                    .interact()
                    .unwrap_or(false);

                if !confirm {
                    println!("Clear cancelled");
                    return Ok(());
                }
            }
            let removed = store.clear()?;
            println!("Removed {} state entries", removed);
        }
    }

    Ok(())
}
