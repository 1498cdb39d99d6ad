//! Registered commands: `kiln commands` and external subcommands.

use anyhow::Result;
use console::style;
use kiln::config::KilnConfig;
use kiln::registry::{CommandExecutor, CommandRegistry, module_specifiers};
use kiln::ui::icons::WARN;

use super::Session;
use super::deps::ensure_dependencies;

fn load_registry(config: &KilnConfig) -> Result<CommandRegistry> {
    let local_root = config.module_root();
    let specs = module_specifiers(
        config.module_specifiers(),
        &local_root,
        config.discover_modules(),
    );
    let registry =
        CommandRegistry::load(&specs, &local_root, &config.home(), config.strict_modules())?;
    Ok(registry)
}

pub async fn cmd_commands(session: &Session) -> Result<i32> {
    let config = session.config()?;
    if let Some(code) = ensure_dependencies(session, &config, &config.dependencies()).await? {
        return Ok(code);
    }
    let registry = load_registry(&config)?;

    for warning in registry.warnings() {
        eprintln!("{}{}", WARN, warning);
    }

    if registry.is_empty() {
        println!("No commands registered.");
        println!(
            "Add modules under {} or list them in [modules] specifiers.",
            config.module_root().display()
        );
        return Ok(0);
    }

    let width = registry.names().iter().map(String::len).max().unwrap_or(0);
    for command in registry.commands() {
        println!(
            "  {:width$}  {}  {}",
            style(&command.name).cyan().bold(),
            command.description,
            style(command.source.display()).dim(),
            width = width
        );
    }
    Ok(0)
}

pub async fn cmd_external(session: &Session, args: Vec<String>) -> Result<i32> {
    let Some((name, rest)) = args.split_first() else {
        anyhow::bail!("No command given");
    };

    let config = session.config()?;
    if let Some(code) = ensure_dependencies(session, &config, &config.dependencies()).await? {
        return Ok(code);
    }
    let registry = load_registry(&config)?;
    for warning in registry.warnings() {
        tracing::warn!("{}", warning);
    }
    let command = registry.require(name)?;

    let executor = CommandExecutor::new(&config.project_dir, &config.home_dir);
    executor.run(command, rest).await
}
