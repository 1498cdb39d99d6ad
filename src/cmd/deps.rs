//! Dependency commands: `kiln deps`.

use anyhow::{Context, Result};
use console::style;
use kiln::config::{KilnConfig, KilnToml, ProjectDependencies};
use kiln::deps::{DependencySpecifier, InstallPolicy, parse_all_in};
use kiln::errors::RESTART_EXIT_CODE;
use kiln::init::{CONFIG_FILE, is_initialized};
use kiln::restart::auto_install_dependencies;
use kiln::ui::icons::{CHECK, CROSS, PACKAGE, RESTART};
use kiln::ui::{InstallProgress, ProgressPackageManager};

use super::Session;
use crate::DepsCommands;

/// Install whatever `deps` is missing, showing progress on stderr.
///
/// Returns `Some(RESTART_EXIT_CODE)` when the process must exit so the
/// wrapper can re-invoke it with the new dependencies loadable.
pub async fn ensure_dependencies(
    session: &Session,
    config: &KilnConfig,
    deps: &ProjectDependencies,
) -> Result<Option<i32>> {
    let home = config.home();
    let package_manager = config.package_manager();
    let progress = InstallProgress::new();
    let reporting = ProgressPackageManager::new(&package_manager, &progress);

    let result = auto_install_dependencies(
        deps,
        &config.project_dir,
        &home,
        &reporting,
        session.restarted,
    )
    .await;
    progress.finish();

    if result? {
        eprintln!(
            "{}Dependencies changed; restarting to load them",
            RESTART
        );
        return Ok(Some(RESTART_EXIT_CODE));
    }
    Ok(None)
}

pub async fn cmd_deps(session: &Session, command: DepsCommands) -> Result<i32> {
    match command {
        DepsCommands::List => {
            let config = session.config()?;
            list(&config);
            Ok(0)
        }
        DepsCommands::Sync => {
            let config = session.config()?;
            sync(session, &config, config.dependencies()).await
        }
        DepsCommands::Install => {
            let config = session.config()?;
            let deps = ProjectDependencies {
                install_mode: InstallPolicy::Auto,
                ..config.dependencies()
            };
            sync(session, &config, deps).await
        }
        DepsCommands::Add { spec } => add(session, &spec).await,
    }
}

async fn sync(session: &Session, config: &KilnConfig, deps: ProjectDependencies) -> Result<i32> {
    if let Some(code) = ensure_dependencies(session, config, &deps).await? {
        return Ok(code);
    }

    let home = config.home();
    let specs = parse_all_in(&deps.dependencies, &config.project_dir)?;
    let still_missing: Vec<String> = specs
        .iter()
        .filter(|spec| !home.is_installed(spec))
        .map(|spec| spec.to_string())
        .collect();
    if !still_missing.is_empty() {
        anyhow::bail!(
            "The package manager reported success but these dependencies are still missing: {}\n  Inspect the shared home: {}",
            still_missing.join(", "),
            home.root().display()
        );
    }

    println!(
        "{}{} declared dependencies installed",
        CHECK,
        deps.dependencies.len()
    );
    Ok(0)
}

async fn add(session: &Session, raw: &str) -> Result<i32> {
    let spec: DependencySpecifier = raw.parse()?;
    if !is_initialized(&session.project_dir) {
        anyhow::bail!(
            "Not a kiln project: {}. Run 'kiln init' first.",
            session.project_dir.display()
        );
    }

    let config = session.config()?;
    let config_path = config.kiln_dir.join(CONFIG_FILE);
    let mut project = KilnToml::load_or_default(&config.kiln_dir)?;
    if project.add_dependency(&spec.to_string()) {
        project
            .save(&config_path)
            .with_context(|| format!("Failed to add '{}' to kiln.toml", spec))?;
        println!("{}Added {} to {}", PACKAGE, style(&spec).cyan(), config_path.display());
    } else {
        println!("{} is already declared", style(&spec).cyan());
    }

    // Reload so the new entry goes through the normal layering.
    let config = session.config()?;
    let deps = ProjectDependencies {
        install_mode: InstallPolicy::Auto,
        ..config.dependencies()
    };
    sync(session, &config, deps).await
}

fn list(config: &KilnConfig) {
    let home = config.home();

    println!();
    println!("{}", style("Declared dependencies").bold());
    if config.toml.dependencies.is_empty() {
        println!("  (none)");
    }
    for raw in &config.toml.dependencies {
        match raw.parse::<DependencySpecifier>() {
            Ok(spec) if home.is_installed(&spec.anchored_at(&config.project_dir)) => {
                println!("  {}{}", CHECK, spec)
            }
            Ok(spec) => println!("  {}{} {}", CROSS, spec, style("(missing)").dim()),
            Err(e) => println!("  {}{} {}", CROSS, raw, style(format!("({})", e)).red()),
        }
    }
    println!();

    println!(
        "{} {}",
        style("Shared home").bold(),
        style(home.root().display()).dim()
    );
    let installed = home.installed_dependencies();
    if installed.is_empty() {
        println!("  (nothing installed)");
    }
    for (name, source) in installed {
        println!("  {}{} {}", PACKAGE, name, style(source).dim());
    }
    println!();
}
