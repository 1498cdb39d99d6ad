//! Configuration view and validation commands: `kiln config`.

use anyhow::Result;
use console::style;
use kiln::config::KilnToml;
use kiln::deps::PackageManager;
use kiln::init::{get_kiln_dir, write_default_config};
use kiln::ui::icons::{CHECK, FILE_NEW, WARN};

use super::Session;
use crate::ConfigCommands;

pub fn cmd_config(session: &Session, command: Option<ConfigCommands>) -> Result<()> {
    let kiln_dir = get_kiln_dir(&session.project_dir);

    match command {
        None | Some(ConfigCommands::Show) => {
            let config = session.config()?;
            let toml = &config.toml;

            println!();
            println!("{}", style("kiln configuration").bold());
            println!("==================");
            println!();

            if config.has_project_config {
                println!("Config file: {}", config.config_file().display());
            } else {
                println!("No kiln.toml found at {}", config.config_file().display());
                println!("Run 'kiln config init' to create one.");
            }
            println!();

            if let Some(name) = &toml.project.name {
                println!("[project]");
                println!("  name = \"{}\"", name);
                println!();
            }

            println!("dependencies:");
            if toml.dependencies.is_empty() {
                println!("  (none)");
            }
            for dep in &toml.dependencies {
                println!("  - {}", dep);
            }
            println!();

            println!("[modules]");
            println!("  specifiers = {:?}", config.module_specifiers());
            println!("  root = \"{}\"", config.module_root().display());
            println!("  discover = {}", config.discover_modules());
            println!("  strict = {}", config.strict_modules());
            println!();

            println!("Effective values (with env/CLI overrides):");
            println!("  install_mode = \"{}\"", config.install_mode);
            println!("  offline = {}", config.offline);
            println!("  home = \"{}\"", config.home_dir.display());
            println!(
                "  package_manager = \"{}\"",
                config.package_manager().describe()
            );
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let config = session.config()?;
            if !config.has_project_config {
                println!("No kiln.toml found. Using defaults (valid).");
                return Ok(());
            }

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("{}Configuration is valid.", CHECK);
            } else {
                println!("{}Configuration warnings:", WARN);
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            let config_path = kiln_dir.join(kiln::init::CONFIG_FILE);
            if !write_default_config(&kiln_dir)? {
                println!("kiln.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            KilnToml::load(&config_path)?;

            println!("{}Created kiln.toml at {}", FILE_NEW, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - dependencies, install_mode, offline");
            println!("  - [modules] specifiers, dir, discover, strict");
            println!("  - [package_manager] command, add_args");
            println!();
        }
    }

    Ok(())
}
