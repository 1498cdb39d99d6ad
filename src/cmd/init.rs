//! Project initialization: `kiln init`.

use anyhow::Result;
use console::style;
use kiln::init::{COMMANDS_DIR, init_project, is_initialized};
use kiln::ui::icons::{FOLDER, SPARKLE};
use std::path::Path;

pub fn cmd_init(project_dir: &Path) -> Result<()> {
    let was_initialized = is_initialized(project_dir);
    let result = init_project(project_dir)?;

    if result.created {
        println!(
            "{}Initialized kiln project at {}",
            SPARKLE,
            style(result.kiln_dir.display()).bold()
        );
        println!();
        println!("{}.kiln/", FOLDER);
        println!("  ├── kiln.toml      # Dependencies, modules, install policy");
        println!("  ├── state.json     # Key/value state (`kiln state`)");
        println!("  └── {}/", COMMANDS_DIR);
        println!("      └── hello.toml # Sample command");
        println!();
        println!("Next steps:");
        println!("  1. Run `kiln hello` to try the sample command");
        println!("  2. Add dependencies with `kiln deps add <spec>`");
        println!("  3. Run `kiln commands` to see everything available");
    } else if was_initialized {
        println!(
            "kiln project already initialized at {}",
            result.kiln_dir.display()
        );
        println!("Directory structure verified.");
    } else {
        println!(
            "Completed kiln initialization at {}",
            result.kiln_dir.display()
        );
    }

    Ok(())
}
