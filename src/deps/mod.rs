//! Declared dependencies: parsing, installation and synchronization.
//!
//! - `specifier` parses `left-pad@^1`, `file:../x` and `git+https://...#ref`
//! - `installer` runs the external package manager inside the shared home
//! - `sync` decides, per install policy, whether anything gets installed

pub mod installer;
pub mod specifier;
pub mod sync;

pub use installer::{CommandPackageManager, Installer, PackageManager};
pub use specifier::{DependencySpecifier, parse_all, parse_all_in};
pub use sync::{INSTALL_COMMAND, InstallPolicy, Synchronizer};
