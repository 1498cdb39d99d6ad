use crate::deps::{DependencySpecifier, PackageManager};
use crate::errors::KilnError;
use crate::ui::icons::{CHECK, CROSS, PACKAGE};
use async_trait::async_trait;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Spinner shown on stderr while dependencies are installed.
///
/// Hidden automatically when stderr is not a terminal.
pub struct InstallProgress {
    bar: ProgressBar,
}

impl InstallProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{prefix:.bold.dim} {spinner} {msg}")
                .expect("progress bar template is a valid static string"),
        );
        bar.set_prefix("deps");
        Self { bar }
    }

    /// Show that `spec` is being installed and start the spinner.
    pub fn start(&self, spec: &str) {
        self.bar
            .set_message(format!("{}installing {}", PACKAGE, style(spec).cyan()));
        self.bar.enable_steady_tick(Duration::from_millis(100));
    }

    pub fn success(&self, spec: &str) {
        self.bar.println(format!("{}{}", CHECK, spec));
    }

    pub fn failure(&self, spec: &str) {
        self.bar.println(format!("{}{}", CROSS, style(spec).red()));
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for InstallProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Package manager wrapper that reports each install on an [`InstallProgress`].
pub struct ProgressPackageManager<'a, P: PackageManager + ?Sized> {
    inner: &'a P,
    progress: &'a InstallProgress,
}

impl<'a, P: PackageManager + ?Sized> ProgressPackageManager<'a, P> {
    pub fn new(inner: &'a P, progress: &'a InstallProgress) -> Self {
        Self { inner, progress }
    }
}

#[async_trait]
impl<P: PackageManager + ?Sized> PackageManager for ProgressPackageManager<'_, P> {
    fn describe(&self) -> String {
        self.inner.describe()
    }

    async fn add(&self, spec: &DependencySpecifier, home: &Path) -> Result<(), KilnError> {
        let label = spec.to_string();
        self.progress.start(&label);
        let result = self.inner.add(spec, home).await;
        match &result {
            Ok(()) => self.progress.success(&label),
            Err(_) => self.progress.failure(&label),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::installer::testing::FakePackageManager;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_progress_wrapper_delegates() {
        let dir = tempdir().unwrap();
        let fake = FakePackageManager {
            failing: vec!["bad".into()],
            ..Default::default()
        };
        let progress = InstallProgress::new();
        let pm = ProgressPackageManager::new(&fake, &progress);

        assert_eq!(pm.describe(), fake.describe());
        let good: DependencySpecifier = "good".parse().unwrap();
        let bad: DependencySpecifier = "bad".parse().unwrap();
        pm.add(&good, dir.path()).await.unwrap();
        assert!(pm.add(&bad, dir.path()).await.is_err());
        progress.finish();

        assert_eq!(fake.calls(), vec!["good", "bad"]);
    }
}
