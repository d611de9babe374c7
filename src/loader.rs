//! Test directory discovery.

use regex::Regex;
use std::path::{Path, PathBuf};

use crate::definition::{self, TestDefinition};
use crate::error::RunnerError;
use crate::reporting::{TestReport, TestStatus};

/// A parsed test file ready to be scheduled
#[derive(Debug, Clone)]
pub struct TestFile {
    /// Path relative to the test directory, `/` separated
    pub file: String,
    pub definition: TestDefinition,
}

impl TestFile {
    pub fn new(file: impl Into<String>, definition: TestDefinition) -> Self {
        Self {
            file: file.into(),
            definition,
        }
    }
}

/// Everything found under the test directory
#[derive(Debug, Default)]
pub struct LoadedSuite {
    pub tests: Vec<TestFile>,
    /// Reports for files that were filtered out or failed to parse
    pub rejected: Vec<TestReport>,
}

#[derive(Debug, Clone)]
pub struct TestLoader {
    root: PathBuf,
    filters: Vec<Regex>,
}

impl TestLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            filters: Vec::new(),
        }
    }

    /// Only keep files whose relative path matches any of `patterns`
    pub fn with_subdir_filters(mut self, patterns: &[String]) -> Result<Self, RunnerError> {
        self.filters = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    let message = format!("Invalid subdir pattern \"{}\": {}", pattern, e);
                    RunnerError::Configuration(message)
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All `.json` files below the root, sorted by path
    pub async fn discover(&self) -> Result<Vec<PathBuf>, RunnerError> {
        let metadata = tokio::fs::metadata(&self.root).await.map_err(|e| {
            let root = self.root.display();
            RunnerError::Configuration(format!("Cannot read test directory {}: {}", root, e))
        })?;
        if !metadata.is_dir() {
            return Err(RunnerError::Configuration(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }

        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if path.extension().map(|ext| ext == "json").unwrap_or(false) {
                    files.push(path);
                }
            }
        }

        files.sort();
        log::debug!("Discovered {} test files in {}", files.len(), self.root.display());
        Ok(files)
    }

    pub fn relative_name(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn matches(&self, relative: &str) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|filter| filter.is_match(relative))
    }

    /// Discover, filter, and parse every test file
    pub async fn load(&self) -> Result<LoadedSuite, RunnerError> {
        let mut suite = LoadedSuite::default();

        for path in self.discover().await? {
            let file = self.relative_name(&path);

            if !self.matches(&file) {
                log::debug!("Filtered out {}", file);
                suite.rejected.push(TestReport::new(file, 0, TestStatus::Ignore));
                continue;
            }

            let parsed = match tokio::fs::read_to_string(&path).await {
                Ok(contents) => definition::parse(&contents).map_err(|e| e.to_string()),
                Err(e) => Err(format!("Cannot read test file: {}", e)),
            };

            match parsed {
                Ok(definition) => suite.tests.push(TestFile::new(file, definition)),
                Err(message) => {
                    log::error!("{}: {}", file, message);
                    suite
                        .rejected
                        .push(TestReport::new(file, 0, TestStatus::Error).with_error(message));
                }
            }
        }

        Ok(suite)
    }
}
