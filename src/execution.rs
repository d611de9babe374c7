//! Scheduling and execution strategies for test files
//!
//! - Serial: one definition after the other, in scheduled order
//! - Parallel: independent definitions run concurrently with a concurrency limit

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;

use crate::error::ExecutionError;
use crate::loader::TestFile;
use crate::reporting::{TestReport, TestStatus};
use crate::runner::Runner;

/// Receives each report as soon as it is final, in scheduled order
pub type ReportSink = Arc<dyn Fn(&TestReport) + Send + Sync>;

/// Definitions in execution order plus those that cannot run
#[derive(Debug, Default)]
pub struct Schedule {
    pub tests: Vec<TestFile>,
    pub rejected: Vec<TestReport>,
}

/// Order definitions by `meta.order` (stable), then by declared dependencies
pub fn schedule(mut tests: Vec<TestFile>) -> Schedule {
    tests.sort_by_key(|test| test.definition.meta.order);

    if tests.iter().all(|test| test.definition.meta.dependencies.is_empty()) {
        return Schedule {
            tests,
            rejected: Vec::new(),
        };
    }

    sort_by_dependencies(tests)
}

/// Dependency references match a file with or without its `.json` extension
fn dependency_name(file: &str) -> &str {
    let file = file.trim_start_matches("./");
    file.strip_suffix(".json").unwrap_or(file)
}

/// Topological sort keeping order based position among ready definitions
fn sort_by_dependencies(tests: Vec<TestFile>) -> Schedule {
    let names: Vec<&str> = tests.iter().map(|test| dependency_name(&test.file)).collect();
    let count = tests.len();

    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut rejected: Vec<Option<String>> = vec![None; count];

    for (i, test) in tests.iter().enumerate() {
        for dependency in &test.definition.meta.dependencies {
            match names.iter().position(|name| *name == dependency_name(dependency)) {
                Some(j) => edges[i].push(j),
                None => {
                    rejected[i] = Some(
                        ExecutionError::UnknownDependency {
                            file: test.file.clone(),
                            dependency: dependency.clone(),
                        }
                        .to_string(),
                    )
                }
            }
        }
    }

    // A definition cannot run when one of its dependencies cannot
    loop {
        let blocked = (0..count).find_map(|i| {
            if rejected[i].is_some() {
                return None;
            }
            edges[i].iter().find(|&&j| rejected[j].is_some()).map(|&j| (i, j))
        });

        match blocked {
            Some((i, j)) => {
                rejected[i] = Some(format!(
                    "Dependency \"{}\" of {} cannot run",
                    tests[j].file, tests[i].file
                ))
            }
            None => break,
        }
    }

    let mut placed = vec![false; count];
    let mut order = Vec::with_capacity(count);

    while let Some(next) = (0..count)
        .find(|&i| !placed[i] && rejected[i].is_none() && edges[i].iter().all(|&j| placed[j]))
    {
        placed[next] = true;
        order.push(next);
    }

    let cyclic: Vec<usize> = (0..count).filter(|&i| !placed[i] && rejected[i].is_none()).collect();
    if !cyclic.is_empty() {
        let files = cyclic
            .iter()
            .map(|&i| tests[i].file.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let message = ExecutionError::CircularDependency(files).to_string();
        for &i in &cyclic {
            rejected[i] = Some(message.clone());
        }
    }

    let mut slots: Vec<Option<TestFile>> = tests.into_iter().map(Some).collect();
    let mut schedule = Schedule::default();

    for i in order {
        if let Some(test) = slots[i].take() {
            schedule.tests.push(test);
        }
    }

    for (slot, reason) in slots.iter_mut().zip(rejected) {
        if let (Some(test), Some(reason)) = (slot.take(), reason) {
            log::error!("{}", reason);
            schedule
                .rejected
                .push(TestReport::new(test.file, 0, TestStatus::Error).with_error(reason));
        }
    }

    log::debug!(
        "Dependency order: {}",
        schedule
            .tests
            .iter()
            .map(|test| test.file.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    );

    schedule
}

/// Trait for different execution strategies
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    async fn execute(
        &self,
        runner: Arc<Runner>,
        tests: Vec<TestFile>,
        sink: ReportSink,
    ) -> Result<Vec<TestReport>, ExecutionError>;

    fn strategy_name(&self) -> &str;
}

/// Serial execution strategy, the reference behavior
#[derive(Debug, Default, Clone)]
pub struct SerialExecutor;

impl SerialExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionStrategy for SerialExecutor {
    async fn execute(
        &self,
        runner: Arc<Runner>,
        tests: Vec<TestFile>,
        sink: ReportSink,
    ) -> Result<Vec<TestReport>, ExecutionError> {
        let mut reports = Vec::new();

        for test in tests {
            for report in runner.run_definition(&test.file, &test.definition).await {
                sink(&report);
                reports.push(report);
            }
        }

        Ok(reports)
    }

    fn strategy_name(&self) -> &str {
        "serial"
    }
}

/// Runs batches of independent definitions concurrently.
///
/// A definition is independent when it neither exports globals, binds iterators,
/// declares dependencies nor is the target of one. Anything else runs alone once the
/// preceding batch has completed.
#[derive(Debug, Clone)]
pub struct ParallelExecutor {
    concurrency_limit: usize,
}

impl ParallelExecutor {
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Split into consecutive batches; a batch of more than one is safe to run concurrently
    pub fn group_into_batches(&self, tests: Vec<TestFile>) -> Vec<Vec<TestFile>> {
        let targets: HashSet<String> = tests
            .iter()
            .flat_map(|test| test.definition.meta.dependencies.iter())
            .map(|dependency| dependency_name(dependency).to_string())
            .collect();

        let is_independent = |test: &TestFile| {
            let definition = &test.definition;
            !definition.exports()
                && !definition.has_iterators()
                && definition.meta.dependencies.is_empty()
                && !targets.contains(dependency_name(&test.file))
        };

        let mut batches: Vec<Vec<TestFile>> = Vec::new();
        let mut current: Vec<TestFile> = Vec::new();

        for test in tests {
            if is_independent(&test) {
                current.push(test);
                continue;
            }

            if !current.is_empty() {
                batches.push(std::mem::take(&mut current));
            }
            batches.push(vec![test]);
        }

        if !current.is_empty() {
            batches.push(current);
        }

        batches
    }
}

/// Aborts spawned tests when the executor future is dropped mid-batch
#[derive(Default)]
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

#[async_trait]
impl ExecutionStrategy for ParallelExecutor {
    async fn execute(
        &self,
        runner: Arc<Runner>,
        tests: Vec<TestFile>,
        sink: ReportSink,
    ) -> Result<Vec<TestReport>, ExecutionError> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency_limit));
        let mut reports = Vec::new();

        for batch in self.group_into_batches(tests) {
            let mut tasks = Vec::with_capacity(batch.len());
            let mut guard = AbortOnDrop::default();

            for test in batch {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| ExecutionError::Cancelled)?;
                let runner = runner.clone();

                let task = tokio::spawn(async move {
                    let _permit = permit;
                    runner.run_definition(&test.file, &test.definition).await
                });
                guard.0.push(task.abort_handle());
                tasks.push(task);
            }

            // join keeps spawn order, so reports stay in scheduled order
            let results = futures::future::try_join_all(tasks)
                .await
                .map_err(|e| ExecutionError::Join(e.to_string()))?;

            for report in results.into_iter().flatten() {
                sink(&report);
                reports.push(report);
            }
        }

        Ok(reports)
    }

    fn strategy_name(&self) -> &str {
        "parallel"
    }
}
