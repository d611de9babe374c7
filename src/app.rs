use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::configuration::{Bootstrap, ExecutionMode, RunnerConfig};
use crate::console::Console;
use crate::execution::{self, ExecutionStrategy, ParallelExecutor, ReportSink, SerialExecutor};
use crate::globals::GlobalStore;
use crate::loader::TestLoader;
use crate::reporting::{JsonReportWriter, SuiteStats, TestReport};
use crate::runner::Runner;
use crate::transport::{HttpTransport, ReqwestTransport};

/// Application state for coordinating shutdown
#[derive(Clone, Default)]
pub struct AppState {
    pub shutdown_signal: Arc<AtomicBool>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shutdown(&self) {
        self.shutdown_signal.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_signal.load(Ordering::SeqCst)
    }
}

/// Result of a complete run
#[derive(Debug)]
pub struct RunOutcome {
    pub reports: Vec<TestReport>,
    pub stats: SuiteStats,
    pub interrupted: bool,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            1
        } else {
            self.stats.exit_code()
        }
    }
}

/// Main application orchestrator: loading, scheduling, execution, output
pub struct Application {
    pub state: AppState,
    pub configuration: RunnerConfig,
    store: GlobalStore,
    transport: Arc<dyn HttpTransport>,
}

impl Application {
    pub fn new(configuration: RunnerConfig) -> Result<Self> {
        let transport = ReqwestTransport::new().context("Failed to initialize HTTP transport")?;
        Ok(Self::with_transport(configuration, Arc::new(transport)))
    }

    pub fn with_transport(configuration: RunnerConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            state: AppState::new(),
            configuration,
            store: GlobalStore::new(),
            transport,
        }
    }

    pub fn store(&self) -> &GlobalStore {
        &self.store
    }

    /// Apply the bootstrap file and environment overrides, then validate
    pub async fn bootstrap(&mut self, path: Option<&Path>) -> Result<()> {
        if let Some(path) = path {
            let bootstrap = Bootstrap::load(path).await?;
            self.configuration.apply_bootstrap(&bootstrap);
            bootstrap.seed(&self.store)?;
            log::info!("Loaded bootstrap file {}", path.display());
        }

        self.configuration.apply_environment_overrides()?;
        self.configuration.validate()
    }

    fn strategy(&self) -> Box<dyn ExecutionStrategy> {
        match self.configuration.execution {
            ExecutionMode::Serial => Box::new(SerialExecutor::new()),
            ExecutionMode::Parallel => {
                Box::new(ParallelExecutor::new(self.configuration.concurrency))
            }
        }
    }

    /// Load, schedule, and execute every test file, then print and write reports
    pub async fn run(&self) -> Result<RunOutcome> {
        let config = &self.configuration;
        let started_at = Utc::now();
        let start = Instant::now();

        let loader = TestLoader::new(&config.tests_dir).with_subdir_filters(&config.subdirs)?;
        let suite = loader.load().await?;
        let schedule = execution::schedule(suite.tests);

        let mut rejected = suite.rejected;
        rejected.extend(schedule.rejected);

        let console = Arc::new(Mutex::new(Console::stdout(
            config.colors,
            config.verbose,
            config.immediate,
        )));
        let collected: Arc<Mutex<Vec<TestReport>>> = Arc::new(Mutex::new(Vec::new()));

        let sink: ReportSink = {
            let console = console.clone();
            let collected = collected.clone();
            Arc::new(move |report: &TestReport| {
                if let Err(e) = console.lock().progress(report) {
                    log::warn!("Failed to write progress: {}", e);
                }
                collected.lock().push(report.clone());
            })
        };

        for report in &rejected {
            console.lock().progress(report)?;
        }

        let runner = Arc::new(
            Runner::new(self.store.clone(), self.transport.clone())
                .with_base_url(config.base_url.clone())
                .with_default_timeout(config.default_timeout()),
        );
        let strategy = self.strategy();
        log::info!(
            "Running {} test files with the {} strategy",
            schedule.tests.len(),
            strategy.strategy_name()
        );

        let interrupted = tokio::select! {
            result = strategy.execute(runner, schedule.tests, sink) => {
                result?;
                false
            }
            _ = tokio::signal::ctrl_c() => {
                log::warn!("Interrupted, reporting completed tests only");
                self.state.shutdown();
                true
            }
        };

        let mut reports = rejected;
        reports.extend(std::mem::take(&mut *collected.lock()));

        let stats = SuiteStats::from_reports(&reports);

        {
            let mut console = console.lock();
            console.summary(&stats, &reports, start.elapsed())?;
            if config.show_globals {
                console.globals(&self.store.describe())?;
            }
        }

        if let Some(report_dir) = &config.report_dir {
            let writer = JsonReportWriter::new(report_dir);
            writer
                .write_all(&reports)
                .await
                .with_context(|| format!("Failed to write reports to {}", report_dir.display()))?;
            log::info!("{}", writer.summary(&stats, started_at, Utc::now()));
        }

        Ok(RunOutcome {
            reports,
            stats,
            interrupted,
        })
    }
}
