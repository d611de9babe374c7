use clap::Parser;
use std::path::PathBuf;

use crate::configuration::{ExecutionMode, RunnerConfig};

/// Declarative HTTP API test runner
#[derive(Parser, Debug)]
#[command(name = "rulerunner")]
#[command(about = "Runs JSON described HTTP API tests and validates responses with rules")]
#[command(version = crate::VERSION)]
pub struct Cli {
    /// Directory containing the JSON test files
    #[arg(short, long)]
    pub dir: PathBuf,

    /// Subdirectory pattern, may be repeated; patterns are OR combined
    #[arg(short, long = "subdir")]
    pub subdir: Vec<String>,

    /// Bootstrap file (YAML or JSON) seeding globals, base URL and timeout
    #[arg(short, long)]
    pub bootstrap: Option<PathBuf>,

    /// Print one line per test case
    #[arg(short, long)]
    pub verbose: bool,

    /// Directory receiving one JSON report per executed case
    #[arg(short, long)]
    pub report: Option<PathBuf>,

    /// Print the globals once the run is finished
    #[arg(long)]
    pub show_globals: bool,

    /// Debug logging
    #[arg(long)]
    pub debug: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_colors: bool,

    /// Print errors as soon as they happen
    #[arg(short, long)]
    pub immediate: bool,

    /// Run independent test files concurrently
    #[arg(long)]
    pub parallel: bool,

    /// Maximum concurrent test files in parallel mode
    #[arg(short = 'j', long, default_value_t = 4)]
    pub jobs: usize,
}

impl Cli {
    pub fn to_config(&self) -> RunnerConfig {
        RunnerConfig {
            tests_dir: self.dir.clone(),
            subdirs: self.subdir.clone(),
            report_dir: self.report.clone(),
            execution: if self.parallel {
                ExecutionMode::Parallel
            } else {
                ExecutionMode::Serial
            },
            concurrency: self.jobs,
            verbose: self.verbose,
            debug: self.debug,
            colors: !self.no_colors,
            immediate: self.immediate,
            show_globals: self.show_globals,
            ..RunnerConfig::default()
        }
    }
}
