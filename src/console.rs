//! Terminal output: progress characters, the run summary and the globals dump.

use std::io::{self, Stdout, Write};
use std::time::Duration;

use crate::reporting::{SuiteStats, TestReport, TestStatus};

/// Progress characters per line
pub const LINE_WIDTH: usize = 79;

const RESET: &str = "\x1b[0m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const MAGENTA: &str = "\x1b[35m";

fn color_of(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Success => GREEN,
        TestStatus::Failure => RED,
        TestStatus::Error => MAGENTA,
        TestStatus::Ignore | TestStatus::Incomplete => YELLOW,
    }
}

pub struct Console<W: Write = Stdout> {
    out: W,
    colors: bool,
    verbose: bool,
    immediate: bool,
    column: usize,
}

impl Console<Stdout> {
    pub fn stdout(colors: bool, verbose: bool, immediate: bool) -> Self {
        Self::new(io::stdout(), colors, verbose, immediate)
    }
}

impl<W: Write> Console<W> {
    pub fn new(out: W, colors: bool, verbose: bool, immediate: bool) -> Self {
        Self {
            out,
            colors,
            verbose,
            immediate,
            column: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, text: &str, color: &str) -> String {
        if self.colors {
            format!("{}{}{}", color, text, RESET)
        } else {
            text.to_string()
        }
    }

    /// Record one finished case
    pub fn progress(&mut self, report: &TestReport) -> io::Result<()> {
        if self.verbose {
            let status = self.paint(report.status.as_str(), color_of(report.status));
            match &report.description {
                Some(description) => writeln!(
                    self.out,
                    "{} {} [{}] {}",
                    status, report.file, report.index, description
                )?,
                None => writeln!(self.out, "{} {} [{}]", status, report.file, report.index)?,
            }
        } else {
            let mark = self.paint(
                &report.status.progress_char().to_string(),
                color_of(report.status),
            );
            write!(self.out, "{}", mark)?;
            self.column += 1;
            if self.column >= LINE_WIDTH {
                writeln!(self.out)?;
                self.column = 0;
            }
        }

        if self.immediate && matches!(report.status, TestStatus::Failure | TestStatus::Error) {
            if self.column > 0 {
                writeln!(self.out)?;
                self.column = 0;
            }
            self.write_messages(report)?;
        }

        self.out.flush()
    }

    fn write_messages(&mut self, report: &TestReport) -> io::Result<()> {
        let header = format!("{} {} [{}]", report.status.as_str(), report.file, report.index);
        writeln!(self.out, "{}", self.paint(&header, color_of(report.status)))?;
        for message in report.messages() {
            writeln!(self.out, "  {}", message)?;
        }
        Ok(())
    }

    /// Statistics, then the failure messages unless they were already printed
    pub fn summary(
        &mut self,
        stats: &SuiteStats,
        reports: &[TestReport],
        elapsed: Duration,
    ) -> io::Result<()> {
        if self.column > 0 {
            writeln!(self.out)?;
            self.column = 0;
        }

        writeln!(self.out)?;
        writeln!(
            self.out,
            "Tests: {}, Success: {}, Failure: {}, Error: {}, Ignore: {}, Incomplete: {} \
             (unresolved globals: {})",
            stats.tests,
            self.paint(&stats.success.to_string(), GREEN),
            self.paint(&stats.failure.to_string(), RED),
            self.paint(&stats.error.to_string(), MAGENTA),
            stats.ignore,
            stats.incomplete,
            stats.unresolved,
        )?;
        writeln!(self.out, "Time: {:.3}s", elapsed.as_secs_f64())?;

        if !self.immediate {
            let failed = reports
                .iter()
                .filter(|r| matches!(r.status, TestStatus::Failure | TestStatus::Error));
            for report in failed {
                writeln!(self.out)?;
                self.write_messages(report)?;
            }
        }

        self.out.flush()
    }

    /// `"key": (type) value` lines
    pub fn globals(&mut self, lines: &[String]) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "Globals:")?;
        for line in lines {
            writeln!(self.out, "{}", line)?;
        }
        self.out.flush()
    }
}
