//! Test outcome reporting
//!
//! Every check made while running a file goes through a [`Reporter`], which
//! classifies it and keeps the counters that make up the run [`Summary`].

use serde::Serialize;
use std::fmt;

/// How a single check was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    /// Failed as expected by a `todo`
    Todo,
    /// Failed as expected by a `bug`
    Bug,
    Fail,
}

/// Counters for one or more test files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub todo: u32,
    pub bug: u32,
}

impl Summary {
    /// Whether nothing failed
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Adds the counters of another summary
    pub fn merge(&mut self, other: &Summary) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.todo += other.todo;
        self.bug += other.bug;
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} skipped, {} todo, {} bug",
            self.passed, self.failed, self.skipped, self.todo, self.bug
        )
    }
}

/// Classifies and counts the checks of one test file
#[derive(Debug)]
pub struct Reporter {
    file: String,
    summary: Summary,
}

impl Reporter {
    /// Creates a reporter for the named file
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            summary: Summary::default(),
        }
    }

    /// Records the result of a check
    ///
    /// A failing check is tolerated under `todo` or `bug`; a passing check
    /// under either is a failure, since the expectation is out of date.
    ///
    /// # Arguments
    /// * `ok` - Whether the check passed
    /// * `todo` - Whether the check is expected to fail for a known missing feature
    /// * `bug` - Whether the check is expected to fail for a known bug
    /// * `line` - Line of the directive being checked
    /// * `message` - Description of the failure
    pub fn check(&mut self, ok: bool, todo: bool, bug: bool, line: usize, message: impl fmt::Display) -> Outcome {
        let file = &self.file;
        let outcome = match (ok, bug, todo) {
            (true, false, false) => Outcome::Pass,
            (true, true, _) => {
                tracing::error!("{file}:{line}: Bug fixed: {message}");
                Outcome::Fail
            }
            (true, false, true) => {
                tracing::error!("{file}:{line}: Todo succeeded: {message}");
                Outcome::Fail
            }
            (false, true, _) => {
                tracing::warn!("{file}:{line}: Bug: {message}");
                Outcome::Bug
            }
            (false, false, true) => {
                tracing::warn!("{file}:{line}: Todo: {message}");
                Outcome::Todo
            }
            (false, false, false) => {
                tracing::error!("{file}:{line}: Test failed: {message}");
                Outcome::Fail
            }
        };

        match outcome {
            Outcome::Pass => self.summary.passed += 1,
            Outcome::Todo => self.summary.todo += 1,
            Outcome::Bug => self.summary.bug += 1,
            Outcome::Fail => self.summary.failed += 1,
        }
        outcome
    }

    /// Records a skipped test
    pub fn skip(&mut self, line: usize, reason: impl fmt::Display) {
        tracing::info!("{}:{line}: Test skipped: {reason}", self.file);
        self.summary.skipped += 1;
    }

    /// Counters so far
    pub fn summary(&self) -> Summary {
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_classification() {
        let mut reporter = Reporter::new("test.shader_test");
        assert_eq!(reporter.check(true, false, false, 1, "ok"), Outcome::Pass);
        assert_eq!(reporter.check(false, false, false, 2, "mismatch"), Outcome::Fail);
        assert_eq!(reporter.check(false, true, false, 3, "mismatch"), Outcome::Todo);
        assert_eq!(reporter.check(true, true, false, 4, "ok"), Outcome::Fail);
        assert_eq!(reporter.check(false, true, true, 5, "mismatch"), Outcome::Bug);
        assert_eq!(reporter.check(true, false, true, 6, "ok"), Outcome::Fail);
        reporter.skip(7, "no float64");

        assert_eq!(
            reporter.summary(),
            Summary {
                passed: 1,
                failed: 3,
                skipped: 1,
                todo: 1,
                bug: 1,
            }
        );
        assert!(!reporter.summary().is_success());
    }

    #[test]
    fn test_summary_merge() {
        let mut total = Summary::default();
        total.merge(&Summary {
            passed: 2,
            skipped: 1,
            ..Default::default()
        });
        total.merge(&Summary { passed: 1, ..Default::default() });
        assert_eq!(total.passed, 3);
        assert_eq!(total.skipped, 1);
        assert!(total.is_success());
        assert_eq!(total.to_string(), "3 passed, 0 failed, 1 skipped, 0 todo, 0 bug");
    }
}
