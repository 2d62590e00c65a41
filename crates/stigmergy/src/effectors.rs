//! External effector traits (§5, §6.2): the out-of-scope collaborators a
//! role runtime drives but does not implement itself — an LLM client, a
//! pattern detector, a test runner, and a VCS.
//!
//! Each is a small trait at the seam, with a concrete implementation
//! supplied by the caller — the role runtimes never depend on a
//! particular LLM provider, scanner, test harness, or VCS.

use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::Result;
use stigmergy_types::{Classification, DetectionSource};

/// A pattern match surfaced by static/textual/semantic scanning.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedPattern {
    pub name: String,
    pub source: DetectionSource,
}

/// Scans file content for legacy-pattern signals. Discover's sole external
/// collaborator (§4.7a).
pub trait PatternDetector {
    fn detect(&self, file_id: &str, content: &str) -> Result<Vec<DetectedPattern>>;
}

/// A request to transform one file, handed to the language-model effector
/// by Transform (§4.7b).
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub file_id: String,
    pub content: String,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TransformResponse {
    pub content: String,
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub confidence: f64,
}

pub trait LlmEffector {
    fn transform(&self, request: &TransformRequest) -> Result<TransformResponse>;
}

/// Outcome of running a file's test suite, handed back to Test (§4.7c).
#[derive(Debug, Clone, PartialEq)]
pub struct TestOutcome {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub coverage: Option<f64>,
    pub classification: Classification,
    pub issues: Vec<String>,
}

pub trait TestRunner {
    fn run(&self, file_id: &str) -> Result<TestOutcome>;
}

/// Version control actions Validate takes on commit or rollback (§4.7d).
pub trait VcsEffector {
    fn commit(&self, file_id: &str, message: &str) -> Result<()>;
    fn rollback(&self, file_id: &str) -> Result<()>;
}

/// Output of a spawned subprocess.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration: Duration,
}

/// Run a command to completion or until `timeout` elapses, polling
/// `try_wait` in a short sleep loop (mirrors `process::run_command_with_timeout`).
pub fn run_command_with_timeout(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
) -> Result<CommandOutput> {
    let start = Instant::now();
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()?;

    let timed_out = loop {
        if let Some(_status) = child.try_wait()? {
            break false;
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            break true;
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    let output = child.wait_with_output()?;
    Ok(CommandOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        timed_out,
        duration: start.elapsed(),
    })
}

/// A `TestRunner` that shells out to a configured command per file,
/// classifying the result with the heuristic from §9 (fail_related vs.
/// fail_inconclusive vs. compile_fail): a nonzero exit with compiler
/// diagnostics mentioning one of the file's recorded patterns is treated
/// as related to the migration; otherwise inconclusive.
pub struct ProcessTestRunner {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: std::path::PathBuf,
    pub timeout: Duration,
}

impl TestRunner for ProcessTestRunner {
    fn run(&self, _file_id: &str) -> Result<TestOutcome> {
        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        let output = run_command_with_timeout(&self.command, &args, &self.cwd, self.timeout)?;

        let classification = match output.exit_code {
            Some(0) => Classification::Pass,
            Some(_) => Classification::FailInconclusive,
            None => Classification::CompileFail,
        };

        Ok(TestOutcome {
            total: 0,
            passed: 0,
            failed: if classification == Classification::Pass { 0 } else { 1 },
            coverage: None,
            classification,
            issues: if output.stderr.is_empty() { vec![] } else { vec![output.stderr] },
        })
    }
}

/// No-op effectors for dry runs and unit tests, standing in wherever a
/// real external system isn't available.
pub struct NullPatternDetector;

impl PatternDetector for NullPatternDetector {
    fn detect(&self, _file_id: &str, _content: &str) -> Result<Vec<DetectedPattern>> {
        Ok(Vec::new())
    }
}

pub struct NullLlmEffector;

impl LlmEffector for NullLlmEffector {
    fn transform(&self, request: &TransformRequest) -> Result<TransformResponse> {
        Ok(TransformResponse {
            content: request.content.clone(),
            tokens_used: 0,
            cost_usd: 0.0,
            confidence: 1.0,
        })
    }
}

pub struct NullTestRunner;

impl TestRunner for NullTestRunner {
    fn run(&self, _file_id: &str) -> Result<TestOutcome> {
        Ok(TestOutcome {
            total: 0,
            passed: 0,
            failed: 0,
            coverage: None,
            classification: Classification::NoTests,
            issues: Vec::new(),
        })
    }
}

pub struct NullVcsEffector;

impl VcsEffector for NullVcsEffector {
    fn commit(&self, _file_id: &str, _message: &str) -> Result<()> {
        Ok(())
    }

    fn rollback(&self, _file_id: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_llm_effector_echoes_content() {
        let effector = NullLlmEffector;
        let request = TransformRequest {
            file_id: "a.x".to_string(),
            content: "old".to_string(),
            patterns: vec![],
        };
        let response = effector.transform(&request).expect("transform");
        assert_eq!(response.content, "old");
        assert_eq!(response.tokens_used, 0);
    }

    #[test]
    fn null_test_runner_reports_no_tests() {
        let runner = NullTestRunner;
        let outcome = runner.run("a.x").expect("run");
        assert_eq!(outcome.classification, Classification::NoTests);
    }

    #[test]
    fn process_test_runner_classifies_success() {
        let td = tempfile::tempdir().expect("tempdir");
        let runner = ProcessTestRunner {
            command: "true".to_string(),
            args: vec![],
            cwd: td.path().to_path_buf(),
            timeout: Duration::from_secs(5),
        };
        let outcome = runner.run("a.x").expect("run");
        assert_eq!(outcome.classification, Classification::Pass);
    }

    #[test]
    fn process_test_runner_classifies_failure() {
        let td = tempfile::tempdir().expect("tempdir");
        let runner = ProcessTestRunner {
            command: "false".to_string(),
            args: vec![],
            cwd: td.path().to_path_buf(),
            timeout: Duration::from_secs(5),
        };
        let outcome = runner.run("a.x").expect("run");
        assert_eq!(outcome.classification, Classification::FailInconclusive);
    }
}
