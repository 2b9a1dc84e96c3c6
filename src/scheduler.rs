//! Boundary to the cluster batch system. A submission blocks only until the
//! submit command acknowledges it; job completion is never observed.

use std::fs::File;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub prefix: String,
    pub script_path: PathBuf,
    pub log_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement {
    pub exit_code: Option<i32>,
}

pub trait Scheduler {
    /// Hand one script to the batch system. At most once; never retried.
    fn submit(&mut self, request: &SubmissionRequest) -> Result<Acknowledgement>;

    fn is_dry_run(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct CommandScheduler {
    program: String,
    args: Vec<String>,
}

impl CommandScheduler {
    /// `command` is split on whitespace; the first word is the program.
    pub fn new(command: &str) -> Result<Self> {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| Error::config("submit command is empty"))?;
        Ok(CommandScheduler {
            program,
            args: words.collect(),
        })
    }
}

impl Scheduler for CommandScheduler {
    fn submit(&mut self, request: &SubmissionRequest) -> Result<Acknowledgement> {
        let log = File::create(&request.log_path).map_err(|e| Error::fs(&request.log_path, e))?;

        debug!(
            program = %self.program,
            script = %request.script_path.display(),
            "invoking submit command"
        );
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(&request.script_path)
            .stdin(Stdio::null())
            .stdout(log)
            .status()
            .map_err(|e| Error::Submission {
                script: request.script_path.clone(),
                status: format!("could not run {}: {e}", self.program),
            })?;

        if !status.success() {
            return Err(Error::Submission {
                script: request.script_path.clone(),
                status: status.to_string(),
            });
        }
        info!(prefix = %request.prefix, "submission acknowledged");
        Ok(Acknowledgement {
            exit_code: status.code(),
        })
    }
}

#[derive(Debug, Default)]
pub struct DryRunScheduler {
    pub requests: Vec<SubmissionRequest>,
}

impl Scheduler for DryRunScheduler {
    fn submit(&mut self, request: &SubmissionRequest) -> Result<Acknowledgement> {
        info!(
            prefix = %request.prefix,
            script = %request.script_path.display(),
            "dry run: not submitting"
        );
        self.requests.push(request.clone());
        Ok(Acknowledgement { exit_code: None })
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(dir: &std::path::Path) -> SubmissionRequest {
        let script_path = dir.join("0000_run.sh");
        std::fs::write(&script_path, "#!/bin/sh\n").unwrap();
        SubmissionRequest {
            prefix: "0000".to_string(),
            script_path,
            log_path: dir.join("0000_log.txt"),
        }
    }

    #[test]
    fn stdout_is_redirected_to_log() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path());
        let mut scheduler = CommandScheduler::new("echo Submitted batch job").unwrap();

        let ack = scheduler.submit(&req).unwrap();
        assert_eq!(ack.exit_code, Some(0));
        let log = std::fs::read_to_string(&req.log_path).unwrap();
        assert_eq!(
            log.trim(),
            format!("Submitted batch job {}", req.script_path.display())
        );
    }

    #[test]
    fn non_zero_exit_is_a_submission_error() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path());
        let err = CommandScheduler::new("false")
            .unwrap()
            .submit(&req)
            .unwrap_err();
        assert!(matches!(err, Error::Submission { .. }));
    }

    #[test]
    fn missing_program_is_a_submission_error() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path());
        let err = CommandScheduler::new("surge-rs-no-such-sbatch")
            .unwrap()
            .submit(&req)
            .unwrap_err();
        assert!(matches!(err, Error::Submission { .. }));
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandScheduler::new("  ").is_err());
    }
}
