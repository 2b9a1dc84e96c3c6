use std::path::{Path, PathBuf};

use chrono::Local;
use rusqlite::{Connection, params};

use crate::error::Result;
use crate::job::{JobDescriptor, OutputLayout};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionStatus {
    Submitted,
    DryRun,
    Failed(String),
}

impl SubmissionStatus {
    fn as_str(&self) -> &str {
        match self {
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::DryRun => "dry-run",
            SubmissionStatus::Failed(_) => "failed",
        }
    }

    fn message(&self) -> Option<&str> {
        match self {
            SubmissionStatus::Failed(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub run_index: usize,
    pub storm_name: String,
    pub region: String,
    pub job_name: String,
    pub storm_file: PathBuf,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub log_path: PathBuf,
    pub status: String,
    pub message: Option<String>,
}

/// SQLite-backed ledger of every job handed to the scheduler: identity,
/// input data and output location.
pub struct JobRegistry {
    conn: Connection,
}

impl JobRegistry {
    pub fn open(path: &Path) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS jobs (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                run_index     INTEGER NOT NULL,
                storm_name    TEXT NOT NULL,
                region        TEXT NOT NULL,
                wind_model    TEXT NOT NULL,
                amr_level     INTEGER NOT NULL,
                job_name      TEXT NOT NULL,
                storm_file    TEXT NOT NULL,
                data_dir      TEXT NOT NULL,
                output_dir    TEXT NOT NULL,
                log_path      TEXT NOT NULL,
                script_path   TEXT NOT NULL,
                restart       INTEGER NOT NULL,
                status        TEXT NOT NULL,
                message       TEXT,
                recorded_at   TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS jobs_run_index ON jobs (run_index);",
        )?;
        Ok(JobRegistry { conn })
    }

    pub fn record(
        &self,
        job: &JobDescriptor,
        layout: &OutputLayout,
        status: &SubmissionStatus,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO jobs (run_index, storm_name, region, wind_model, amr_level, job_name,
                               storm_file, data_dir, output_dir, log_path, script_path,
                               restart, status, message, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                job.run_index as i64,
                job.storm_name(),
                job.region,
                job.wind_model.as_str(),
                job.refinement_level,
                job.name,
                job.storm_file.display().to_string(),
                layout.data_dir.display().to_string(),
                layout.output_dir.display().to_string(),
                layout.log_path.display().to_string(),
                layout.script_path.display().to_string(),
                job.is_restart(),
                status.as_str(),
                status.message(),
                Local::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn records(&self) -> Result<Vec<JobRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_index, storm_name, region, job_name, storm_file, data_dir,
                    output_dir, log_path, status, message
             FROM jobs ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(JobRecord {
                run_index: row.get::<_, i64>(0)? as usize,
                storm_name: row.get(1)?,
                region: row.get(2)?,
                job_name: row.get(3)?,
                storm_file: PathBuf::from(row.get::<_, String>(4)?),
                data_dir: PathBuf::from(row.get::<_, String>(5)?),
                output_dir: PathBuf::from(row.get::<_, String>(6)?),
                log_path: PathBuf::from(row.get::<_, String>(7)?),
                status: row.get(8)?,
                message: row.get(9)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobParams;
    use crate::region::RegionProfile;
    use crate::solver::WindModel;
    use crate::track::tests::hourly_track;
    use std::sync::Arc;

    #[test]
    fn records_identity_inputs_and_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let params = JobParams::new(
            WindModel::DeMaria,
            2,
            Arc::new(RegionProfile::mumbai()),
            dir.path(),
        );
        let track = hourly_track("Mumbai_5", &[30.0, 31.0]);
        let job = JobDescriptor::build(5, track, WindModel::DeMaria, &params).unwrap();
        let layout = job.layout(Path::new("/scratch"));

        let registry = JobRegistry::open_in_memory().unwrap();
        registry
            .record(&job, &layout, &SubmissionStatus::Submitted)
            .unwrap();
        registry
            .record(&job, &layout, &SubmissionStatus::Failed("exit status: 1".into()))
            .unwrap();

        let records = registry.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].run_index, 5);
        assert_eq!(records[0].storm_name, "Mumbai_5");
        assert_eq!(records[0].job_name, "DeMaria-amr2");
        assert_eq!(records[0].storm_file, dir.path().join("Mumbai_0005.storm"));
        assert_eq!(records[0].output_dir, layout.output_dir);
        assert_eq!(records[0].status, "submitted");
        assert_eq!(records[1].message.as_deref(), Some("exit status: 1"));
    }
}
