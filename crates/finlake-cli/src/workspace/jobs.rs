use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::atomic::write_bytes_atomic;
use super::{WorkspaceError, WorkspaceResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed { execution_dir: PathBuf },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobRecord {
    pub job_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(flatten)]
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Job table persisted as `jobs.json`. Records are never evicted.
#[derive(Debug)]
pub struct JobRegistry {
    path: PathBuf,
    jobs: BTreeMap<String, JobRecord>,
}

impl JobRegistry {
    pub fn open(path: impl Into<PathBuf>) -> WorkspaceResult<Self> {
        let path = path.into();
        let jobs = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, jobs })
    }

    /// Register a job as processing. Reusing an id restarts that job.
    pub fn insert(
        &mut self,
        job_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> WorkspaceResult<&JobRecord> {
        let now = Utc::now();
        let record = JobRecord {
            job_id: job_id.to_string(),
            start_date,
            end_date,
            status: JobStatus::Processing,
            created_at: now,
            updated_at: now,
        };
        self.jobs.insert(job_id.to_string(), record);
        self.persist()?;
        self.get(job_id)
            .ok_or_else(|| WorkspaceError::Invalid(format!("job {job_id} was not stored")))
    }

    pub fn update(&mut self, job_id: &str, status: JobStatus) -> WorkspaceResult<()> {
        let record = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| WorkspaceError::Invalid(format!("unknown job {job_id}")))?;
        record.status = status;
        record.updated_at = Utc::now();
        self.persist()
    }

    pub fn get(&self, job_id: &str) -> Option<&JobRecord> {
        self.jobs.get(job_id)
    }

    pub fn list(&self) -> impl Iterator<Item = &JobRecord> {
        self.jobs.values()
    }

    fn persist(&self) -> WorkspaceResult<()> {
        let data = serde_json::to_vec_pretty(&self.jobs)?;
        write_bytes_atomic(&self.path, &data)
    }
}
