use std::path::Path;
use std::sync::OnceLock;

use chrono::NaiveDate;
use finlake_core::RunMode;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::workspace::DEFAULT_SCHED_TIME;

fn sched_time_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").ok())
        .as_ref()
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed request: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid date {value:?} for {field}: expected YYYY-MM-DD")]
    InvalidDate { field: &'static str, value: String },
    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
}

/// Run request dropped into the watch folder.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RunRequest {
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub sched_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequest {
    pub job_id: String,
    pub mode: RunMode,
    pub sched_time: String,
    /// Malformed `sched_time` that was replaced by the default.
    pub rejected_sched_time: Option<String>,
}

impl RunRequest {
    pub fn load(path: &Path) -> Result<Self, RequestError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Live when the request covers exactly `today`, historical otherwise.
    pub fn mode(&self, today: NaiveDate) -> Result<RunMode, RequestError> {
        let start = parse_request_date("start_date", &self.start_date)?;
        let end = parse_request_date("end_date", &self.end_date)?;
        if start > end {
            return Err(RequestError::InvertedRange { start, end });
        }

        if start == today && end == today {
            Ok(RunMode::Live { date: today })
        } else {
            Ok(RunMode::Historical { start, end })
        }
    }

    /// `configured_sched_time` (from `finlake.toml`) applies when the request
    /// carries no usable `sched_time`.
    pub fn resolve(
        &self,
        today: NaiveDate,
        configured_sched_time: &str,
    ) -> Result<ResolvedRequest, RequestError> {
        let mode = self.mode(today)?;
        let job_id = self
            .job_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let sched_time = sched_time_or(self.sched_time.as_deref(), configured_sched_time);
        let rejected_sched_time = self
            .sched_time
            .clone()
            .filter(|requested| *requested != sched_time);

        Ok(ResolvedRequest {
            job_id,
            mode,
            sched_time,
            rejected_sched_time,
        })
    }
}

fn parse_request_date(field: &'static str, value: &str) -> Result<NaiveDate, RequestError> {
    let invalid = || RequestError::InvalidDate {
        field,
        value: value.to_string(),
    };
    if value.len() != 10 {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid())
}

pub fn is_valid_sched_time(value: &str) -> bool {
    sched_time_pattern().is_some_and(|pattern| pattern.is_match(value))
}

/// `value` when it is `HH:MM` in 24-hour form, else `fallback`, else `10:30`.
pub fn sched_time_or(value: Option<&str>, fallback: &str) -> String {
    value
        .filter(|value| is_valid_sched_time(value))
        .or(Some(fallback).filter(|fallback| is_valid_sched_time(fallback)))
        .unwrap_or(DEFAULT_SCHED_TIME)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, 25).expect("date")
    }

    fn request(start: &str, end: &str) -> RunRequest {
        RunRequest {
            start_date: start.to_string(),
            end_date: end.to_string(),
            job_id: None,
            sched_time: None,
        }
    }

    #[test]
    fn today_only_requests_run_live() {
        let resolved = request("2024-11-25", "2024-11-25")
            .resolve(today(), DEFAULT_SCHED_TIME)
            .expect("resolve");
        assert_eq!(resolved.mode, RunMode::Live { date: today() });
        assert_eq!(resolved.sched_time, "10:30");
        assert_eq!(resolved.rejected_sched_time, None);
        assert!(Uuid::parse_str(&resolved.job_id).is_ok());
    }

    #[test]
    fn past_ranges_run_historically() {
        let mut req = request("2024-11-01", "2024-11-25");
        req.job_id = Some("job-42".to_string());
        req.sched_time = Some("23:59".to_string());
        let resolved = req.resolve(today(), DEFAULT_SCHED_TIME).expect("resolve");
        assert!(!resolved.mode.is_live());
        assert_eq!(resolved.job_id, "job-42");
        assert_eq!(resolved.sched_time, "23:59");
    }

    #[test]
    fn malformed_dates_and_inverted_ranges_are_rejected() {
        assert!(matches!(
            request("2024/11/01", "2024-11-25").resolve(today(), DEFAULT_SCHED_TIME),
            Err(RequestError::InvalidDate { field: "start_date", .. })
        ));
        assert!(matches!(
            request("2024-11-01", "2024-11-5").resolve(today(), DEFAULT_SCHED_TIME),
            Err(RequestError::InvalidDate { field: "end_date", .. })
        ));
        assert!(matches!(
            request("2024-11-20", "2024-11-01").resolve(today(), DEFAULT_SCHED_TIME),
            Err(RequestError::InvertedRange { .. })
        ));
    }

    #[test]
    fn invalid_sched_time_falls_back() {
        assert_eq!(sched_time_or(Some("24:00"), DEFAULT_SCHED_TIME), "10:30");
        assert_eq!(sched_time_or(Some("9:30"), DEFAULT_SCHED_TIME), "10:30");
        assert_eq!(sched_time_or(Some("09:30"), DEFAULT_SCHED_TIME), "09:30");
        assert_eq!(sched_time_or(None, "25:00"), "10:30");

        let mut req = request("2024-11-01", "2024-11-02");
        req.sched_time = Some("25:61".to_string());
        let resolved = req.resolve(today(), DEFAULT_SCHED_TIME).expect("resolve");
        assert_eq!(resolved.sched_time, "10:30");
        assert_eq!(resolved.rejected_sched_time.as_deref(), Some("25:61"));
    }

    #[test]
    fn request_files_are_parsed() {
        let path = std::env::temp_dir().join(format!("finlake_request_{}.json", Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"{"start_date": "2024-11-01", "end_date": "2024-11-02", "sched_time": "7:00"}"#,
        )
        .expect("write request");
        let req = RunRequest::load(&path).expect("load");
        assert_eq!(req.job_id, None);
        assert_eq!(req.sched_time.as_deref(), Some("7:00"));
    }

    #[test]
    fn configured_sched_time_replaces_the_builtin_default() {
        let resolved = request("2024-11-01", "2024-11-02")
            .resolve(today(), "08:45")
            .expect("resolve");
        assert_eq!(resolved.sched_time, "08:45");
        assert_eq!(resolved.rejected_sched_time, None);

        let mut req = request("2024-11-01", "2024-11-02");
        req.sched_time = Some("7:00".to_string());
        let resolved = req.resolve(today(), "08:45").expect("resolve");
        assert_eq!(resolved.sched_time, "08:45");
        assert_eq!(resolved.rejected_sched_time.as_deref(), Some("7:00"));

        req.sched_time = Some("06:15".to_string());
        let resolved = req.resolve(today(), "08:45").expect("resolve");
        assert_eq!(resolved.sched_time, "06:15");
    }
}
