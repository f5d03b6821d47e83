//! Mapping between `jobs` rows and model types.

use chrono::{DateTime, Utc};

use mforge_models::{InputParams, Job, JobId, JobStatus, JobType, KeyingSettings};

use crate::error::{StoreError, StoreResult};

/// Raw `jobs` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: i64,
    pub job_type: String,
    pub status: String,
    pub created_at: i64,
    pub priority: i64,
    pub prompt: Option<String>,
    pub input_params: String,
    pub keying_settings: Option<String>,
    pub result_ref: Option<String>,
    pub keyed_result_ref: Option<String>,
    pub error_message: Option<String>,
    pub parent_job_id: Option<i64>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> StoreResult<Self> {
        let job_type: JobType = row
            .job_type
            .parse()
            .map_err(|e| StoreError::corrupt(format!("job {}: {}", row.id, e)))?;
        let status: JobStatus = row
            .status
            .parse()
            .map_err(|e| StoreError::corrupt(format!("job {}: {}", row.id, e)))?;
        let created_at = micros_to_datetime(row.created_at).ok_or_else(|| {
            StoreError::corrupt(format!("job {}: bad created_at {}", row.id, row.created_at))
        })?;

        let input_params: InputParams = if row.input_params.trim().is_empty() {
            InputParams::new()
        } else {
            serde_json::from_str(&row.input_params)?
        };

        let keying_settings = match row.keying_settings.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(serde_json::from_str::<KeyingSettings>(raw)?),
            _ => None,
        };

        Ok(Job {
            id: JobId(row.id),
            job_type,
            status,
            created_at,
            priority: row.priority,
            prompt: row.prompt,
            input_params,
            keying_settings,
            result_ref: row.result_ref,
            keyed_result_ref: row.keyed_result_ref,
            error_message: row.error_message,
            parent_job_id: row.parent_job_id.map(JobId),
        })
    }
}

/// Convert a batch of rows, failing on the first corrupt one.
pub fn rows_to_jobs(rows: Vec<JobRow>) -> StoreResult<Vec<Job>> {
    rows.into_iter().map(Job::try_from).collect()
}

pub fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

pub fn micros_to_datetime(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
}

/// Serialize keying settings for the `keying_settings` column.
pub fn settings_json(settings: &KeyingSettings) -> StoreResult<String> {
    Ok(serde_json::to_string(settings)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> JobRow {
        JobRow {
            id: 1,
            job_type: "animation".into(),
            status: "queued".into(),
            created_at: 1_700_000_000_000_000,
            priority: 0,
            prompt: Some("spin".into()),
            input_params: r#"{"image_url": "/static/library/a.png"}"#.into(),
            keying_settings: None,
            result_ref: None,
            keyed_result_ref: None,
            error_message: None,
            parent_job_id: Some(9),
        }
    }

    #[test]
    fn test_row_to_job() {
        let job = Job::try_from(row()).unwrap();
        assert_eq!(job.job_type, JobType::Animation);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.parent_job_id, Some(JobId(9)));
        assert_eq!(job.input_params.str("image_url"), Some("/static/library/a.png"));
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        let mut r = row();
        r.status = "stale".into();
        assert!(matches!(Job::try_from(r), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_blank_settings_are_none() {
        let mut r = row();
        r.keying_settings = Some("  ".into());
        r.input_params = String::new();
        let job = Job::try_from(r).unwrap();
        assert!(job.keying_settings.is_none());
        assert!(job.input_params.0.is_empty());
    }
}
