//! Terminal-status rule table.
//!
//! Maps a claimed job and its handler result to the write that finishes it.
//! Rules are evaluated in order:
//!
//! 1. handler error: `failed` with the error text
//! 2. keying lane: `completed` with `keyed_result_ref`
//! 3. boomerang parent setup: the status the handler returned
//! 4. animation or stitch child of a boomerang: `completed`; a stitch also
//!    completes its parent with the same result. A child whose parent row
//!    could not be read counts as a boomerang child.
//! 5. otherwise: `pending_review` for reviewable types, else `completed`

use mforge_models::{ClaimLane, Job, JobId, JobStatus, JobType, StatusWrite};

use crate::handlers::HandlerOutput;

/// What the executor learned about a claimed job's parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentLookup {
    NoParent,
    Found(JobType),
    /// The parent row could not be read
    Unavailable,
}

impl ParentLookup {
    fn is_boomerang_for(self, job_type: JobType) -> bool {
        match self {
            Self::Found(parent_type) => parent_type == JobType::BoomerangAutomation,
            // Reviewing a boomerang child would strand its parent
            Self::Unavailable => matches!(job_type, JobType::Animation | JobType::VideoStitching),
            Self::NoParent => false,
        }
    }
}

/// What to write once a handler has finished.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub write: StatusWrite,
    /// Parent to complete with the given result, after the job's own write
    pub complete_parent: Option<(JobId, String)>,
}

impl Outcome {
    fn job_only(write: StatusWrite) -> Self {
        Self {
            write,
            complete_parent: None,
        }
    }
}

/// Apply the rule table.
///
/// `parent` is what the lookup of the job's parent row returned.
pub fn terminal_outcome(
    lane: ClaimLane,
    job: &Job,
    parent: ParentLookup,
    result: Result<HandlerOutput, String>,
) -> Outcome {
    let output = match result {
        Ok(output) => output,
        Err(message) => return Outcome::job_only(StatusWrite::failed(message)),
    };

    if lane == ClaimLane::Keying {
        return Outcome::job_only(match output {
            HandlerOutput::Result(keyed) => StatusWrite::keyed(keyed),
            HandlerOutput::Status(_) => StatusWrite::failed("Keying produced no output"),
        });
    }

    let result_ref = match output {
        HandlerOutput::Status(status) => return Outcome::job_only(StatusWrite::status(status)),
        HandlerOutput::Result(result_ref) => result_ref,
    };

    let boomerang_child = job.parent_job_id.is_some() && parent.is_boomerang_for(job.job_type);
    match (job.job_type, boomerang_child, job.parent_job_id) {
        (JobType::VideoStitching, true, Some(parent)) => Outcome {
            write: StatusWrite::with_result(JobStatus::Completed, result_ref.clone()),
            complete_parent: Some((parent, result_ref)),
        },
        (JobType::Animation, true, _) => {
            Outcome::job_only(StatusWrite::with_result(JobStatus::Completed, result_ref))
        }
        (job_type, _, _) if job_type.needs_review() => {
            Outcome::job_only(StatusWrite::with_result(JobStatus::PendingReview, result_ref))
        }
        _ => Outcome::job_only(StatusWrite::with_result(JobStatus::Completed, result_ref)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mforge_models::InputParams;

    fn job(job_type: JobType, parent: Option<i64>) -> Job {
        Job {
            id: JobId(5),
            job_type,
            status: JobStatus::Processing,
            created_at: Utc::now(),
            priority: 0,
            prompt: None,
            input_params: InputParams::new(),
            keying_settings: None,
            result_ref: Some("/static/src.mp4".into()),
            keyed_result_ref: None,
            error_message: None,
            parent_job_id: parent.map(JobId),
        }
    }

    fn ok(r: &str) -> Result<HandlerOutput, String> {
        Ok(HandlerOutput::Result(r.to_string()))
    }

    #[test]
    fn test_error_wins() {
        let out = terminal_outcome(
            ClaimLane::Keying,
            &job(JobType::Animation, None),
            ParentLookup::NoParent,
            Err("Keying error: boom".into()),
        );
        assert_eq!(out.write, StatusWrite::failed("Keying error: boom"));
        assert!(out.complete_parent.is_none());
    }

    #[test]
    fn test_keying_lane_overrides_type() {
        let out = terminal_outcome(
            ClaimLane::Keying,
            &job(JobType::VideoStitching, Some(1)),
            ParentLookup::Found(JobType::BoomerangAutomation),
            ok("/static/keyed.webm"),
        );
        assert_eq!(out.write, StatusWrite::keyed("/static/keyed.webm"));
        assert!(out.complete_parent.is_none());
    }

    #[test]
    fn test_boomerang_parent_takes_returned_status() {
        let out = terminal_outcome(
            ClaimLane::Generation,
            &job(JobType::BoomerangAutomation, None),
            ParentLookup::NoParent,
            Ok(HandlerOutput::Status(JobStatus::WaitingForChildren)),
        );
        assert_eq!(out.write, StatusWrite::status(JobStatus::WaitingForChildren));
    }

    #[test]
    fn test_boomerang_children_skip_review() {
        let out = terminal_outcome(
            ClaimLane::Generation,
            &job(JobType::Animation, Some(1)),
            ParentLookup::Found(JobType::BoomerangAutomation),
            ok("/static/a.mp4"),
        );
        assert_eq!(out.write.status, JobStatus::Completed);
        assert!(out.complete_parent.is_none());

        let out = terminal_outcome(
            ClaimLane::Generation,
            &job(JobType::VideoStitching, Some(1)),
            ParentLookup::Found(JobType::BoomerangAutomation),
            ok("/static/loop.mp4"),
        );
        assert_eq!(out.write.status, JobStatus::Completed);
        assert_eq!(out.write.result_ref.as_deref(), Some("/static/loop.mp4"));
        assert_eq!(out.complete_parent, Some((JobId(1), "/static/loop.mp4".to_string())));
    }

    #[test]
    fn test_standalone_footage_goes_to_review() {
        for job_type in [JobType::Animation, JobType::VideoStitching] {
            let out = terminal_outcome(
                ClaimLane::Generation,
                &job(job_type, None),
                ParentLookup::NoParent,
                ok("/static/x.mp4"),
            );
            assert_eq!(out.write.status, JobStatus::PendingReview);
            assert_eq!(out.write.result_ref.as_deref(), Some("/static/x.mp4"));
        }

        // A non-boomerang parent does not skip review
        let out = terminal_outcome(
            ClaimLane::Generation,
            &job(JobType::Animation, Some(3)),
            ParentLookup::Found(JobType::ImageGeneration),
            ok("/static/x.mp4"),
        );
        assert_eq!(out.write.status, JobStatus::PendingReview);
    }

    #[test]
    fn test_unreadable_parent_counts_as_boomerang() {
        let out = terminal_outcome(
            ClaimLane::Generation,
            &job(JobType::Animation, Some(9)),
            ParentLookup::Unavailable,
            ok("/static/a.mp4"),
        );
        assert_eq!(out.write, StatusWrite::with_result(JobStatus::Completed, "/static/a.mp4"));
        assert!(out.complete_parent.is_none());

        let out = terminal_outcome(
            ClaimLane::Generation,
            &job(JobType::VideoStitching, Some(9)),
            ParentLookup::Unavailable,
            ok("/static/loop.mp4"),
        );
        assert_eq!(out.write.status, JobStatus::Completed);
        assert_eq!(out.complete_parent, Some((JobId(9), "/static/loop.mp4".to_string())));

        let out = terminal_outcome(
            ClaimLane::Generation,
            &job(JobType::ImageGeneration, Some(9)),
            ParentLookup::Unavailable,
            ok("/static/library/x.png"),
        );
        assert_eq!(out.write.status, JobStatus::Completed);
        assert!(out.complete_parent.is_none());
    }

    #[test]
    fn test_other_types_complete() {
        let out = terminal_outcome(
            ClaimLane::Generation,
            &job(JobType::PaletteAnalysis, None),
            ParentLookup::NoParent,
            ok("{\"palette\": []}"),
        );
        assert_eq!(
            out.write,
            StatusWrite::with_result(JobStatus::Completed, "{\"palette\": []}")
        );
    }
}
