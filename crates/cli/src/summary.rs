//! End-of-run reporting for a watched job group.

use fanout_core::job_group::JobGroup;
use fanout_core::status::ChildJobStatus;

/// Log one line per child followed by the group totals.
pub fn log_summary(group: &JobGroup) {
    for child in &group.child_jobs {
        let images = child.outputs.as_ref().map_or(0, |o| o.images.len());
        match child.status {
            ChildJobStatus::Completed => tracing::info!(
                job_id = %child.job_id,
                backend_id = %child.backend_id,
                seed = child.seed,
                images,
                "Child job completed",
            ),
            status => tracing::warn!(
                job_id = %child.job_id,
                backend_id = %child.backend_id,
                seed = child.seed,
                status = %status,
                error = child.error.as_deref().unwrap_or(""),
                "Child job did not complete",
            ),
        }
    }

    let counts = group.counts();
    tracing::info!(
        job_group_id = %group.id,
        status = %group.status,
        total = counts.total,
        succeeded = counts.succeeded,
        failed = counts.failed,
        "Job group finished",
    );
}

/// Process exit code for a finished group: `0` only when every child succeeded.
pub fn exit_code(group: &JobGroup) -> i32 {
    let counts = group.counts();
    if counts.total > 0 && counts.succeeded == counts.total {
        0
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use fanout_core::job_group::ChildJob;
    use fanout_core::status::JobGroupStatus;

    use super::*;

    fn group(statuses: &[ChildJobStatus]) -> JobGroup {
        JobGroup {
            id: "g1".into(),
            panel_id: None,
            child_jobs: statuses
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    let mut child = ChildJob::pending(format!("c{i}"), format!("gpu-{i}"), i as i64);
                    child.status = *s;
                    child
                })
                .collect(),
            status: JobGroupStatus::Completed,
            seed_strategy: Default::default(),
            base_seed: None,
            timeout_seconds: 600,
            metadata: Default::default(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn all_succeeded_exits_zero() {
        let g = group(&[ChildJobStatus::Completed, ChildJobStatus::Completed]);
        assert_eq!(exit_code(&g), 0);
        log_summary(&g);
    }

    #[test]
    fn any_failure_exits_one() {
        assert_eq!(
            exit_code(&group(&[ChildJobStatus::Completed, ChildJobStatus::Timeout])),
            1
        );
        assert_eq!(exit_code(&group(&[])), 1);
    }
}
