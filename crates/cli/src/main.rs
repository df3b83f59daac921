//! `fanout` -- submit a job group to the gateway and follow it live.
//!
//! Submits one workflow to several backends (or attaches to an existing
//! group with `WATCH_GROUP_ID`), streams per-child progress until the
//! group finishes, and logs a summary. Ctrl-C cancels the group on the
//! gateway before exiting.
//!
//! Gateway and stream settings come from [`ClientConfig::from_env`];
//! run inputs from [`Mode::from_env`].

use std::sync::Arc;

use anyhow::Context;
use fanout_cli::inputs::{read_workflow, Mode};
use fanout_cli::summary::{exit_code, log_summary};
use fanout_core::job_group::JobGroup;
use fanout_stream::api::JobGroupApi;
use fanout_stream::callbacks::{GroupSignal, StreamEnd};
use fanout_stream::config::ClientConfig;
use fanout_stream::registry::JobGroupRegistry;
use fanout_stream::watcher::GroupWatcher;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fanout=info,fanout_cli=info,fanout_stream=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!("fanout failed: {e:#}");
            std::process::exit(2);
        }
    }
}

async fn run() -> anyhow::Result<i32> {
    let config = ClientConfig::from_env().context("Invalid gateway configuration")?;
    let mode = Mode::from_env().context("Invalid run inputs")?;
    tracing::info!(gateway_url = %config.gateway_url, "Loaded client configuration");

    let api = Arc::new(JobGroupApi::new(
        config.gateway_url.clone(),
        config.request_timeout(),
    )?);
    let registry = JobGroupRegistry::websocket(Arc::clone(&api), config.stream_settings());

    let group = match mode {
        Mode::Submit(inputs) => {
            let workflow = read_workflow(&inputs.workflow_path)?;
            let request = inputs.into_request(workflow)?;
            let response = api
                .submit_job_group(&request)
                .await
                .context("Job group submission failed")?;
            response.into_job_group(&request)
        }
        Mode::Watch { job_group_id } => {
            let status = api
                .get_job_group(&job_group_id)
                .await
                .with_context(|| format!("Failed to load job group {job_group_id}"))?;
            status.job_group
        }
    };

    tracing::info!(
        job_group_id = %group.id,
        children = group.child_jobs.len(),
        status = %group.status,
        "Following job group",
    );

    if group.is_terminal() {
        log_summary(&group);
        return Ok(exit_code(&group));
    }

    let job_group_id = group.id.clone();

    let code = match follow(&registry, group).await {
        Followed::Finished(group) => {
            log_summary(&group);
            exit_code(&group)
        }
        Followed::GaveUp(last_seen) => {
            tracing::warn!(
                job_group_id = %job_group_id,
                last_status = %last_seen.status,
                "Lost the job group stream, querying the gateway",
            );
            let status = api
                .get_job_group(&job_group_id)
                .await
                .with_context(|| format!("Failed to load job group {job_group_id}"))?;
            log_summary(&status.job_group);
            if status.job_group.is_terminal() {
                exit_code(&status.job_group)
            } else {
                tracing::warn!(
                    job_group_id = %job_group_id,
                    status = %status.job_group.status,
                    "Job group is still in progress on the gateway",
                );
                3
            }
        }
        Followed::Interrupted => {
            tracing::warn!(job_group_id = %job_group_id, "Interrupted, cancelling job group");
            registry
                .cancel_and_disconnect(&job_group_id)
                .await
                .context("Failed to cancel job group")?;
            130
        }
    };

    registry.disconnect_all().await;
    Ok(code)
}

/// How following a group ended.
enum Followed {
    /// The stream reported a terminal status.
    Finished(JobGroup),
    /// The stream was lost for good; holds the last state seen.
    GaveUp(JobGroup),
    /// Ctrl-C.
    Interrupted,
}

async fn follow(registry: &JobGroupRegistry, group: JobGroup) -> Followed {
    let mut watcher = GroupWatcher::attach(registry, group);

    loop {
        tokio::select! {
            signal = watcher.next() => match signal {
                Some(GroupSignal::Event(_)) if watcher.group().is_terminal() => {
                    return Followed::Finished(watcher.into_group());
                }
                Some(GroupSignal::Event(_)) => {
                    let counts = watcher.group().counts();
                    tracing::info!(
                        pending = counts.pending,
                        running = counts.running,
                        succeeded = counts.succeeded,
                        failed = counts.failed,
                        "Progress",
                    );
                }
                Some(GroupSignal::Error(message)) => {
                    tracing::warn!(error = %message, "Stream error");
                }
                Some(GroupSignal::Finished(StreamEnd::GaveUp)) => {
                    return Followed::GaveUp(watcher.into_group());
                }
                Some(GroupSignal::Finished(StreamEnd::GroupComplete))
                | Some(GroupSignal::Opened | GroupSignal::Closed) => {}
                None if watcher.group().is_terminal() => {
                    return Followed::Finished(watcher.into_group());
                }
                None => return Followed::GaveUp(watcher.into_group()),
            },
            _ = tokio::signal::ctrl_c() => return Followed::Interrupted,
        }
    }
}
