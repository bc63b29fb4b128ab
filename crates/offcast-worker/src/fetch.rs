//! Per-task fetch protocol.
//!
//! Each task streams into `<dest>.part` and is atomically renamed onto its
//! destination only on full success, so the playback server never observes
//! a half-written file. Pause surrenders a resume token describing the
//! partial file; cancel just stops.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use offcast_core::{DownloadTask, ResumeToken};
use offcast_net::{HttpClient, NetError, RangeSpec, RetryPolicy, StreamResponse};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{WorkerError, WorkerResult};

pub(crate) enum TaskOutcome {
    /// Full success; `bytes` is the final file length.
    Completed { bytes: u64 },
    /// Pause requested; `token` continues the transfer later, when the
    /// partial file holds anything worth continuing from.
    Paused { token: Option<ResumeToken> },
    Cancelled,
}

pub(crate) struct TaskFetcher {
    pub client: HttpClient,
    pub retry: RetryPolicy,
    pub item_root: PathBuf,
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_owned());
    name.push_str(".part");
    dest.with_file_name(name)
}

async fn resume_point(part: &Path) -> Option<ResumeToken> {
    match tokio::fs::metadata(part).await {
        Ok(meta) if meta.len() > 0 => Some(ResumeToken {
            offset: meta.len(),
            etag: None,
        }),
        _ => None,
    }
}

fn transient(error: &WorkerError) -> bool {
    match error {
        WorkerError::Net(net) => net.is_retryable(),
        WorkerError::Io(_) => true,
        WorkerError::Store(_) => false,
    }
}

impl TaskFetcher {
    /// Drive one task to an outcome, retrying transient failures with
    /// bounded backoff.
    pub(crate) async fn run(
        &self,
        task: &DownloadTask,
        pause: &CancellationToken,
        cancel: &CancellationToken,
    ) -> WorkerResult<TaskOutcome> {
        let dest = self.item_root.join(&task.rel_dest);
        let part = part_path(&dest);
        let mut last_error: Option<NetError> = None;

        for attempt in 0..=self.retry.max_retries {
            let delay = self.retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = cancel.cancelled() => return Ok(TaskOutcome::Cancelled),
                    () = pause.cancelled() => {
                        return Ok(TaskOutcome::Paused { token: resume_point(&part).await });
                    }
                }
            }

            match self.attempt(task, &dest, &part, pause, cancel).await {
                Ok(outcome) => return Ok(outcome),
                Err(error) => {
                    debug!(url = %task.url, attempt, error = %error, "fetch attempt failed");
                    if !transient(&error) {
                        return Err(error);
                    }
                    match error {
                        WorkerError::Net(net) => last_error = Some(net),
                        other => return Err(other),
                    }
                }
            }
        }

        let source = last_error.unwrap_or(NetError::Cancelled);
        Err(WorkerError::Net(NetError::RetryExhausted {
            attempts: self.retry.max_retries,
            source: Box::new(source),
        }))
    }

    async fn attempt(
        &self,
        task: &DownloadTask,
        dest: &Path,
        part: &Path,
        pause: &CancellationToken,
        cancel: &CancellationToken,
    ) -> WorkerResult<TaskOutcome> {
        // A resume token only applies while the partial file still matches it.
        let stored_token = match &task.resume {
            Some(token) if token.offset > 0 => {
                let on_disk = tokio::fs::metadata(part).await.map(|m| m.len()).ok();
                (on_disk == Some(token.offset)).then(|| token.clone())
            }
            _ => None,
        };
        let range = stored_token
            .as_ref()
            .map(|t| RangeSpec::from_start(t.offset));

        let mut response = tokio::select! {
            r = self.client.stream(&task.url, range) => r?,
            () = cancel.cancelled() => return Ok(TaskOutcome::Cancelled),
            () = pause.cancelled() => {
                return Ok(TaskOutcome::Paused { token: resume_point(part).await });
            }
        };

        // An ETag change means the origin swapped content under the token;
        // drop the partial file and restart from zero.
        let mut resumed = response.resumed;
        if resumed {
            let etag_matches = match (
                stored_token.as_ref().and_then(|t| t.etag.as_ref()),
                response.etag.as_ref(),
            ) {
                (Some(stored), Some(current)) => stored == current,
                _ => true,
            };
            if !etag_matches {
                debug!(url = %task.url, "resume token invalidated by etag change");
                response = tokio::select! {
                    r = self.client.stream(&task.url, None) => r?,
                    () = cancel.cancelled() => return Ok(TaskOutcome::Cancelled),
                    () = pause.cancelled() => {
                        return Ok(TaskOutcome::Paused { token: resume_point(part).await });
                    }
                };
                resumed = false;
            }
        }

        if let Some(parent) = part.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = if resumed {
            OpenOptions::new().append(true).open(part).await?
        } else {
            File::create(part).await?
        };

        let StreamResponse { etag, mut stream, .. } = response;
        let mut written = if resumed {
            stored_token.as_ref().map_or(0, |t| t.offset)
        } else {
            0
        };

        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(TaskOutcome::Cancelled),
                () = pause.cancelled() => {
                    file.flush().await?;
                    let token = (written > 0).then(|| ResumeToken {
                        offset: written,
                        etag: etag.clone(),
                    });
                    return Ok(TaskOutcome::Paused { token });
                }
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => {
                        file.write_all(&bytes).await?;
                        written += bytes.len() as u64;
                    }
                    Some(Err(error)) => return Err(error.into()),
                    None => break,
                }
            }
        }

        file.flush().await?;
        drop(file);
        tokio::fs::rename(part, dest).await?;

        trace!(url = %task.url, bytes = written, dest = %dest.display(), "task complete");
        Ok(TaskOutcome::Completed { bytes: written })
    }
}
