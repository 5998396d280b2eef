use std::fs::{File, OpenOptions};
use std::sync::Arc;

use floe_transfer::{Range, RangeCursor, dispatch, tree_hash_bytes, write_all_at};
use floe_vault::{DescribeJobRequest, GetJobOutputRequest, JobAction, JobStatus, VaultClient};
use tracing::info;

use crate::types::{DownloadInput, DownloadOutcome};
use crate::{EngineError, hash_file};

/// Coordinates the ranged download of one retrieval job's output.
///
/// The destination is created exclusively; an existing file is never
/// overwritten. There is no resumption: a failed run leaves a partial file
/// that has to be removed before trying again.
pub struct Downloader {
    client: Arc<dyn VaultClient>,
    input: DownloadInput,
    size: u64,
    tree_hash: String,
}

impl Downloader {
    pub fn new(client: Arc<dyn VaultClient>, input: DownloadInput) -> Self {
        Self {
            client,
            input,
            size: 0,
            tree_hash: String::new(),
        }
    }

    /// Downloads the job output with at most `jobs` parts in flight.
    pub async fn download(mut self, jobs: usize) -> Result<DownloadOutcome, EngineError> {
        if self.input.part_size == 0 {
            return Err(EngineError::InvalidPartSize);
        }

        self.check_job().await?;
        let file = self.open_file()?;
        info!(
            job_id = %self.input.job_id,
            file = %self.input.file_name.display(),
            size = self.size,
            "download started"
        );

        self.multipart_download(&file, jobs).await;
        self.check_tree_hash(&file).await?;

        info!(tree_hash = %self.tree_hash, "download verified");
        Ok(DownloadOutcome {
            archive_size: self.size,
            tree_hash: self.tree_hash,
        })
    }

    /// Requires a succeeded archive retrieval job and records the archive's
    /// size and tree hash.
    async fn check_job(&mut self) -> Result<(), EngineError> {
        let job = self
            .client
            .describe_job(DescribeJobRequest {
                account_id: self.input.account_id.clone(),
                vault_name: self.input.vault_name.clone(),
                job_id: self.input.job_id.clone(),
            })
            .await?;

        if job.action != JobAction::ArchiveRetrieval {
            return Err(EngineError::UnsupportedAction(job.action.to_string()));
        }

        match job.status_code {
            JobStatus::Succeeded => {}
            JobStatus::InProgress => return Err(EngineError::JobNotReady),
            JobStatus::Failed => {
                return Err(EngineError::JobFailed(job.status_message.unwrap_or_default()));
            }
            JobStatus::Other(status) => return Err(EngineError::UnexpectedJobStatus(status)),
        }

        self.tree_hash = job.sha256_tree_hash.ok_or(EngineError::MissingTreeHash)?;
        self.size = job
            .archive_size_in_bytes
            .ok_or(EngineError::MissingArchiveSize)?;
        Ok(())
    }

    fn open_file(&self) -> Result<Arc<File>, EngineError> {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }

        let file = options.open(&self.input.file_name)?;
        file.set_len(self.size)?;
        Ok(Arc::new(file))
    }

    async fn multipart_download(&self, file: &Arc<File>, jobs: usize) {
        let target = Arc::new(JobTarget {
            account_id: self.input.account_id.clone(),
            vault_name: self.input.vault_name.clone(),
            job_id: self.input.job_id.clone(),
        });

        dispatch(
            "download",
            jobs,
            RangeCursor::new(self.size, self.input.part_size),
            |range| {
                let client = self.client.clone();
                let file = file.clone();
                let target = target.clone();
                async move { download_part(client.as_ref(), file, &target, range).await }
            },
        )
        .await;
    }

    async fn check_tree_hash(&self, file: &Arc<File>) -> Result<(), EngineError> {
        let actual = hash_file(file.clone(), self.size)
            .await?
            .ok_or_else(|| EngineError::HashUnavailable(self.input.file_name.display().to_string()))?;

        if actual != self.tree_hash {
            return Err(EngineError::HashMismatch {
                expected: self.tree_hash.clone(),
                actual,
            });
        }
        Ok(())
    }
}

/// Identifies the job a part is fetched from.
struct JobTarget {
    account_id: String,
    vault_name: String,
    job_id: String,
}

async fn download_part(
    client: &dyn VaultClient,
    file: Arc<File>,
    target: &JobTarget,
    range: Range,
) -> Result<(), EngineError> {
    let output = client
        .get_job_output(GetJobOutputRequest {
            account_id: target.account_id.clone(),
            vault_name: target.vault_name.clone(),
            job_id: target.job_id.clone(),
            range,
        })
        .await?;

    let received = output.body.len() as u64;
    if received != range.length {
        return Err(EngineError::SizeMismatch {
            expected: range.length,
            actual: received,
        });
    }

    tokio::task::spawn_blocking(move || -> Result<(), EngineError> {
        if let Some(expected) = output.checksum {
            let actual = tree_hash_bytes(&output.body)
                .ok_or_else(|| EngineError::HashUnavailable(format!("part ({range})")))?;
            if actual != expected {
                return Err(EngineError::HashMismatch { expected, actual });
            }
        }

        let written = write_all_at(&file, &output.body, range.offset)?;
        ensure_written(written, range)
    })
    .await?
}

fn ensure_written(written: usize, range: Range) -> Result<(), EngineError> {
    if written as u64 != range.length {
        return Err(EngineError::ShortWrite(range.length));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    use floe_vault::{JobDescription, VaultError};

    use super::*;
    use crate::mock::{MockVault, retrieval_job};

    const TEST_HASH: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    fn downloader(mock: &Arc<MockVault>, dir: &tempfile::TempDir, part_size: u64) -> Downloader {
        Downloader::new(
            mock.clone(),
            DownloadInput {
                vault_name: "v".into(),
                file_name: dir.path().join("out"),
                job_id: "job-1".into(),
                part_size,
                ..DownloadInput::default()
            },
        )
    }

    fn calls(counter: &AtomicUsize) -> usize {
        MockVault::calls(counter)
    }

    fn job_mock(job: JobDescription) -> Arc<MockVault> {
        Arc::new(MockVault::with_job(job, Vec::new()))
    }

    async fn check_job_err(job: JobDescription) -> EngineError {
        let dir = tempfile::tempdir().unwrap();
        let mock = job_mock(job);
        let mut down = downloader(&mock, &dir, 4);
        down.check_job().await.unwrap_err()
    }

    #[tokio::test]
    async fn describe_error_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockVault::default());

        let err = downloader(&mock, &dir, 4).download(1).await.unwrap_err();
        assert!(matches!(err, EngineError::Vault(VaultError::Transport(_))));
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn unsupported_action() {
        let mut job = retrieval_job(JobStatus::Succeeded, 4, Some(TEST_HASH.into()));
        job.action = JobAction::InventoryRetrieval;
        let err = check_job_err(job).await;
        assert_eq!(err.to_string(), "InventoryRetrieval action is not supported");
    }

    #[tokio::test]
    async fn job_in_progress_is_retryable() {
        let err = check_job_err(retrieval_job(JobStatus::InProgress, 4, None)).await;
        assert!(matches!(err, EngineError::JobNotReady));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn failed_job_surfaces_message() {
        let mut job = retrieval_job(JobStatus::Failed, 4, None);
        job.status_message = Some("archive is gone".into());
        let err = check_job_err(job).await;
        assert_eq!(err.to_string(), "the job is failed: archive is gone");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn unexpected_status() {
        let err = check_job_err(retrieval_job(JobStatus::Other("Paused".into()), 4, None)).await;
        assert_eq!(err.to_string(), "job status is unexpected: Paused");
    }

    #[tokio::test]
    async fn unaligned_retrieval_is_rejected() {
        let err = check_job_err(retrieval_job(JobStatus::Succeeded, 4, None)).await;
        assert!(matches!(err, EngineError::MissingTreeHash));
    }

    #[tokio::test]
    async fn succeeded_job_records_size_and_hash() {
        let dir = tempfile::tempdir().unwrap();
        let mock = job_mock(retrieval_job(JobStatus::Succeeded, 4, Some(TEST_HASH.into())));
        let mut down = downloader(&mock, &dir, 4);

        down.check_job().await.unwrap();
        assert_eq!(down.size, 4);
        assert_eq!(down.tree_hash, TEST_HASH);
    }

    #[tokio::test]
    async fn existing_destination_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("out"), b"keep").unwrap();
        let mock = Arc::new(MockVault::with_job(
            retrieval_job(JobStatus::Succeeded, 4, Some(TEST_HASH.into())),
            b"test".to_vec(),
        ));

        let err = downloader(&mock, &dir, 4).download(1).await.unwrap_err();
        assert!(
            matches!(&err, EngineError::Io(e) if e.kind() == std::io::ErrorKind::AlreadyExists),
            "{err}"
        );
        assert_eq!(calls(&mock.output_calls), 0);
        assert_eq!(std::fs::read(dir.path().join("out")).unwrap(), b"keep");
    }

    #[tokio::test]
    async fn existing_directory_is_not_replaced() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("out")).unwrap();
        let mock = Arc::new(MockVault::with_job(
            retrieval_job(JobStatus::Succeeded, 4, Some(TEST_HASH.into())),
            b"test".to_vec(),
        ));

        let err = downloader(&mock, &dir, 4).download(1).await.unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }

    #[tokio::test]
    async fn output_file_is_sized_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let mock = job_mock(retrieval_job(JobStatus::Succeeded, 11, Some(TEST_HASH.into())));
        let mut down = downloader(&mock, &dir, 4);
        down.check_job().await.unwrap();

        let file = down.open_file().unwrap();
        assert_eq!(file.metadata().unwrap().len(), 11);
    }

    #[tokio::test]
    async fn short_body_fails_part() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockVault {
            short_offsets: HashSet::from([0]),
            ..MockVault::with_job(retrieval_job(JobStatus::Succeeded, 4, None), b"test".to_vec())
        });
        let file = Arc::new(File::create(dir.path().join("part")).unwrap());
        let target = JobTarget {
            account_id: "-".into(),
            vault_name: "v".into(),
            job_id: "job-1".into(),
        };

        let err = download_part(mock.as_ref(), file, &target, Range::new(0, 4).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SizeMismatch { expected: 4, actual: 3 }));
    }

    #[tokio::test]
    async fn bad_part_checksum_fails_part() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockVault {
            bad_checksum_offsets: HashSet::from([0]),
            ..MockVault::with_job(retrieval_job(JobStatus::Succeeded, 4, None), b"test".to_vec())
        });
        let path = dir.path().join("part");
        let file = Arc::new(File::create(&path).unwrap());
        let target = JobTarget {
            account_id: "-".into(),
            vault_name: "v".into(),
            job_id: "job-1".into(),
        };

        let err = download_part(mock.as_ref(), file, &target, Range::new(0, 4).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::HashMismatch { .. }));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn every_part_is_fetched() {
        let data = b"hello world".to_vec();
        let hash = tree_hash_bytes(&data).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockVault::with_job(
            retrieval_job(JobStatus::Succeeded, data.len() as u64, Some(hash.clone())),
            data.clone(),
        ));

        let outcome = downloader(&mock, &dir, 4).download(2).await.unwrap();
        assert_eq!(calls(&mock.output_calls), 3);
        assert_eq!(outcome.tree_hash, hash);
        assert_eq!(std::fs::read(dir.path().join("out")).unwrap(), data);
    }

    #[tokio::test]
    async fn failed_part_is_caught_by_final_hash() {
        let data = b"hello world".to_vec();
        let hash = tree_hash_bytes(&data).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockVault {
            short_offsets: HashSet::from([4]),
            ..MockVault::with_job(
                retrieval_job(JobStatus::Succeeded, data.len() as u64, Some(hash)),
                data,
            )
        });

        let err = downloader(&mock, &dir, 4).download(2).await.unwrap_err();
        assert!(matches!(err, EngineError::HashMismatch { .. }));
        assert_eq!(calls(&mock.output_calls), 3);
    }

    #[tokio::test]
    async fn silent_corruption_is_caught_by_final_hash() {
        let data = b"hello world".to_vec();
        let hash = tree_hash_bytes(&data).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockVault {
            corrupt_offsets: HashSet::from([8]),
            ..MockVault::with_job(
                retrieval_job(JobStatus::Succeeded, data.len() as u64, Some(hash)),
                data,
            )
        });

        let err = downloader(&mock, &dir, 4).download(3).await.unwrap_err();
        assert!(matches!(err, EngineError::HashMismatch { .. }));
    }

    #[tokio::test]
    async fn single_part_download_reproduces_content() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockVault::with_job(
            retrieval_job(JobStatus::Succeeded, 4, Some(TEST_HASH.into())),
            b"test".to_vec(),
        ));

        let outcome = downloader(&mock, &dir, 1024 * 1024).download(1).await.unwrap();
        assert_eq!(outcome.archive_size, 4);
        assert_eq!(std::fs::read(dir.path().join("out")).unwrap(), b"test");
    }

    #[test]
    fn partial_write_is_reported() {
        let range = Range::new(8, 4).unwrap();
        assert!(ensure_written(4, range).is_ok());

        let err = ensure_written(3, range).unwrap_err();
        assert!(matches!(err, EngineError::ShortWrite(4)));
        assert_eq!(err.to_string(), "could not write 4 bytes to the file");
    }
}
