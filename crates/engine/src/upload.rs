use std::collections::HashSet;
use std::fs::File;
use std::sync::Arc;

use floe_transfer::{Range, RangeCursor, dispatch, read_exact_at, tree_hash_bytes};
use floe_vault::{
    CompleteMultipartUploadRequest, InitiateMultipartUploadRequest, ListPartsRequest,
    PartListElement, PartPager, UploadMultipartPartRequest, VaultClient,
};
use tracing::{debug, info, warn};

use crate::types::{UploadInput, UploadOutcome};
use crate::{EngineError, hash_file, hash_range};

/// Coordinates one resumable multi-part upload.
///
/// When `input.upload_id` is set, the parts the service already holds for
/// that upload are hashed against the local file first and only the
/// missing or changed ones are sent again.
pub struct Uploader {
    client: Arc<dyn VaultClient>,
    input: UploadInput,
    /// Offsets of parts confirmed on the service with a matching hash.
    uploaded: HashSet<u64>,
    size: u64,
}

impl Uploader {
    pub fn new(client: Arc<dyn VaultClient>, input: UploadInput) -> Self {
        Self {
            client,
            input,
            uploaded: HashSet::new(),
            size: 0,
        }
    }

    /// Uploads the file with at most `jobs` parts in flight.
    ///
    /// Failed parts are logged and left out; the service then rejects the
    /// completion and the returned error reports it. Re-running with the
    /// same upload id sends only what is still missing.
    pub async fn upload(mut self, jobs: usize) -> Result<UploadOutcome, EngineError> {
        if self.input.part_size == 0 {
            return Err(EngineError::InvalidPartSize);
        }

        let file = self.open_file()?;
        let upload_id = self.initiate_upload().await?;
        info!(
            upload_id = %upload_id,
            file = %self.input.file_name.display(),
            size = self.size,
            "upload initiated"
        );

        self.check_uploaded_parts(&file, &upload_id).await?;
        self.multipart_upload(&file, &upload_id, jobs).await;
        let outcome = self.complete_upload(&file, upload_id).await?;

        info!(location = %outcome.location, "upload complete");
        Ok(outcome)
    }

    fn open_file(&mut self) -> Result<Arc<File>, EngineError> {
        let file = File::open(&self.input.file_name)?;
        let meta = file.metadata()?;
        if meta.is_dir() {
            return Err(EngineError::DirectoryNotSupported);
        }

        self.size = meta.len();
        Ok(Arc::new(file))
    }

    /// Returns the upload id to use, initiating a new upload only when none
    /// was supplied.
    async fn initiate_upload(&self) -> Result<String, EngineError> {
        if let Some(id) = &self.input.upload_id {
            return Ok(id.clone());
        }

        let upload_id = self
            .client
            .initiate_multipart_upload(InitiateMultipartUploadRequest {
                account_id: self.input.account_id.clone(),
                vault_name: self.input.vault_name.clone(),
                part_size: self.input.part_size,
            })
            .await?;
        Ok(upload_id)
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    async fn check_uploaded_parts(
        &mut self,
        file: &Arc<File>,
        upload_id: &str,
    ) -> Result<(), EngineError> {
        info!(upload_id, "start checking uploaded parts");

        let client = self.client.clone();
        let mut pager = PartPager::new(
            client.as_ref(),
            ListPartsRequest {
                account_id: self.input.account_id.clone(),
                vault_name: self.input.vault_name.clone(),
                upload_id: upload_id.to_string(),
                marker: None,
                limit: None,
            },
        );

        while let Some(page) = pager.next_page().await {
            let page = page?;
            if page.part_size_in_bytes != self.input.part_size {
                return Err(EngineError::PartSizeMismatch {
                    configured: self.input.part_size,
                    remote: page.part_size_in_bytes,
                });
            }

            for part in &page.parts {
                if self.check_part(file, part).await? {
                    debug!(range = %part.range_in_bytes, "part is ok");
                } else {
                    warn!(range = %part.range_in_bytes, "part hash mismatch, it will be uploaded again");
                }
            }
        }

        info!(upload_id, confirmed = self.uploaded.len(), "finish checking uploaded parts");
        Ok(())
    }

    /// Hashes the local bytes behind a stored part. Returns whether they
    /// match, recording the offset as uploaded when they do.
    async fn check_part(
        &mut self,
        file: &Arc<File>,
        part: &PartListElement,
    ) -> Result<bool, EngineError> {
        let range = Range::parse(&part.range_in_bytes)
            .ok_or_else(|| EngineError::InvalidPartRange(part.range_in_bytes.clone()))?;

        if range.offset >= self.size {
            return Err(EngineError::FileSizeMismatch {
                range: part.range_in_bytes.clone(),
                size: self.size,
            });
        }

        let tree_hash = hash_range(file.clone(), range)
            .await?
            .ok_or_else(|| EngineError::HashUnavailable(format!("part ({})", part.range_in_bytes)))?;

        if tree_hash == part.sha256_tree_hash {
            self.uploaded.insert(range.offset);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    // -----------------------------------------------------------------------
    // Transfer
    // -----------------------------------------------------------------------

    async fn multipart_upload(&self, file: &Arc<File>, upload_id: &str, jobs: usize) {
        let target = Arc::new(PartTarget {
            account_id: self.input.account_id.clone(),
            vault_name: self.input.vault_name.clone(),
            upload_id: upload_id.to_string(),
        });
        let ranges = RangeCursor::new(self.size, self.input.part_size)
            .filter(|range| !self.uploaded.contains(&range.offset));

        dispatch("upload", jobs, ranges, |range| {
            let client = self.client.clone();
            let file = file.clone();
            let target = target.clone();
            async move { upload_part(client.as_ref(), file, &target, range).await }
        })
        .await;
    }

    async fn complete_upload(
        &self,
        file: &Arc<File>,
        upload_id: String,
    ) -> Result<UploadOutcome, EngineError> {
        let tree_hash = hash_file(file.clone(), self.size)
            .await?
            .ok_or_else(|| EngineError::HashUnavailable(self.input.file_name.display().to_string()))?;

        let output = self
            .client
            .complete_multipart_upload(CompleteMultipartUploadRequest {
                account_id: self.input.account_id.clone(),
                vault_name: self.input.vault_name.clone(),
                upload_id: upload_id.clone(),
                archive_size: self.size,
                checksum: tree_hash.clone(),
            })
            .await?;

        Ok(UploadOutcome {
            upload_id,
            archive_id: output.archive_id,
            location: output.location,
            archive_size: self.size,
            tree_hash,
        })
    }
}

/// Identifies the upload a part belongs to.
struct PartTarget {
    account_id: String,
    vault_name: String,
    upload_id: String,
}

async fn upload_part(
    client: &dyn VaultClient,
    file: Arc<File>,
    target: &PartTarget,
    range: Range,
) -> Result<(), EngineError> {
    let (body, checksum) = tokio::task::spawn_blocking(move || {
        let body = read_exact_at(&file, range)?;
        let checksum = tree_hash_bytes(&body);
        Ok::<_, std::io::Error>((body, checksum))
    })
    .await??;
    let checksum = checksum.ok_or_else(|| EngineError::HashUnavailable(format!("part ({range})")))?;

    client
        .upload_multipart_part(UploadMultipartPartRequest {
            account_id: target.account_id.clone(),
            vault_name: target.vault_name.clone(),
            upload_id: target.upload_id.clone(),
            range,
            checksum,
            body,
        })
        .await?;
    Ok(())
}
