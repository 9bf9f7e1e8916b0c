use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info};
use uuid::Uuid;

use crate::error::UploadError;
use crate::models::ImageRef;
use crate::storage::ObjectStore;

/// Hard cap on a draft listing's image sequence. Staging keeps the earliest
/// entries and silently drops the excess; that is policy, not an accident.
pub const MAX_IMAGES: usize = 10;

/// Abandoned previews are released after this long.
const PREVIEW_TTL: Duration = Duration::from_secs(30 * 60);

/// A client-selected file held in memory until it is either resolved to a
/// durable URL or discarded.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
struct Preview {
    file: StagedFile,
    staged_at: Instant,
}

impl Preview {
    fn is_expired(&self) -> bool {
        self.staged_at.elapsed() >= PREVIEW_TTL
    }
}

/// Stages client-selected images as non-durable previews and resolves them
/// to durable URLs at submission time.
pub struct ImageStager {
    store: Arc<dyn ObjectStore>,
    previews: Mutex<HashMap<Uuid, Preview>>,
}

impl ImageStager {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            previews: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Preview>> {
        self.previews.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stages a single file, rejecting anything that is not an image.
    pub fn stage(&self, file: StagedFile) -> Result<Uuid, UploadError> {
        if !file.content_type.starts_with("image/") {
            return Err(UploadError::Rejected(file.content_type));
        }
        let handle = Uuid::new_v4();
        let mut previews = self.lock();
        previews.retain(|_, p| !p.is_expired());
        previews.insert(
            handle,
            Preview {
                file,
                staged_at: Instant::now(),
            },
        );
        debug!("staged preview {}", handle);
        Ok(handle)
    }

    /// Stages a batch into a draft's image sequence, appending the accepted
    /// files and truncating the combined sequence to [`MAX_IMAGES`]
    /// (earliest-first retained). Non-image entries are skipped. Returns the
    /// handles that made the cut.
    pub fn stage_into(
        &self,
        images: &mut Vec<ImageRef>,
        files: Vec<StagedFile>,
    ) -> Result<Vec<Uuid>, UploadError> {
        let mut accepted = Vec::new();
        for file in files {
            if !file.content_type.starts_with("image/") {
                continue;
            }
            let handle = self.stage(file)?;
            images.push(ImageRef::Preview { handle });
            accepted.push(handle);
        }
        if images.len() > MAX_IMAGES {
            for dropped in images.split_off(MAX_IMAGES) {
                if let ImageRef::Preview { handle } = dropped {
                    self.discard(handle);
                    accepted.retain(|h| *h != handle);
                }
            }
        }
        Ok(accepted)
    }

    /// Resolves every entry of a draft's image sequence to a durable URL.
    ///
    /// Already-durable URLs pass through unchanged; previews are uploaded
    /// under the owning listing's key with a collision-resistant name. The
    /// batch is atomic: the first failure aborts the whole resolve and the
    /// caller ends up with zero durable URLs from this batch. Previews are
    /// never released here, success or not, so the same handles can feed a
    /// retried submission; the caller releases them once the listing is
    /// actually persisted. Relative order is preserved.
    pub async fn resolve(
        &self,
        listing_key: Uuid,
        images: &[ImageRef],
    ) -> Result<Vec<String>, UploadError> {
        let mut resolved = Vec::with_capacity(images.len());
        for image in images {
            match image {
                ImageRef::Url { url } => resolved.push(url.clone()),
                ImageRef::Preview { handle } => {
                    let file = self
                        .lock()
                        .get(handle)
                        .map(|p| p.file.clone())
                        .ok_or(UploadError::UnknownPreview(*handle))?;
                    let path = format!(
                        "cars/{}/{}.{}",
                        listing_key,
                        Uuid::new_v4(),
                        extension_for(&file)
                    );
                    let url = self.store.put(&path, &file.content_type, file.bytes).await?;
                    resolved.push(url);
                }
            }
        }
        info!(
            "resolved {} image(s) for listing {}",
            resolved.len(),
            listing_key
        );
        Ok(resolved)
    }

    /// Releases every preview in an image sequence, once its listing is
    /// safely persisted. Previews of abandoned drafts fall to the TTL.
    pub fn release(&self, images: &[ImageRef]) {
        for image in images {
            if let ImageRef::Preview { handle } = image {
                self.discard(*handle);
            }
        }
    }

    /// Releases a staged preview. Discarding an already-released handle is
    /// a no-op, not an error.
    pub fn discard(&self, handle: Uuid) {
        self.lock().remove(&handle);
    }

    pub fn staged_count(&self) -> usize {
        self.lock().len()
    }
}

fn extension_for(file: &StagedFile) -> &str {
    match file.content_type.as_str() {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => file
            .file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .unwrap_or("jpg"),
    }
}
