use anyhow::Context;
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use crate::recipes::repo_types::Recipe;
use crate::state::AppState;

pub const IMAGE_DIR: &str = "uploads/recipe";
const URL_TTL_SECS: u64 = 10 * 60;

pub struct UploadItem {
    pub filename: Option<String>,
    pub content_type: String,
    pub body: Bytes,
}

/// Storage key for a new upload: `uploads/recipe/<uuid>.<ext>`.
pub fn recipe_image_file_path(filename: &str, content_type: Option<&str>) -> String {
    recipe_image_file_path_with(filename, content_type, || Uuid::new_v4().to_string())
}

/// As [`recipe_image_file_path`] with the id generator supplied by the caller.
pub fn recipe_image_file_path_with<F>(filename: &str, content_type: Option<&str>, gen_id: F) -> String
where
    F: FnOnce() -> String,
{
    let id = gen_id();
    match extension(filename).or_else(|| content_type.and_then(ext_from_mime)) {
        Some(ext) => format!("{IMAGE_DIR}/{id}.{ext}"),
        None => format!("{IMAGE_DIR}/{id}"),
    }
}

/// Text after the last `.` of the file name, if it is a plain alphanumeric suffix.
fn extension(filename: &str) -> Option<&str> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext)
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

pub fn is_image(content_type: &str) -> bool {
    content_type.starts_with("image/")
}

/// Stores the upload and points the recipe at it, replacing any previous image.
/// `Ok(None)` when the recipe does not exist for this owner.
pub async fn upload_recipe_image(
    st: &AppState,
    owner: Uuid,
    recipe_id: Uuid,
    item: UploadItem,
) -> anyhow::Result<Option<Recipe>> {
    let Some(existing) = st.store.find_recipe(owner, recipe_id).await? else {
        return Ok(None);
    };

    let key = recipe_image_file_path(
        item.filename.as_deref().unwrap_or_default(),
        Some(&item.content_type),
    );
    st.storage
        .put_object(&key, item.body, &item.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;

    let Some(updated) = st.store.set_recipe_image(owner, recipe_id, Some(&key)).await? else {
        // recipe vanished between the lookup and the update
        discard(st, &key).await;
        return Ok(None);
    };

    if let Some(old) = existing.image.filter(|old| *old != key) {
        discard(st, &old).await;
    }
    info!(%recipe_id, key = %key, "recipe image stored");
    Ok(Some(updated))
}

/// Best-effort removal; a leftover object is only logged.
pub async fn discard(st: &AppState, key: &str) {
    if let Err(e) = st.storage.delete_object(key).await {
        warn!(error = %e, key = %key, "failed to delete stored image");
    }
}

pub async fn presign_image(st: &AppState, key: &str) -> anyhow::Result<String> {
    st.storage
        .presign_get(key, URL_TTL_SECS)
        .await
        .with_context(|| format!("presign url for key {}", key))
}
