use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, error};

use crate::error::{RecommenderError, Result};
use crate::models::SerializedModel;

/// Writes `document` as UTF-8 JSON, creating parent directories as needed.
///
/// The file is written beside its destination first and then renamed into
/// place, so readers never see a partial document.
pub async fn save_model(document: &SerializedModel, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            error!("failed to create model directory {}: {}", parent.display(), e);
            RecommenderError::Io(e)
        })?;
    }

    let json = document.to_json()?;
    let temp_path = path.with_extension("json.tmp");
    tokio::fs::write(&temp_path, json.as_bytes()).await?;
    tokio::fs::rename(&temp_path, path).await?;

    debug!(path = %path.display(), bytes = json.len(), "saved model");
    Ok(())
}

pub async fn load_model(path: &Path) -> Result<SerializedModel> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(RecommenderError::NotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            return Err(RecommenderError::Corrupt(format!("model file is not UTF-8: {}", e)))
        }
        Err(e) => return Err(RecommenderError::Io(e)),
    };

    let document = SerializedModel::from_json(&raw)?;
    debug!(path = %path.display(), version = %document.version, "loaded model");
    Ok(document)
}
