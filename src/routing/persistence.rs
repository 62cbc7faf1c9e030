use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::routing::{
    error::{RoutingError, storage_error},
    ports::{TargetStorePort, duplicate_target, missing_target, position_of},
    types::Target,
};

const COLLECTION_EXTENSION: &str = "jsonl";

/// File-backed target list: one JSON document per line in `<dir>/<collection>.jsonl`.
///
/// The whole collection is held in memory and every mutation rewrites the file through a
/// synced temp file followed by a rename. Memory is only updated after the rename succeeds.
pub struct FileTargetStore {
    path: PathBuf,
    targets: Mutex<Vec<Target>>,
}

impl FileTargetStore {
    pub fn open(dir: &Path, collection: &str) -> Result<Self, RoutingError> {
        if collection.trim().is_empty()
            || collection.contains(['/', '\\'])
            || collection.starts_with('.')
        {
            return Err(storage_error(format!(
                "invalid target collection name '{collection}'"
            )));
        }

        let path = dir.join(format!("{collection}.{COLLECTION_EXTENSION}"));
        let targets = load_collection(&path)?;
        tracing::debug!(
            target: "store",
            path = %path.display(),
            targets = targets.len(),
            "target_collection_loaded"
        );

        Ok(Self {
            path,
            targets: Mutex::new(targets),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TargetStorePort for FileTargetStore {
    async fn list_all(&self) -> Result<Vec<Target>, RoutingError> {
        Ok(self.targets.lock().await.clone())
    }

    async fn create(&self, target: Target) -> Result<(), RoutingError> {
        let mut guard = self.targets.lock().await;
        if position_of(&guard, &target.id).is_some() {
            return Err(duplicate_target(&target.id));
        }

        let mut next = guard.clone();
        next.push(target);
        save_collection(&self.path, &next)?;
        *guard = next;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Target, RoutingError> {
        let guard = self.targets.lock().await;
        position_of(&guard, id)
            .map(|index| guard[index].clone())
            .ok_or_else(|| missing_target(id))
    }

    async fn replace(&self, id: &str, target: Target) -> Result<(), RoutingError> {
        let mut guard = self.targets.lock().await;
        let index = position_of(&guard, id).ok_or_else(|| missing_target(id))?;

        let mut next = guard.clone();
        next[index] = target;
        save_collection(&self.path, &next)?;
        *guard = next;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), RoutingError> {
        let parent = collection_dir(&self.path)?;
        let metadata = fs::metadata(parent).map_err(|err| {
            storage_error(format!(
                "target store directory '{}' is unavailable: {err}",
                parent.display()
            ))
        })?;
        if !metadata.is_dir() {
            return Err(storage_error(format!(
                "target store path '{}' is not a directory",
                parent.display()
            )));
        }
        Ok(())
    }
}

fn collection_dir(path: &Path) -> Result<&Path, RoutingError> {
    path.parent().ok_or_else(|| {
        storage_error(format!(
            "target collection path '{}' has no parent",
            path.display()
        ))
    })
}

fn load_collection(path: &Path) -> Result<Vec<Target>, RoutingError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(storage_error(format!(
                "failed to read target collection '{}': {err}",
                path.display()
            )));
        }
    };

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str::<Target>(line).map_err(|err| {
                storage_error(format!(
                    "failed to parse target at line {} of '{}': {err}",
                    index + 1,
                    path.display()
                ))
            })
        })
        .collect()
}

fn save_collection(path: &Path, targets: &[Target]) -> Result<(), RoutingError> {
    let parent = collection_dir(path)?;
    fs::create_dir_all(parent).map_err(|err| {
        storage_error(format!(
            "failed to create target store directory '{}': {err}",
            parent.display()
        ))
    })?;

    let tmp_path = path.with_extension("tmp");
    let file = fs::File::create(&tmp_path).map_err(|err| {
        storage_error(format!(
            "failed to create target temp file '{}': {err}",
            tmp_path.display()
        ))
    })?;

    let mut writer = BufWriter::new(file);
    for target in targets {
        serde_json::to_writer(&mut writer, target).map_err(|err| {
            storage_error(format!("failed to serialize target '{}': {err}", target.id))
        })?;
        writer.write_all(b"\n").map_err(|err| {
            storage_error(format!(
                "failed to write target temp file '{}': {err}",
                tmp_path.display()
            ))
        })?;
    }
    let file = writer.into_inner().map_err(|err| {
        storage_error(format!(
            "failed to flush target temp file '{}': {}",
            tmp_path.display(),
            err.error()
        ))
    })?;
    file.sync_all().map_err(|err| {
        storage_error(format!(
            "failed to sync target temp file '{}': {err}",
            tmp_path.display()
        ))
    })?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|err| {
        storage_error(format!(
            "failed to replace target collection '{}': {err}",
            path.display()
        ))
    })?;

    if let Ok(dir) = fs::File::open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}
