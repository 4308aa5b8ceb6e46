//! Identity store backed by JSON-lines files in a local directory.
//!
//! Layout:
//! - `people.jsonl`: one [`PersonRecord`] per line
//! - `faces.jsonl`: one [`FaceRecord`] per line
//! - blobs under their key, e.g. `faces/<id>.png`

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::sinks::domain::identity_store::{FaceRecord, IdentityStore, PersonRecord, StoreError};

pub const PEOPLE_FILE: &str = "people.jsonl";
pub const FACES_FILE: &str = "faces.jsonl";

pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(root).map_err(|source| StoreError::CreateDir {
            path: root.to_path_buf(),
            source,
        })?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn append<T: Serialize>(&self, file_name: &str, record: &T) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record).map_err(StoreError::Serialize)?;
        line.push('\n');

        let path = self.root.join(file_name);
        let write_err = |source| StoreError::Write {
            path: path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(write_err)?;
        file.write_all(line.as_bytes()).map_err(write_err)
    }

    fn blob_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(StoreError::InvalidBlobKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl IdentityStore for JsonFileStore {
    fn save_person(&mut self, person: &PersonRecord) -> Result<(), StoreError> {
        self.append(PEOPLE_FILE, person)
    }

    fn save_face(&mut self, face: &FaceRecord) -> Result<(), StoreError> {
        self.append(FACES_FILE, face)
    }

    fn put_blob(&mut self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.blob_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, bytes).map_err(|source| StoreError::Write { path, source })
    }

    fn load_people(&self) -> Result<Vec<PersonRecord>, StoreError> {
        let path = self.root.join(PEOPLE_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|source| StoreError::Parse {
                    path: path.clone(),
                    line: i + 1,
                    source,
                })
            })
            .collect()
    }
}
