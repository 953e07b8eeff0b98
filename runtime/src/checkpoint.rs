// Copyright 2026 Tagharvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Durable checkpoint of the cumulative result.
//!
//! The checkpoint is a JSON-lines file with one flat row per unit. Every save
//! rewrites the whole file through a sibling temp file and a rename, so a
//! crash mid-write leaves the previous snapshot intact.

use crate::error::CheckpointError;
use crate::model::ContentUnit;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted sequence. A missing file is an empty sequence.
    pub fn load(&self) -> Result<Vec<ContentUnit>, CheckpointError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(CheckpointError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut units = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let unit = serde_json::from_str(line).map_err(|e| CheckpointError::Corrupt {
                path: self.path.clone(),
                line: index + 1,
                reason: e.to_string(),
            })?;
            units.push(unit);
        }
        Ok(units)
    }

    /// Replace the checkpoint with `units`.
    pub fn save(&self, units: &[ContentUnit]) -> Result<(), CheckpointError> {
        let io_err = |source: std::io::Error| CheckpointError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp = self.temp_path();
        {
            let file = fs::File::create(&tmp).map_err(io_err)?;
            let mut writer = BufWriter::new(file);
            for unit in units {
                serde_json::to_writer(&mut writer, unit)?;
                writer.write_all(b"\n").map_err(io_err)?;
            }
            writer.flush().map_err(io_err)?;
        }
        fs::rename(&tmp, &self.path).map_err(io_err)?;

        tracing::debug!(path = %self.path.display(), rows = units.len(), "checkpoint written");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
