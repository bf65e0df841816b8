//! File-backed [`Log`] and [`Storage`] for hosts with a filesystem.

use std::{
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
};

use flybrix_wire::{config::Config, Decode, Encode};
use log::{debug, info, warn};

use crate::{Log, LogError, Storage, StorageError};

/// A [`Log`] writing numbered files into one directory.
///
/// Every [`open`](Log::open) starts a fresh `log_NNNN.bin`, skipping numbers
/// already taken.
#[derive(Debug)]
pub struct FileLog {
    dir: PathBuf,
    file: Option<File>,
    next_index: u32,
    locked: bool,
}

impl FileLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file: None,
            next_index: 0,
            locked: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_path(&mut self) -> io::Result<PathBuf> {
        while self.next_index <= 9999 {
            let path = self.dir.join(format!("log_{:04}.bin", self.next_index));
            self.next_index += 1;
            if !path.try_exists()? {
                return Ok(path);
            }
        }

        Err(io::Error::new(io::ErrorKind::StorageFull, "no free log file names"))
    }
}

impl Log for FileLog {
    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn is_locked(&self) -> bool {
        self.locked
    }

    fn open(&mut self) -> Result<(), LogError> {
        if self.locked {
            debug!("Log is locked, ignoring open request");
            return Ok(());
        }
        if self.file.is_some() {
            return Ok(());
        }

        let path = self.next_path()?;
        self.file = Some(File::create(&path)?);
        info!("Recording to {}", path.display());

        Ok(())
    }

    fn close(&mut self) -> Result<(), LogError> {
        if self.locked {
            debug!("Log is locked, ignoring close request");
            return Ok(());
        }

        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }

    fn set_lock(&mut self, locked: bool) {
        self.locked = locked;
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), LogError> {
        let file = self.file.as_mut().ok_or(LogError::NotOpen)?;
        file.write_all(bytes)?;
        Ok(())
    }
}

/// A [`Storage`] keeping the encoded [`Config`] in a single file.
///
/// A missing file reads as the default configuration.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn read(&mut self) -> Result<Config, StorageError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!("No configuration at {}, using defaults", self.path.display());
                return Ok(Config::default());
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Config::decode(&mut data.as_slice())?)
    }

    fn write(&mut self, config: &Config) -> Result<(), StorageError> {
        let mut data = vec![0; config.size()];
        config.encode(&mut data);
        std::fs::write(&self.path, data)?;
        Ok(())
    }
}
