// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Plain-file [`ehp_core::platform::Storage`] for the subscription/writable
//! persistence demo, rooted under a directory given on the command line.

use std::fs;
use std::io;
use std::path::PathBuf;

use ehp_core::platform::Storage;

pub struct FsStorage {
    base: PathBuf,
}

impl FsStorage {
    pub fn new(base: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base.join(path.trim_start_matches('/'))
    }
}

impl Storage for FsStorage {
    fn write_all(&mut self, path: &str, data: &[u8]) -> io::Result<()> {
        let target = self.resolve(path);
        let tmp = target.with_extension("tmp");
        fs::write(&tmp, data)?;
        fs::rename(tmp, target)
    }

    fn read_all(&self, path: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.resolve(path)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}
