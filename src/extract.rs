// Copyright 2025 ubuntu-autoinstall-iso contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Unpacking the source image into the working tree.

use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use walkdir::WalkDir;

use crate::xorriso;

/// Extract the full image into `dest` and make the tree writable.
/// Failure here is fatal to the build.
pub fn extract_iso(source: &Path, dest: &Path) -> Result<()> {
    info!("extracting image contents...");
    fs::create_dir_all(dest).with_context(|| format!("creating {}", dest.display()))?;
    xorriso::extract_all(source, dest)?;
    normalize_permissions(dest)
}

/// Images are commonly extracted read-only; force directories to 0755 and
/// files to 0644 so patching and mastering can work on the tree.
fn normalize_permissions(root: &Path) -> Result<()> {
    for entry in WalkDir::new(root) {
        let entry = entry.context("walking extracted tree")?;
        let mode = if entry.file_type().is_dir() {
            0o755
        } else if entry.file_type().is_file() {
            0o644
        } else {
            continue;
        };
        fs::set_permissions(entry.path(), fs::Permissions::from_mode(mode))
            .with_context(|| format!("setting permissions on {}", entry.path().display()))?;
    }
    Ok(())
}
