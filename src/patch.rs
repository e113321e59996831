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

//! Patching boot-config files in the extracted tree.

use anyhow::{Context, Result};
use log::{error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::patterns::{BootDialect, HttpEndpoint, RuleSet};

/// Patch one boot config in place. Returns whether the file was modified.
///
/// A missing file is not an error. Neither is a failing one: any I/O
/// problem with a single config is logged and reported as unmodified, so
/// one bad file can't abort the whole build.
pub fn patch_config(path: &Path, rules: &RuleSet) -> bool {
    if !path.exists() {
        return false;
    }
    match try_patch(path, rules) {
        Ok(true) => {
            info!("modified boot config: {}", path.display());
            true
        }
        Ok(false) => false,
        Err(e) => {
            error!("failed to patch {}: {:#}", path.display(), e);
            false
        }
    }
}

fn try_patch(path: &Path, rules: &RuleSet) -> Result<bool> {
    let raw = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let original = decode_discarding_invalid(&raw);

    // Already carries the directive, e.g. from an earlier run against the
    // same tree. Re-applying the append rule would duplicate it.
    if original.contains(rules.directive()) {
        return Ok(false);
    }

    let patched = rules.apply_all(&original);
    if patched == original {
        return Ok(false);
    }

    let backup = backup_path(path);
    fs::write(&backup, original.as_bytes())
        .with_context(|| format!("writing backup {}", backup.display()))?;
    fs::write(path, patched.as_bytes()).with_context(|| format!("writing {}", path.display()))?;
    Ok(true)
}

/// Sibling path holding the pre-modification content, e.g. grub.cfg.bak.
/// Left in the mastered tree on purpose, as an audit trail.
fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// Decode bytes as UTF-8, discarding undecodable byte sequences.
fn decode_discarding_invalid(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(s) => {
                out.push_str(s);
                break;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                // valid_up_to() guarantees this slice decodes
                out.push_str(std::str::from_utf8(valid).unwrap());
                match e.error_len() {
                    Some(len) => rest = &after[len..],
                    None => break,
                }
            }
        }
    }
    out
}

/// Walk every dialect's candidate config paths under the extracted tree
/// and patch each file that exists. Returns the number of files modified;
/// zero is a warning, since some images legitimately lack some dialect's
/// configs.
pub fn patch_boot_configs(iso_dir: &Path, endpoint: &HttpEndpoint) -> u32 {
    info!("modifying boot configurations...");
    let mut modified = 0;
    for dialect in BootDialect::ALL {
        let rules = RuleSet::for_dialect(dialect, endpoint);
        for rel in dialect.config_paths() {
            if patch_config(&iso_dir.join(rel), &rules) {
                modified += 1;
            }
        }
    }
    if modified == 0 {
        warn!("no boot configuration files were modified");
    } else {
        info!("modified {} boot configuration file(s)", modified);
    }
    modified
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn endpoint() -> HttpEndpoint {
        HttpEndpoint {
            ip: "10.0.2.2".to_string(),
            port: 8080,
        }
    }

    #[test]
    fn test_missing_file_is_unmodified() {
        let rules = RuleSet::for_dialect(BootDialect::Grub, &endpoint());
        assert!(!patch_config(Path::new("/nonexistent/grub.cfg"), &rules));
    }

    #[test]
    fn test_patch_writes_backup_with_original() {
        let dir = tempdir().unwrap();
        let cfg = dir.path().join("grub.cfg");
        let original = "menuentry 'Install' {\n\tlinux /casper/vmlinuz ---\n}\n";
        fs::write(&cfg, original).unwrap();

        let rules = RuleSet::for_dialect(BootDialect::Grub, &endpoint());
        assert!(patch_config(&cfg, &rules));

        let patched = fs::read_to_string(&cfg).unwrap();
        assert!(patched.contains("autoinstall ds=nocloud-net;s=http://10.0.2.2:8080/"));
        assert_eq!(
            fs::read_to_string(dir.path().join("grub.cfg.bak")).unwrap(),
            original
        );
    }

    #[test]
    fn test_second_pass_is_noop() {
        let dir = tempdir().unwrap();
        let cfg = dir.path().join("txt.cfg");
        fs::write(&cfg, "label live\n  append initrd=/casper/initrd\n").unwrap();

        let rules = RuleSet::for_dialect(BootDialect::Isolinux, &endpoint());
        assert!(patch_config(&cfg, &rules));
        let once = fs::read_to_string(&cfg).unwrap();
        assert_eq!(once.matches("autoinstall").count(), 1);

        // the append rule would match again; the directive guard stops it
        assert!(!patch_config(&cfg, &rules));
        assert_eq!(fs::read_to_string(&cfg).unwrap(), once);
    }

    #[test]
    fn test_unmatched_file_left_alone() {
        let dir = tempdir().unwrap();
        let cfg = dir.path().join("grub.cfg");
        fs::write(&cfg, "set timeout=5\n").unwrap();

        let rules = RuleSet::for_dialect(BootDialect::Grub, &endpoint());
        assert!(!patch_config(&cfg, &rules));
        assert!(!dir.path().join("grub.cfg.bak").exists());
    }

    #[test]
    fn test_undecodable_bytes_discarded() {
        assert_eq!(decode_discarding_invalid(b"abc\xff\xfedef"), "abcdef");
        assert_eq!(decode_discarding_invalid(b"trunc\xe2\x82"), "trunc");
        assert_eq!(decode_discarding_invalid("caf\u{e9}".as_bytes()), "café");
    }

    #[test]
    fn test_patch_boot_configs_counts_across_dialects() {
        let dir = tempdir().unwrap();
        let grub = dir.path().join("boot/grub");
        let isolinux = dir.path().join("isolinux");
        fs::create_dir_all(&grub).unwrap();
        fs::create_dir_all(&isolinux).unwrap();
        fs::write(grub.join("grub.cfg"), "linux /casper/vmlinuz ---\n").unwrap();
        fs::write(isolinux.join("txt.cfg"), "append initrd=/casper/initrd\n").unwrap();

        assert_eq!(patch_boot_configs(dir.path(), &endpoint()), 2);
        // absent syslinux/ and EFI/ paths don't fail; a second run is a no-op
        assert_eq!(patch_boot_configs(dir.path(), &endpoint()), 0);
    }
}
