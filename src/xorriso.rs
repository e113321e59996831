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

//! Invocations of the external `xorriso` mastering tool.
//!
//! All reads of the source image and the final mastering step go through
//! here; the rest of the crate only consumes xorriso's text reports.

use anyhow::{bail, Result};
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use crate::util::{run_with_timeout, CmdOutput};

pub const XORRISO: &str = "xorriso";

const SINGLE_FILE_TIMEOUT: Duration = Duration::from_secs(30);
const LIST_TIMEOUT: Duration = Duration::from_secs(60);
const REPORT_TIMEOUT: Duration = Duration::from_secs(30);
const CATALOG_TIMEOUT: Duration = Duration::from_secs(60);
const EXTRACT_TIMEOUT: Duration = Duration::from_secs(300);
const MASTER_TIMEOUT: Duration = Duration::from_secs(600);

/// Extract a single file from the image to `dest`.
pub fn extract_file(source: &Path, image_path: &str, dest: &Path) -> Result<()> {
    let mut cmd = Command::new(XORRISO);
    cmd.arg("-osirrox")
        .arg("on")
        .arg("-indev")
        .arg(source)
        .arg("-extract")
        .arg(image_path)
        .arg(dest);
    expect_success(&mut cmd, SINGLE_FILE_TIMEOUT)?;
    Ok(())
}

/// Extract the full image tree to `dest`.
pub fn extract_all(source: &Path, dest: &Path) -> Result<()> {
    let mut cmd = Command::new(XORRISO);
    cmd.arg("-osirrox")
        .arg("on")
        .arg("-indev")
        .arg(source)
        .arg("-extract")
        .arg("/")
        .arg(dest);
    expect_success(&mut cmd, EXTRACT_TIMEOUT)?;
    Ok(())
}

/// List all regular file paths in the image, one per line.
pub fn list_files(source: &Path) -> Result<String> {
    let mut cmd = Command::new(XORRISO);
    cmd.arg("-indev")
        .arg(source)
        .arg("-find")
        .arg("/")
        .arg("-type")
        .arg("f");
    Ok(expect_success(&mut cmd, LIST_TIMEOUT)?.stdout)
}

/// Run the volume diagnostic report. xorriso writes it to stderr.
pub fn volume_report(source: &Path) -> Result<String> {
    let mut cmd = Command::new(XORRISO);
    cmd.arg("-indev").arg(source).arg("-report_about").arg("NOTE");
    Ok(expect_success(&mut cmd, REPORT_TIMEOUT)?.stderr)
}

/// Report the image's El Torito boot catalog as a replayable mkisofs
/// argument list.
pub fn boot_catalog_report(source: &Path) -> Result<String> {
    let mut cmd = Command::new(XORRISO);
    cmd.arg("-indev")
        .arg(source)
        .arg("-report_el_torito")
        .arg("as_mkisofs");
    Ok(expect_success(&mut cmd, CATALOG_TIMEOUT)?.stdout)
}

/// Argument list for mastering a new image: Rock Ridge for permissions,
/// the output path, then the replayed boot catalog arguments verbatim,
/// then the content tree.
pub fn master_args(output: &Path, boot_args: &[String], tree: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-as".into(),
        "mkisofs".into(),
        "-r".into(),
        "-o".into(),
        output.into(),
    ];
    args.extend(boot_args.iter().map(OsString::from));
    args.push(tree.into());
    args
}

/// Master a new image from `tree`. Returns the captured output without
/// checking the exit status; the caller surfaces both streams on failure.
pub fn master(output: &Path, boot_args: &[String], tree: &Path) -> Result<CmdOutput> {
    let mut cmd = Command::new(XORRISO);
    cmd.args(master_args(output, boot_args, tree));
    run_with_timeout(&mut cmd, MASTER_TIMEOUT)
}

fn expect_success(cmd: &mut Command, timeout: Duration) -> Result<CmdOutput> {
    let result = run_with_timeout(cmd, timeout)?;
    if !result.success() {
        bail!(
            "{:#?} failed with {}: {}",
            cmd,
            result.status,
            result.stderr.trim()
        );
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_master_args_replays_catalog_verbatim() {
        let boot_args = vec![
            "-V".to_string(),
            "Ubuntu-Server 22.04.4 LTS amd64".to_string(),
            "-b".to_string(),
            "isolinux/isolinux.bin".to_string(),
            "--grub2-mbr".to_string(),
            "--interval:local_fs:0s-15s:zero_mbrpt:''".to_string(),
        ];
        let args = master_args(
            &PathBuf::from("out.iso"),
            &boot_args,
            &PathBuf::from("/tmp/work/iso"),
        );
        assert_eq!(&args[..5], &["-as", "mkisofs", "-r", "-o", "out.iso"]);
        // every catalog token, in order, right after the output path
        let expected: Vec<OsString> = boot_args.iter().map(OsString::from).collect();
        assert_eq!(&args[5..11], &expected[..]);
        assert_eq!(args[11], OsString::from("/tmp/work/iso"));
        assert_eq!(args.len(), 12);
    }

    #[test]
    fn test_master_args_empty_catalog() {
        let args = master_args(&PathBuf::from("out.iso"), &[], &PathBuf::from("iso"));
        assert_eq!(&args[..], &["-as", "mkisofs", "-r", "-o", "out.iso", "iso"]);
    }
}
