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

//! Read-only inspection of the source image.
//!
//! Every operation here is best-effort: a failure degrades to a sentinel
//! value and a logged warning, never a build abort.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::xorriso;

const VERSION_UNKNOWN: &str = "Unknown";
const DEFAULT_VOLUME_LABEL: &str = "Ubuntu";

lazy_static! {
    static ref VERSION_RE: Regex = Regex::new(r"\d{2}\.\d{2}").unwrap();
    static ref VOLUME_ID_RE: Regex = Regex::new(r"Volume id\s+:\s+'([^']+)'").unwrap();
}

/// Image classification by marker paths, first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IsoFormat {
    #[serde(rename = "Live Server")]
    LiveServer,
    #[serde(rename = "GRUB EFI")]
    GrubEfi,
    #[serde(rename = "Legacy Boot")]
    LegacyBoot,
    Unknown,
}

impl fmt::Display for IsoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LiveServer => "Live Server",
            Self::GrubEfi => "GRUB EFI",
            Self::LegacyBoot => "Legacy Boot",
            Self::Unknown => "Unknown",
        })
    }
}

#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub version: String,
    pub format: IsoFormat,
    pub volume_label: String,
}

/// Inspect the source image. `scratch` holds the temporary single-file
/// extraction used for version detection.
pub fn inspect(source: &Path, scratch: &Path) -> InspectReport {
    let report = InspectReport {
        version: detect_version(source, scratch),
        format: detect_format(source),
        volume_label: volume_label(source),
    };
    info!("detected Ubuntu version: {}", report.version);
    info!("detected image format: {}", report.format);
    info!("volume label: {}", report.volume_label);
    report
}

/// Ubuntu release number (NN.NN) from the /.disk/info metadata file.
pub fn detect_version(source: &Path, scratch: &Path) -> String {
    match try_detect_version(source, scratch) {
        Ok(Some(version)) => version,
        Ok(None) => VERSION_UNKNOWN.to_string(),
        Err(e) => {
            warn!("could not detect version: {:#}", e);
            VERSION_UNKNOWN.to_string()
        }
    }
}

fn try_detect_version(source: &Path, scratch: &Path) -> Result<Option<String>> {
    let dest = scratch.join("info.txt");
    xorriso::extract_file(source, "/.disk/info", &dest)?;
    let raw = fs::read(&dest).with_context(|| format!("reading {}", dest.display()))?;
    let text = String::from_utf8_lossy(&raw);
    Ok(VERSION_RE.find(&text).map(|m| m.as_str().to_string()))
}

pub fn detect_format(source: &Path) -> IsoFormat {
    match xorriso::list_files(source) {
        Ok(listing) => classify_listing(&listing),
        Err(e) => {
            warn!("could not detect format: {:#}", e);
            IsoFormat::Unknown
        }
    }
}

fn classify_listing(listing: &str) -> IsoFormat {
    if listing.contains("casper/vmlinuz") {
        IsoFormat::LiveServer
    } else if listing.contains("boot/grub") {
        IsoFormat::GrubEfi
    } else if listing.contains("1-Boot-NoEmul.img") {
        IsoFormat::LegacyBoot
    } else {
        IsoFormat::Unknown
    }
}

/// Volume id from xorriso's diagnostic report.
pub fn volume_label(source: &Path) -> String {
    match xorriso::volume_report(source) {
        Ok(diagnostics) => parse_volume_id(&diagnostics)
            .unwrap_or_else(|| DEFAULT_VOLUME_LABEL.to_string()),
        Err(e) => {
            warn!("could not extract volume label: {:#}", e);
            DEFAULT_VOLUME_LABEL.to_string()
        }
    }
}

fn parse_volume_id(diagnostics: &str) -> Option<String> {
    VOLUME_ID_RE
        .captures(diagnostics)
        .map(|caps| caps[1].to_string())
}

/// Firmware boot paths present in the extracted tree. Both, either, or
/// neither may be available.
#[derive(Debug, Clone, Copy)]
pub struct BootSupport {
    pub uefi: bool,
    pub bios: bool,
}

pub fn boot_support(iso_dir: &Path) -> BootSupport {
    // 22.04+ ships EFI/boot/bootx64.efi instead of boot/grub/efi.img
    let support = BootSupport {
        uefi: iso_dir.join("boot/grub/efi.img").exists()
            || iso_dir.join("EFI/boot/bootx64.efi").exists(),
        bios: iso_dir.join("isolinux/isolinux.bin").exists(),
    };
    info!(
        "boot structure - UEFI: {}, BIOS: {}",
        if support.uefi { "yes" } else { "no" },
        if support.bios { "yes" } else { "no" }
    );
    support
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_classify_listing_priority() {
        assert_eq!(classify_listing("'/casper/vmlinuz'\n"), IsoFormat::LiveServer);
        // live-server marker wins over the grub marker
        assert_eq!(
            classify_listing("'/boot/grub/grub.cfg'\n'/casper/vmlinuz'\n"),
            IsoFormat::LiveServer
        );
        assert_eq!(classify_listing("'/boot/grub/grub.cfg'\n"), IsoFormat::GrubEfi);
        assert_eq!(
            classify_listing("'/1-Boot-NoEmul.img'\n"),
            IsoFormat::LegacyBoot
        );
        assert_eq!(classify_listing("'/README.txt'\n"), IsoFormat::Unknown);
    }

    #[test]
    fn test_parse_volume_id() {
        let diagnostics = "xorriso : NOTE : Loading ISO image tree\n\
                           Volume id    : 'Ubuntu-Server 22.04.4 LTS amd64'\n";
        assert_eq!(
            parse_volume_id(diagnostics).as_deref(),
            Some("Ubuntu-Server 22.04.4 LTS amd64")
        );
        assert_eq!(parse_volume_id("no volume line here"), None);
    }

    #[test]
    fn test_version_pattern() {
        assert_eq!(
            VERSION_RE
                .find("Ubuntu-Server 22.04.4 LTS \"Jammy Jellyfish\"")
                .map(|m| m.as_str()),
            Some("22.04")
        );
        assert!(VERSION_RE.find("no version").is_none());
    }

    #[test]
    fn test_boot_support_detection() {
        let dir = tempdir().unwrap();
        let support = boot_support(dir.path());
        assert!(!support.uefi);
        assert!(!support.bios);

        fs::create_dir_all(dir.path().join("EFI/boot")).unwrap();
        fs::write(dir.path().join("EFI/boot/bootx64.efi"), b"efi").unwrap();
        fs::create_dir_all(dir.path().join("isolinux")).unwrap();
        fs::write(dir.path().join("isolinux/isolinux.bin"), b"bios").unwrap();

        let support = boot_support(dir.path());
        assert!(support.uefi);
        assert!(support.bios);
    }
}
