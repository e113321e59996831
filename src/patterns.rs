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

//! Boot-config substitution rules, per boot-loader dialect.

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

lazy_static! {
    // Kernel invocation lines in GRUB configs, with or without the HWE
    // kernel and with or without a trailing "---" separator.
    static ref GRUB_LINUX_RE: Regex =
        Regex::new(r"(?m)(linux\s+/casper/(?:hwe-)?vmlinuz)(\s+---\s+|\s*$)").unwrap();
    static ref GRUB_LINUXEFI_RE: Regex =
        Regex::new(r"(?m)(linuxefi\s+/casper/(?:hwe-)?vmlinuz)(\s+---\s+|\s*$)").unwrap();
    static ref ISOLINUX_APPEND_RE: Regex = Regex::new(r"(append\s+)").unwrap();
    static ref MULTI_SPACE_RE: Regex = Regex::new(r"  +").unwrap();
}

/// HTTP endpoint the installer will fetch user-data/meta-data from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpEndpoint {
    pub ip: String,
    pub port: u16,
}

impl HttpEndpoint {
    /// The boot parameter that switches the installer to unattended mode.
    pub fn directive(&self) -> String {
        format!("autoinstall ds=nocloud-net;s=http://{}/", self)
    }
}

impl fmt::Display for HttpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// The boot-loader config syntaxes we know how to patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootDialect {
    /// BIOS boot via ISOLINUX/SYSLINUX.
    Isolinux,
    /// Legacy GRUB configs under boot/grub.
    Grub,
    /// GRUB configs on the EFI system partition path.
    GrubEfi,
}

impl BootDialect {
    pub const ALL: [BootDialect; 3] = [Self::Isolinux, Self::Grub, Self::GrubEfi];

    /// Known config locations for this dialect, relative to the extracted
    /// tree. Covers both the isolinux/ and syslinux/ historical layouts.
    /// Absent paths are skipped, not errors.
    pub fn config_paths(self) -> &'static [&'static str] {
        match self {
            Self::Isolinux => &[
                "isolinux/isolinux.cfg",
                "isolinux/txt.cfg",
                "syslinux/isolinux.cfg",
                "syslinux/txt.cfg",
            ],
            Self::Grub => &["boot/grub/grub.cfg", "boot/grub/loopback.cfg"],
            Self::GrubEfi => &["EFI/BOOT/grub.cfg"],
        }
    }
}

/// One substitution: a match pattern and its expansion. Pure data, no I/O.
pub struct PatchRule {
    regex: &'static Regex,
    replacement: String,
}

impl PatchRule {
    pub fn apply(&self, text: &str) -> String {
        self.regex
            .replace_all(text, self.replacement.as_str())
            .into_owned()
    }
}

/// The ordered rules for one dialect, bound to a concrete endpoint.
pub struct RuleSet {
    directive: String,
    rules: Vec<PatchRule>,
}

impl RuleSet {
    pub fn for_dialect(dialect: BootDialect, endpoint: &HttpEndpoint) -> Self {
        let directive = endpoint.directive();
        let rules = match dialect {
            BootDialect::Isolinux => vec![PatchRule {
                regex: &ISOLINUX_APPEND_RE,
                replacement: format!("${{1}}{directive} "),
            }],
            // Older EFI grub.cfg files use linuxefi, newer ones plain
            // linux, so both grub dialects carry both rules.
            BootDialect::Grub | BootDialect::GrubEfi => vec![
                PatchRule {
                    regex: &GRUB_LINUX_RE,
                    replacement: format!("${{1}} {directive}${{2}}"),
                },
                PatchRule {
                    regex: &GRUB_LINUXEFI_RE,
                    replacement: format!("${{1}} {directive}${{2}}"),
                },
            ],
        };
        Self { directive, rules }
    }

    pub fn directive(&self) -> &str {
        &self.directive
    }

    /// Apply every rule in order against the whole text, then collapse
    /// runs of spaces left behind by the templates.
    pub fn apply_all(&self, text: &str) -> String {
        let mut out = text.to_string();
        for rule in &self.rules {
            out = rule.apply(&out);
        }
        collapse_spaces(&out)
    }
}

/// Collapse any run of two or more spaces to one, file-globally.
pub fn collapse_spaces(text: &str) -> String {
    MULTI_SPACE_RE.replace_all(text, " ").into_owned()
}
