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

//! Mastering the patched tree into a new bootable image.
//!
//! The boot catalog is never constructed by hand. The source image's own
//! catalog is reported as a replayable mkisofs argument list and passed
//! through verbatim, so the new image keeps the exact boot layout of the
//! original on both BIOS and UEFI firmware.

use anyhow::{bail, Context, Result};
use log::{error, info};
use std::fs;
use std::path::Path;

use crate::xorriso;

const MIN_IMAGE_BYTES: u64 = 1024 * 1024;

/// Extract the boot-catalog argument list from the source image.
/// The tokens are opaque; they are only ever replayed, never parsed.
pub fn boot_catalog_args(source: &Path) -> Result<Vec<String>> {
    let report = xorriso::boot_catalog_report(source)
        .context("extracting boot information from source image")?;
    let args = split_shell_words(report.trim());
    info!("extracted {} boot catalog arguments", args.len());
    Ok(args)
}

/// Master the new image from `iso_dir`, replaying the source's boot
/// catalog. Fatal on tool failure, and on a missing or implausibly small
/// output even when the tool reported success.
pub fn rebuild_iso(source: &Path, iso_dir: &Path, output: &Path) -> Result<()> {
    let boot_args = boot_catalog_args(source)?;

    info!("creating new image with replicated boot structure...");
    let result = xorriso::master(output, &boot_args, iso_dir)?;
    if !result.success() {
        error!("xorriso failed with {}", result.status);
        error!("xorriso stdout:\n{}", result.stdout);
        error!("xorriso stderr:\n{}", result.stderr);
        bail!("image mastering failed");
    }

    let size = fs::metadata(output)
        .context("output image was not created")?
        .len();
    if size < MIN_IMAGE_BYTES {
        bail!("output image seems too small: {} bytes", size);
    }
    info!(
        "created {} ({:.1} MiB)",
        output.display(),
        size as f64 / (1024.0 * 1024.0)
    );
    Ok(())
}

/// Split a command-line report into tokens, honoring shell-style single
/// and double quotes and backslash escapes. Malformed input (e.g. an
/// unterminated quote) is taken literally rather than rejected.
fn split_shell_words(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();
    'outer: while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                for c in chars.by_ref() {
                    if c == '\'' {
                        continue 'outer;
                    }
                    current.push(c);
                }
                break;
            }
            '"' => {
                in_word = true;
                while let Some(c) = chars.next() {
                    match c {
                        '"' => continue 'outer,
                        // in double quotes a backslash only escapes a
                        // backslash or the closing quote; anything else
                        // keeps the backslash literally
                        '\\' => match chars.next() {
                            Some(escaped @ ('\\' | '"')) => current.push(escaped),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => current.push('\\'),
                        },
                        _ => current.push(c),
                    }
                }
                break;
            }
            '\\' => {
                in_word = true;
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            _ => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_words() {
        assert_eq!(
            split_shell_words("-b isolinux/isolinux.bin -no-emul-boot"),
            vec!["-b", "isolinux/isolinux.bin", "-no-emul-boot"]
        );
    }

    #[test]
    fn test_split_quoted_words() {
        assert_eq!(
            split_shell_words("-V 'Ubuntu-Server 22.04.4 LTS amd64' -e \"boot grub/efi.img\""),
            vec!["-V", "Ubuntu-Server 22.04.4 LTS amd64", "-e", "boot grub/efi.img"]
        );
    }

    #[test]
    fn test_split_multiline_report() {
        // xorriso emits the argument list across several lines
        assert_eq!(
            split_shell_words("-V 'X'\n-b isolinux/isolinux.bin\n  -boot-load-size 4\n"),
            vec!["-V", "X", "-b", "isolinux/isolinux.bin", "-boot-load-size", "4"]
        );
    }

    #[test]
    fn test_split_escapes_and_adjacent_quotes() {
        assert_eq!(split_shell_words(r"a\ b c"), vec!["a b", "c"]);
        assert_eq!(split_shell_words("--interval:'0s-15s':''"), vec!["--interval:0s-15s:"]);
        assert_eq!(split_shell_words("\"a\\\"b\""), vec!["a\"b"]);
        assert_eq!(split_shell_words(r#""a\\b""#), vec![r"a\b"]);
        // a backslash before an ordinary character stays literal in
        // double quotes
        assert_eq!(split_shell_words(r#""a\nb""#), vec![r"a\nb"]);
        assert_eq!(split_shell_words(r#""trailing\"#), vec![r"trailing\"]);
    }

    #[test]
    fn test_split_empty_and_malformed() {
        assert!(split_shell_words("").is_empty());
        assert!(split_shell_words("   \n ").is_empty());
        // unterminated quote: taken literally to the end
        assert_eq!(split_shell_words("-V 'oops"), vec!["-V", "oops"]);
    }
}
