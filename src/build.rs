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

//! The build pipeline: inspect, extract, patch, remaster.

use anyhow::{anyhow, bail, Context, Result};
use log::info;
use std::io::Write;

use crate::cmdline::BuildConfig;
use crate::{extract, inspect, patch, rebuild, xorriso};

/// Run one build end to end. The working tree lives in a scoped temporary
/// directory that is removed on every exit path, success or failure.
pub fn build(config: &BuildConfig) -> Result<()> {
    which::which(xorriso::XORRISO)
        .map_err(|_| anyhow!("required tool not found on PATH: {}", xorriso::XORRISO))?;
    if !config.source.exists() {
        bail!("source image not found: {}", config.source.display());
    }

    let work_dir = tempfile::Builder::new()
        .prefix("ubuntu-autoinstall-")
        .tempdir()
        .context("creating working directory")?;

    let report = inspect::inspect(&config.source, work_dir.path());

    if config.validate_only {
        let mut stdout = std::io::stdout().lock();
        serde_json::to_writer_pretty(&mut stdout, &report).context("writing report")?;
        writeln!(stdout).context("writing report")?;
        info!("validation complete");
        return Ok(());
    }

    let output = config.output_path();
    if output.exists() {
        info!("output image already exists: {}", output.display());
        return Ok(());
    }

    let endpoint = config.endpoint();
    info!(
        "building autoinstall image for Ubuntu {} ({})",
        report.version, report.format
    );
    info!("HTTP server: {}", endpoint);
    info!("ensure your HTTP server serves:");
    info!("  http://{}/user-data", endpoint);
    info!("  http://{}/meta-data", endpoint);

    let iso_dir = work_dir.path().join("iso");
    extract::extract_iso(&config.source, &iso_dir)?;
    inspect::boot_support(&iso_dir);
    patch::patch_boot_configs(&iso_dir, &endpoint);
    rebuild::rebuild_iso(&config.source, &iso_dir, &output)?;

    info!("build complete: {}", output.display());
    Ok(())
}
