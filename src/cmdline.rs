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

use clap::Parser;
use log::warn;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::patterns::HttpEndpoint;

/// Environment variables taking priority over the endpoint flags, for use
/// from Packer templates and similar drivers.
pub const HTTP_IP_VAR: &str = "PACKER_HTTP_IP";
pub const HTTP_PORT_VAR: &str = "PACKER_HTTP_PORT";

const OUTPUT_SUFFIX: &str = "-autoinstall.iso";

// Args are listed in --help in the order declared in this struct.
// Please keep the entire help text to 80 columns.

/// Remaster an Ubuntu Server ISO for unattended network installation
#[derive(Debug, Parser)]
#[command(version)]
pub struct BuildConfig {
    /// Source Ubuntu Server ISO
    #[arg(value_name = "ISO")]
    pub source: PathBuf,
    /// Output ISO path
    ///
    /// Defaults to the source file name with "-autoinstall.iso" appended,
    /// in the current directory.
    #[arg(short, long, value_name = "path")]
    pub output: Option<PathBuf>,
    /// IP of the HTTP server hosting user-data/meta-data
    ///
    /// The PACKER_HTTP_IP environment variable takes priority.
    #[arg(long, value_name = "ip", default_value = "10.0.2.2")]
    pub http_ip: String,
    /// Port of the HTTP server
    ///
    /// The PACKER_HTTP_PORT environment variable takes priority.
    #[arg(long, value_name = "port", default_value_t = 8080)]
    pub http_port: u16,
    /// Validate the source ISO and exit without building
    #[arg(long)]
    pub validate_only: bool,
    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl BuildConfig {
    /// Endpoint for the autoinstall directive, with environment variables
    /// overriding the flags.
    pub fn endpoint(&self) -> HttpEndpoint {
        let ip = match env::var(HTTP_IP_VAR) {
            Ok(ip) if !ip.is_empty() => ip,
            _ => self.http_ip.clone(),
        };
        let port = match env::var(HTTP_PORT_VAR) {
            Ok(port) if !port.is_empty() => port.parse().unwrap_or_else(|_| {
                warn!("ignoring unparseable {}={:?}", HTTP_PORT_VAR, port);
                self.http_port
            }),
            _ => self.http_port,
        };
        HttpEndpoint { ip, port }
    }

    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => default_output(&self.source),
        }
    }
}

fn default_output(source: &Path) -> PathBuf {
    let mut name = source
        .file_stem()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("output"));
    name.push(OUTPUT_SUFFIX);
    PathBuf::from(name)
}
