//! Server control
//!
//! ⚙️ Runs the server binary to read its version, test the configuration
//! and reload it.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use vhostmng_core::{Error, Result};

/// Operations the deploy flow needs from the running server
pub trait ServerControl {
    /// Version reported by the server binary
    fn version(&self) -> Result<String>;

    /// Check the configuration on disk
    fn test_configuration(&self) -> Result<()>;

    /// Reload the configuration on disk
    fn restart(&self) -> Result<()>;
}

/// ⚙️ [`ServerControl`] through the server's command line (`-v`, `-t`,
/// `-s reload`)
#[derive(Debug, Clone)]
pub struct BinaryControl {
    bin: PathBuf,
}

impl BinaryControl {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    pub fn bin(&self) -> &Path {
        &self.bin
    }

    /// Run the binary and return its combined stdout and stderr
    fn exec(&self, args: &[&str]) -> Result<String> {
        let command = format!("{} {}", self.bin.display(), args.join(" "));
        tracing::debug!("⚙️ Running {}", command);

        let output = Command::new(&self.bin)
            .args(args)
            .output()
            .map_err(|e| Error::Command {
                command: command.clone(),
                output: e.to_string(),
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(Error::Command {
                command,
                output: combined.trim().to_string(),
            });
        }
        Ok(combined)
    }
}

impl ServerControl for BinaryControl {
    fn version(&self) -> Result<String> {
        let output = self.exec(&["-v"])?;
        parse_version(&output)
    }

    fn test_configuration(&self) -> Result<()> {
        self.exec(&["-t"]).map(|_| ())
    }

    fn restart(&self) -> Result<()> {
        self.exec(&["-s", "reload"])?;
        tracing::info!("🔄 Server reloaded");
        Ok(())
    }
}

/// Extract `x.y.z` from output such as `nginx version: nginx/1.24.0`
pub fn parse_version(output: &str) -> Result<String> {
    let pattern = Regex::new(r"[A-Za-z]+/(\d+\.\d+\.\d+)").map_err(|e| Error::Internal(e.to_string()))?;
    pattern
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| Error::NotFound(format!("version in {:?}", output.trim())))
}
