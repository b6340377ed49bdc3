// src/unpack/script.rs

//! Package script execution
//!
//! Scripts are run synchronously; the unpack engine only looks at the exit
//! code.

use crate::error::{Error, Result};
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Interpreter used to run package scripts
const SHELL: &str = "/bin/sh";

/// Arguments handed to a package script
#[derive(Debug, Clone, Copy)]
pub struct ScriptArgs<'a> {
    /// Script target, e.g. `pre`
    pub action: &'a str,
    pub pkgname: &'a str,
    pub version: &'a str,
    pub update: bool,
    /// Configuration file override, passed through when set
    pub conffile: Option<&'a Path>,
    /// Working directory of the script
    pub rootdir: &'a Path,
}

/// Runs package scripts
pub trait ScriptRunner {
    /// Run `script` to completion and return its exit code
    fn run(&self, script: &Path, args: &ScriptArgs<'_>) -> Result<i32>;
}

/// Runs scripts through `/bin/sh` inside the root directory
///
/// Invocation: `sh <script> <action> <pkgname> <version> <yes|no> [conffile]`
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellScriptRunner;

impl ScriptRunner for ShellScriptRunner {
    fn run(&self, script: &Path, args: &ScriptArgs<'_>) -> Result<i32> {
        debug!(
            "Running {} {} for {}-{}",
            script.display(),
            args.action,
            args.pkgname,
            args.version
        );

        let mut cmd = Command::new(SHELL);
        cmd.arg(script)
            .arg(args.action)
            .arg(args.pkgname)
            .arg(args.version)
            .arg(if args.update { "yes" } else { "no" })
            .current_dir(args.rootdir);
        if let Some(conffile) = args.conffile {
            cmd.arg(conffile);
        }

        let status = cmd.status().map_err(|e| {
            Error::IoError(format!("failed to execute `{}': {}", script.display(), e))
        })?;

        // Killed by a signal: report it the way shells do
        Ok(status
            .code()
            .unwrap_or_else(|| 128 + status.signal().unwrap_or(0)))
    }
}
