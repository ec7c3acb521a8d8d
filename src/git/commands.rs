//! Git subprocess wrappers using [`tokio::process::Command`].
//!
//! Both operations shell out to the system `git` binary in stateless-RPC
//! mode against a repository directory on disk.  One subprocess is spawned
//! per request and never reused; the protocol has no resumption concept, so
//! a failed invocation simply fails that request.

use std::path::Path;
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use tokio::process::{Child, Command};
use tracing::{debug, instrument};

// ---------------------------------------------------------------------------
// Reference advertisement
// ---------------------------------------------------------------------------

/// Run `git upload-pack --stateless-rpc --advertise-refs <repo>` and return
/// its complete stdout.
///
/// The output is the raw reference advertisement; the caller is responsible
/// for the smart HTTP service-header framing around it.
#[instrument(fields(repo = %repo_path.display()))]
pub async fn advertise_refs(repo_path: &Path) -> Result<Vec<u8>> {
    let mut cmd = Command::new("git");
    cmd.arg("upload-pack")
        .arg("--stateless-rpc")
        .arg("--advertise-refs")
        .arg(repo_path);
    cmd.current_dir(repo_path);

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    debug!("spawning git upload-pack --advertise-refs");

    let output = cmd
        .output()
        .await
        .context("failed to spawn git upload-pack --advertise-refs")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "git upload-pack --advertise-refs failed (status {}): {}",
            output.status,
            stderr.trim(),
        );
    }

    Ok(output.stdout)
}

// ---------------------------------------------------------------------------
// Upload-pack (streamed)
// ---------------------------------------------------------------------------

/// Spawn `git upload-pack --stateless-rpc <repo>` and return the [`Child`]
/// process handle.
///
/// The caller is responsible for writing the negotiation body to
/// `child.stdin` and streaming `child.stdout` to the client.  This avoids
/// buffering the pack in memory; back-pressure flows through the pipe.
#[instrument(fields(repo = %repo_path.display()))]
pub async fn upload_pack_streamed(repo_path: &Path) -> Result<Child> {
    let mut cmd = Command::new("git");
    cmd.arg("upload-pack").arg("--stateless-rpc").arg(repo_path);
    cmd.current_dir(repo_path);

    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let child = cmd.spawn().context("failed to spawn git upload-pack")?;

    Ok(child)
}
