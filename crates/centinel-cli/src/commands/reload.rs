use crate::error::Result;
use tracing::info;

/// Sends `SIGHUP` to a running engine process, the same signal an operator
/// would send by hand. The engine re-reads its configuration file in place
/// on receipt; this command does not wait for that to finish.
pub fn execute(pid: i32) -> Result<()> {
    info!(pid, "sending SIGHUP");
    let status = std::process::Command::new("kill")
        .arg("-HUP")
        .arg(pid.to_string())
        .status()?;
    if !status.success() {
        return Err(std::io::Error::new(std::io::ErrorKind::Other, format!("kill -HUP {pid} failed: {status}")).into());
    }
    Ok(())
}
