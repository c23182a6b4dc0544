//! Forced termination of a running invocation.
//!
//! Two strategies exist: [`GroupKill`] starts each child in its own process
//! group and kills the whole group, so grandchildren die with it.
//! [`DirectKill`] only kills the immediate child and is used where process
//! groups are unavailable. [`PlatformKill`] picks one at build time.

use tokio::process::{Child, Command};

/// Capability to forcibly stop a child process started by the runner.
pub trait KillStrategy: Send + Sync {
    /// Adjust the command before it is spawned.
    fn prepare(&self, cmd: &mut Command);

    /// Kill the child (and, if supported, everything it spawned).
    ///
    /// Best-effort and asynchronous: the caller still has to wait on the
    /// child to observe its exit.
    fn kill(&self, child: &mut Child);
}

/// Kills only the direct child.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectKill;

impl KillStrategy for DirectKill {
    fn prepare(&self, _cmd: &mut Command) {}

    fn kill(&self, child: &mut Child) {
        if let Err(e) = child.start_kill() {
            tracing::debug!("Failed to kill child: {}", e);
        }
    }
}

/// Kills the child's whole process group with `SIGKILL`.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupKill;

#[cfg(unix)]
impl KillStrategy for GroupKill {
    fn prepare(&self, cmd: &mut Command) {
        // New group led by the child itself
        cmd.process_group(0);
    }

    fn kill(&self, child: &mut Child) {
        // Already reaped
        let Some(pid) = child.id() else {
            return;
        };

        // The child leads its own group, so its pid is the pgid.
        let result = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if result == -1 {
            let err = std::io::Error::last_os_error();
            // ESRCH means the group is already gone
            if err.raw_os_error() != Some(libc::ESRCH) {
                tracing::warn!("Failed to kill process group {}: {}", pid, err);
            }
            DirectKill.kill(child);
        }
    }
}

/// Strategy used by default on this platform.
#[cfg(unix)]
pub type PlatformKill = GroupKill;

/// Strategy used by default on this platform.
#[cfg(not(unix))]
pub type PlatformKill = DirectKill;

#[cfg(all(test, unix))]
mod tests {
    use std::process::Stdio;
    use std::time::Duration;

    use super::*;

    fn sleeper(script: &str) -> Command {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(script).stdout(Stdio::null());
        cmd
    }

    /// A zombie waiting for its new parent to reap it counts as dead.
    fn is_alive(pid: libc::pid_t) -> bool {
        if unsafe { libc::kill(pid, 0) } == -1 {
            return false;
        }
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit_once(") ")
                .is_none_or(|(_, rest)| !rest.starts_with('Z')),
            Err(_) => true,
        }
    }

    #[tokio::test]
    async fn test_direct_kill_terminates_child() {
        let mut cmd = sleeper("sleep 30");
        DirectKill.prepare(&mut cmd);
        let mut child = cmd.spawn().unwrap();

        DirectKill.kill(&mut child);
        let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .expect("child should exit after kill")
            .unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_group_kill_takes_down_grandchildren() {
        let temp = tempfile::TempDir::new().unwrap();
        let pid_file = temp.path().join("grandchild.pid");
        let script = format!("sleep 30 & echo $! > {}; wait", pid_file.display());

        let mut cmd = sleeper(&script);
        GroupKill.prepare(&mut cmd);
        let mut child = cmd.spawn().unwrap();

        // Wait for the grandchild to report in
        let mut grandchild = None;
        for _ in 0..100 {
            if let Ok(text) = std::fs::read_to_string(&pid_file)
                && let Ok(pid) = text.trim().parse::<libc::pid_t>()
            {
                grandchild = Some(pid);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let grandchild = grandchild.expect("grandchild pid");

        GroupKill.kill(&mut child);
        tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .expect("child should exit after kill")
            .unwrap();

        // The grandchild was reparented, so poll until it disappears.
        let mut gone = false;
        for _ in 0..100 {
            if !is_alive(grandchild) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(gone, "grandchild {} survived group kill", grandchild);
    }

    #[tokio::test]
    async fn test_group_kill_child_leads_its_own_group() {
        let mut cmd = sleeper("sleep 30");
        GroupKill.prepare(&mut cmd);
        let mut child = cmd.spawn().unwrap();
        let pid = child.id().unwrap() as libc::pid_t;

        let pgid = unsafe { libc::getpgid(pid) };
        let own = unsafe { libc::getpgid(0) };
        assert_eq!(pgid, pid);
        assert_ne!(pgid, own);

        GroupKill.kill(&mut child);
        child.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_group_kill_after_exit_is_harmless() {
        let mut cmd = sleeper("true");
        GroupKill.prepare(&mut cmd);
        let mut child = cmd.spawn().unwrap();
        child.wait().await.unwrap();

        GroupKill.kill(&mut child);
    }
}
