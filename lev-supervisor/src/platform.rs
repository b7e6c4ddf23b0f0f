//! OS-level liveness checks and signal delivery

use crate::error::{Result, SupervisorError};

/// What the OS currently says about a pid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Probe {
    /// A process with this pid exists (zombies included)
    pub exists: bool,
    /// The process has exited but not been reaped
    pub zombie: bool,
    /// OS start time, when available
    pub start_signature: Option<u64>,
}

/// Whether a recorded pid still refers to the process that was launched
///
/// A recorded start signature must match the current one on platforms that
/// expose signatures; elsewhere existence and zombie state decide.
pub(crate) fn is_alive(pid: u32, recorded_signature: Option<u64>) -> bool {
    let probe = probe(pid);
    if !probe.exists || probe.zombie {
        return false;
    }

    match recorded_signature {
        Some(recorded) if signatures_supported() => probe.start_signature == Some(recorded),
        _ => true,
    }
}

/// Fields of `/proc/<pid>/stat` the supervisor cares about
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProcStat {
    pub state: char,
    pub start_time: u64,
}

/// Parse a `/proc/<pid>/stat` line
///
/// The command name is parenthesised and may itself contain spaces or `)`,
/// so fields are counted from the last `)`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn parse_proc_stat(stat: &str) -> Option<ProcStat> {
    let end = stat.rfind(')')?;
    let rest = stat.get(end + 1..)?;
    let mut fields = rest.split_whitespace();

    let state = fields.next()?.chars().next()?;
    // starttime is field 22; `state` was field 3
    let start_time = fields.nth(18)?.parse().ok()?;

    Some(ProcStat { state, start_time })
}

#[cfg(target_os = "linux")]
fn read_proc_stat(pid: u32) -> Option<ProcStat> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    parse_proc_stat(&stat)
}

#[cfg(target_os = "linux")]
fn signatures_supported() -> bool {
    true
}

#[cfg(not(target_os = "linux"))]
fn signatures_supported() -> bool {
    false
}

/// Start signature of a freshly launched pid
pub(crate) fn start_signature(pid: u32) -> Option<u64> {
    probe(pid).start_signature
}

#[cfg(unix)]
fn pid_exists(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }

    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        // Exists but owned by someone else
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
pub(crate) fn probe(pid: u32) -> Probe {
    let exists = pid_exists(pid);
    if !exists {
        return Probe {
            exists,
            zombie: false,
            start_signature: None,
        };
    }

    match read_proc_stat(pid) {
        Some(stat) => Probe {
            exists,
            zombie: stat.state == 'Z' || stat.state == 'X',
            start_signature: Some(stat.start_time),
        },
        // Vanished between the two checks
        None => Probe {
            exists: false,
            zombie: false,
            start_signature: None,
        },
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
pub(crate) fn probe(pid: u32) -> Probe {
    Probe {
        exists: pid_exists(pid),
        zombie: false,
        start_signature: None,
    }
}

#[cfg(not(unix))]
pub(crate) fn probe(_pid: u32) -> Probe {
    Probe {
        exists: false,
        zombie: false,
        start_signature: None,
    }
}

/// Outcome of signal delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Delivered to the whole process group
    Group,
    /// Delivered to the pid only
    Pid,
    /// Nothing left to signal
    Gone,
}

/// Normalise a signal name (`TERM`, `sigterm`, `SIGTERM`, `15`) to `SIGxxx`
pub(crate) fn normalize_signal(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SupervisorError::InvalidSignal(name.to_string()));
    }

    let upper = trimmed.to_ascii_uppercase();
    let canonical = if let Ok(number) = upper.parse::<i32>() {
        numbered_signal(number).ok_or_else(|| SupervisorError::InvalidSignal(name.to_string()))?
    } else if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{}", upper)
    };

    check_signal(&canonical).map_err(|_| SupervisorError::InvalidSignal(name.to_string()))?;
    Ok(canonical)
}

#[cfg(unix)]
fn numbered_signal(number: i32) -> Option<String> {
    nix::sys::signal::Signal::try_from(number)
        .ok()
        .map(|s| s.as_str().to_string())
}

#[cfg(not(unix))]
fn numbered_signal(_number: i32) -> Option<String> {
    None
}

#[cfg(unix)]
fn check_signal(canonical: &str) -> std::result::Result<(), ()> {
    canonical
        .parse::<nix::sys::signal::Signal>()
        .map(|_| ())
        .map_err(|_| ())
}

#[cfg(not(unix))]
fn check_signal(canonical: &str) -> std::result::Result<(), ()> {
    matches!(canonical, "SIGTERM" | "SIGKILL" | "SIGINT")
        .then_some(())
        .ok_or(())
}

/// Send a signal to the process group led by `pid`, falling back to `pid`
///
/// A target that no longer exists is not an error.
#[cfg(unix)]
pub(crate) fn send_signal(pid: u32, signal: &str) -> Result<Delivery> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill, killpg};
    use nix::unistd::Pid;

    let signal: Signal = signal
        .parse()
        .map_err(|_| SupervisorError::InvalidSignal(signal.to_string()))?;
    let raw = i32::try_from(pid).map_err(|_| SupervisorError::UnknownProcess(pid.to_string()))?;
    let target = Pid::from_raw(raw);

    match killpg(target, signal) {
        Ok(()) => return Ok(Delivery::Group),
        Err(Errno::ESRCH) | Err(Errno::EPERM) => {}
        Err(e) => {
            return Err(SupervisorError::Signal {
                pid,
                source: std::io::Error::from(e),
            });
        }
    }

    match kill(target, signal) {
        Ok(()) => Ok(Delivery::Pid),
        Err(Errno::ESRCH) => Ok(Delivery::Gone),
        Err(e) => Err(SupervisorError::Signal {
            pid,
            source: std::io::Error::from(e),
        }),
    }
}

#[cfg(not(unix))]
pub(crate) fn send_signal(_pid: u32, _signal: &str) -> Result<Delivery> {
    Err(SupervisorError::Unsupported("Signalling processes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "4242 (my (weird) cmd) S 1 4242 4242 0 -1 4194560 120 0 0 0 3 1 0 0 20 0 1 0 987654 12345678 300 18446744073709551615 1 1 0 0 0 0 0 0 0 0 0 0 17 2 0 0 0 0 0";

    #[test]
    fn test_parse_proc_stat_handles_parens_in_name() {
        let stat = parse_proc_stat(SAMPLE).unwrap();
        assert_eq!(stat.state, 'S');
        assert_eq!(stat.start_time, 987654);
    }

    #[test]
    fn test_parse_proc_stat_rejects_truncated() {
        assert!(parse_proc_stat("12 (sh) S 1 2").is_none());
        assert!(parse_proc_stat("garbage").is_none());
    }

    #[test]
    fn test_normalize_signal_names() {
        assert_eq!(normalize_signal("SIGTERM").unwrap(), "SIGTERM");
        assert_eq!(normalize_signal("term").unwrap(), "SIGTERM");
        assert!(normalize_signal("SIGNOPE").is_err());
        assert!(normalize_signal("").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_normalize_numbered_signal() {
        assert_eq!(normalize_signal("9").unwrap(), "SIGKILL");
    }

    #[cfg(unix)]
    #[test]
    fn test_current_process_is_alive() {
        let pid = std::process::id();
        let signature = start_signature(pid);
        assert!(is_alive(pid, signature));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_mismatched_signature_is_not_alive() {
        let pid = std::process::id();
        let signature = start_signature(pid).unwrap();
        assert!(!is_alive(pid, Some(signature + 1)));
    }

    #[cfg(unix)]
    #[test]
    fn test_absent_pid_is_not_alive() {
        // Above any configurable pid_max
        assert!(!is_alive(2_147_483_000, None));
    }
}
