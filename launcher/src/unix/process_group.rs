//! Process-group helpers for the unix backend.
//!
//! Every launched process leads its own group, so the group id equals the
//! launched pid and reaches any children it starts.

use std::io;

/// Sends `SIGKILL` to the whole group. A group that is already gone is not an
/// error.
pub(crate) fn kill_process_group(process_group_id: u32) -> io::Result<()> {
    let pgid = process_group_id as libc::pid_t;
    let result = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if result == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    Ok(())
}

/// Whether any live process is left in the group. Zombies do not count.
#[cfg(target_os = "linux")]
pub(crate) fn group_alive(process_group_id: u32) -> bool {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return group_answers_signals(process_group_id);
    };
    entries.flatten().any(|entry| {
        let is_pid = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.bytes().all(|b| b.is_ascii_digit()));
        is_pid
            && std::fs::read_to_string(entry.path().join("stat"))
                .ok()
                .and_then(|stat| state_and_group(&stat))
                .is_some_and(|(state, pgrp)| state != 'Z' && pgrp == process_group_id)
    })
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn group_alive(process_group_id: u32) -> bool {
    group_answers_signals(process_group_id)
}

#[cfg_attr(target_os = "linux", allow(dead_code))]
fn group_answers_signals(process_group_id: u32) -> bool {
    let pgid = process_group_id as libc::pid_t;
    if unsafe { libc::kill(-pgid, 0) } == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// State and process group from `/proc/<pid>/stat`. The command name may
/// contain spaces and parentheses, so fields are read after the last `)`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn state_and_group(stat: &str) -> Option<(char, u32)> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let _ppid = fields.next()?;
    let pgrp = fields.next()?.parse().ok()?;
    Some((state, pgrp))
}

/// Applies a nice value to the calling process. Intended for `pre_exec`;
/// raising priority without the right to do so is ignored.
pub(crate) fn set_nice(nice: i32) {
    unsafe {
        libc::setpriority(libc::PRIO_PROCESS as _, 0, nice);
    }
}
