// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The init path: what the re-executed child does before exec'ing the user
//! command.
//!
//! Entered when the binary starts with `JOBLET_MODE=init`. Strictly
//! synchronous, std + nix only; no async runtime exists on this side.
//! Sequence: read the env contract, join the cgroup and apply limits, enter
//! namespaces, chroot into the runtime root, mount proc/sys/tmp and volumes,
//! drain uploads, exec. Every failure maps to one error class with its own
//! exit code and is reported as one line on the status pipe before exit.

use crate::cgroup;
use crate::env_abi::{EnvAbiError, InitConfig};
use crate::upload;
use crate::volumes::{ensure_target, MountFs, MountSpec};
use nix::mount::{mount, MsFlags};
use nix::sched::{setns, unshare, CloneFlags};
use nix::unistd::{chdir, chroot};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Deadline for each syscall-heavy init step.
const STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Closed set of init failure classes, one exit code each.
#[derive(Debug, Error)]
pub enum InitError {
    /// The env contract is unreadable. Exit 64.
    #[error("config missing: {0}")]
    ConfigMissing(String),

    /// Cgroup join, limit write, or namespace entry failed. Exit 65.
    #[error("resource setup failed: {0}")]
    ResourceSetup(String),

    /// A step exceeded its deadline. Exit 65 (a flavor of setup failure).
    #[error("resource setup timeout: {0}")]
    ResourceSetupTimeout(String),

    /// The upload stream did not deliver every declared byte. Exit 66.
    #[error("upload incomplete: {0}")]
    UploadIncomplete(String),

    /// Entering the job root failed. Exit 67.
    #[error("chroot failed: {0}")]
    ChrootFailed(String),

    /// The user command could not be exec'd. Exit 68.
    #[error("exec failed: {0}")]
    ExecFailed(String),

    /// Anything else. Exit 127.
    #[error("init error: {0}")]
    Generic(String),
}

impl InitError {
    pub fn exit_code(&self) -> i32 {
        match self {
            InitError::ConfigMissing(_) => 64,
            InitError::ResourceSetup(_) | InitError::ResourceSetupTimeout(_) => 65,
            InitError::UploadIncomplete(_) => 66,
            InitError::ChrootFailed(_) => 67,
            InitError::ExecFailed(_) => 68,
            InitError::Generic(_) => 127,
        }
    }
}

impl From<EnvAbiError> for InitError {
    fn from(e: EnvAbiError) -> Self {
        InitError::ConfigMissing(e.to_string())
    }
}

/// Run the init sequence. Returns the exit code on failure; on success the
/// process image is replaced by the user command and this never returns.
pub fn run() -> i32 {
    // Read the contract first so the status pipe path is known for reports.
    let config = match InitConfig::from_process_env() {
        Ok(config) => config,
        Err(e) => {
            let err = InitError::from(e);
            // The status pipe may be set even when the contract is broken.
            let pipe = std::env::var(crate::env_abi::JOB_STATUS_PIPE)
                .ok()
                .map(PathBuf::from);
            report_status(pipe.as_deref(), &err);
            return err.exit_code();
        }
    };

    let status_pipe = config.status_pipe.clone();
    match run_init(config) {
        Ok(never) => match never {},
        Err(err) => {
            report_status(status_pipe.as_deref(), &err);
            err.exit_code()
        }
    }
}

/// The sequence proper. `Ok` is uninhabited: success is exec.
fn run_init(config: InitConfig) -> Result<std::convert::Infallible, InitError> {
    let watchdog = StepWatchdog::start(config.status_pipe.clone());

    // Apply the limit files, then join the host cgroup, all before any
    // namespace entry while the host cgroupfs is still visible. Limits go
    // first so the process is never in the cgroup uncapped.
    if let Some(host_dir) = &config.cgroup_host_path {
        watchdog.enter("cgroup");
        cgroup::apply_limits(host_dir, &config.limits, config.io_device.as_deref())
            .map_err(|e| InitError::ResourceSetup(e.to_string()))?;
        cgroup::join(host_dir, std::process::id())
            .map_err(|e| InitError::ResourceSetup(e.to_string()))?;
    }

    // Namespaces: mount, PID, UTS, IPC, then net, then user.
    watchdog.enter("namespaces");
    let mut flags = CloneFlags::CLONE_NEWNS
        | CloneFlags::CLONE_NEWPID
        | CloneFlags::CLONE_NEWUTS
        | CloneFlags::CLONE_NEWIPC;
    if config.netns.is_none() {
        flags |= CloneFlags::CLONE_NEWNET;
    }
    unshare(flags).map_err(|e| InitError::ResourceSetup(format!("unshare: {e}")))?;

    if let Some(netns) = &config.netns {
        let path = PathBuf::from("/var/run/netns").join(netns);
        let file = std::fs::File::open(&path).map_err(|e| {
            InitError::ResourceSetup(format!("open netns {}: {e}", path.display()))
        })?;
        setns(&file, CloneFlags::CLONE_NEWNET)
            .map_err(|e| InitError::ResourceSetup(format!("setns {netns}: {e}")))?;
    }

    // Hostname inside the new UTS namespace; cosmetic, so best-effort.
    let _ = nix::unistd::sethostname(format!("joblet-{}", config.job_id.short(8)));

    enter_user_namespace()?;

    // Open the upload pipe while host paths are still reachable; the drain
    // itself happens after the root swap so files land inside it.
    let upload_reader = match config.upload.as_ref().and_then(|u| u.pipe.as_ref()) {
        Some(pipe) => Some(
            std::fs::File::open(pipe)
                .map_err(|e| InitError::UploadIncomplete(format!("open pipe: {e}")))?,
        ),
        None => None,
    };

    // Chroot into the runtime root (or the job's sealed root for runtime
    // builds; the parent points JOB_RUNTIME_ROOT accordingly).
    watchdog.enter("chroot");
    let root = config
        .runtime_root
        .clone()
        .ok_or_else(|| InitError::ChrootFailed("no runtime root configured".to_string()))?;
    // Volume sources live outside the root, so bind them in first.
    mount_volumes(&root, &config.mounts)?;
    chroot(&root).map_err(|e| InitError::ChrootFailed(format!("{}: {e}", root.display())))?;
    chdir("/").map_err(|e| InitError::ChrootFailed(format!("chdir /: {e}")))?;

    watchdog.enter("mounts");
    mount_base_filesystems()?;

    let workdir = config
        .working_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("/work"));
    std::fs::create_dir_all(&workdir)
        .map_err(|e| InitError::Generic(format!("create workdir: {e}")))?;

    // Uploads land before the user command can observe the working dir.
    if let Some(upload_env) = &config.upload {
        watchdog.enter("uploads");
        if let Some(reader) = upload_reader {
            upload::drain_reader(
                std::io::BufReader::new(reader),
                &workdir,
                upload_env.total_files,
                upload_env.total_bytes,
            )
            .map_err(|e| InitError::UploadIncomplete(e.to_string()))?;
        }
    }

    watchdog.stop();

    chdir(&workdir)
        .map_err(|e| InitError::ExecFailed(format!("chdir {}: {e}", workdir.display())))?;

    // Exec with a scrubbed environment: user env and secrets forwarded,
    // every orchestration variable stripped. Exec resets inherited signal
    // dispositions to their defaults for the user command.
    use std::os::unix::process::CommandExt;
    let mut command = std::process::Command::new(&config.command);
    command.args(&config.args).env_clear();
    for (key, value) in config.command_env() {
        command.env(key, value);
    }
    let err = command.exec();
    Err(InitError::ExecFailed(format!("{}: {err}", config.command)))
}

/// Enter a user namespace and map root to the outer uid/gid.
fn enter_user_namespace() -> Result<(), InitError> {
    let outer_uid = nix::unistd::getuid();
    let outer_gid = nix::unistd::getgid();

    unshare(CloneFlags::CLONE_NEWUSER)
        .map_err(|e| InitError::ResourceSetup(format!("unshare user: {e}")))?;

    let write = |path: &str, contents: String| -> Result<(), InitError> {
        std::fs::write(path, contents)
            .map_err(|e| InitError::ResourceSetup(format!("{path}: {e}")))
    };
    write("/proc/self/setgroups", "deny".to_string())?;
    write("/proc/self/uid_map", format!("0 {outer_uid} 1"))?;
    write("/proc/self/gid_map", format!("0 {outer_gid} 1"))?;
    Ok(())
}

/// Bind volume sources and create tmpfs mounts under the new root.
fn mount_volumes(root: &Path, mounts: &[MountSpec]) -> Result<(), InitError> {
    for spec in mounts {
        let target = ensure_target(root, &spec.target)
            .map_err(|e| InitError::ResourceSetup(e.to_string()))?;
        match &spec.fs {
            MountFs::Bind => {
                mount(
                    Some(spec.source.as_path()),
                    &target,
                    None::<&str>,
                    MsFlags::MS_BIND,
                    None::<&str>,
                )
                .map_err(|e| {
                    InitError::ResourceSetup(format!(
                        "bind {} -> {}: {e}",
                        spec.source.display(),
                        target.display()
                    ))
                })?;
            }
            MountFs::Tmpfs { size_mb } => {
                let data = format!("size={size_mb}m");
                mount(
                    Some("tmpfs"),
                    &target,
                    Some("tmpfs"),
                    MsFlags::empty(),
                    Some(data.as_str()),
                )
                .map_err(|e| {
                    InitError::ResourceSetup(format!("tmpfs {}: {e}", target.display()))
                })?;
            }
        }
    }
    Ok(())
}

/// Mount /proc, /sys, and a fresh /tmp inside the root.
fn mount_base_filesystems() -> Result<(), InitError> {
    let ensure = |path: &str| -> Result<(), InitError> {
        std::fs::create_dir_all(path)
            .map_err(|e| InitError::ResourceSetup(format!("mkdir {path}: {e}")))
    };

    ensure("/proc")?;
    mount(
        Some("proc"),
        "/proc",
        Some("proc"),
        MsFlags::empty(),
        None::<&str>,
    )
    .map_err(|e| InitError::ResourceSetup(format!("mount /proc: {e}")))?;

    ensure("/sys")?;
    mount(
        Some("sysfs"),
        "/sys",
        Some("sysfs"),
        MsFlags::empty(),
        None::<&str>,
    )
    .map_err(|e| InitError::ResourceSetup(format!("mount /sys: {e}")))?;

    ensure("/tmp")?;
    mount(
        Some("tmpfs"),
        "/tmp",
        Some("tmpfs"),
        MsFlags::empty(),
        None::<&str>,
    )
    .map_err(|e| InitError::ResourceSetup(format!("mount /tmp: {e}")))?;

    Ok(())
}

/// Write one status line to the pre-created FIFO, if the parent is reading.
///
/// Opened non-blocking so a vanished parent cannot wedge the report.
fn report_status(pipe: Option<&Path>, err: &InitError) {
    let Some(pipe) = pipe else { return };
    use std::os::unix::fs::OpenOptionsExt;
    let Ok(mut file) = std::fs::OpenOptions::new()
        .write(true)
        .custom_flags(nix::libc::O_NONBLOCK)
        .open(pipe)
    else {
        return;
    };
    let _ = writeln!(file, "{} {err}", err.exit_code());
}

/// Watches for a step exceeding [`STEP_TIMEOUT`] and fails the init.
///
/// A helper thread observes a step counter; if the counter has not moved by
/// the deadline, it reports a timeout on the status pipe and exits with the
/// setup-failure code. Stopped before exec.
struct StepWatchdog {
    step: Arc<AtomicU64>,
}

impl StepWatchdog {
    fn start(status_pipe: Option<PathBuf>) -> Self {
        let step = Arc::new(AtomicU64::new(0));
        let observed = Arc::clone(&step);
        std::thread::spawn(move || {
            let mut last_seen = 0u64;
            let mut deadline = Instant::now() + STEP_TIMEOUT;
            loop {
                std::thread::sleep(Duration::from_millis(250));
                let current = observed.load(Ordering::Acquire);
                if current == u64::MAX {
                    return; // stopped
                }
                if current != last_seen {
                    last_seen = current;
                    deadline = Instant::now() + STEP_TIMEOUT;
                    continue;
                }
                if current != 0 && Instant::now() > deadline {
                    let err = InitError::ResourceSetupTimeout(format!(
                        "step {current} exceeded {}s",
                        STEP_TIMEOUT.as_secs()
                    ));
                    report_status(status_pipe.as_deref(), &err);
                    std::process::exit(err.exit_code());
                }
            }
        });
        Self { step }
    }

    fn enter(&self, _name: &str) {
        self.step.fetch_add(1, Ordering::Release);
    }

    fn stop(&self) {
        self.step.store(u64::MAX, Ordering::Release);
    }
}

#[cfg(test)]
#[path = "init_tests.rs"]
mod tests;
