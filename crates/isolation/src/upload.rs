// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upload staging and the bounded transports into the sealed job root.
//!
//! Callers stage file content under the job's state directory before
//! dispatch. At dispatch the manager opens a transport: a filesystem FIFO the
//! init side drains before exec (production path), or an in-memory bounded
//! channel for callers holding a control stream. Both apply the same byte
//! budget: the producer blocks once more than `min(64 MiB, memory/4)` is in
//! flight.
//!
//! Wire framing, repeated per file then a terminator:
//!
//! ```text
//! path_len:u16 BE | path bytes | mode:u32 BE | size:u64 BE | payload
//! ```
//!
//! A zero `path_len` terminates the stream.

use crate::error::IsolationError;
use jl_core::{JobId, UploadFile};
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};

/// Hard ceiling on bytes in flight, regardless of job memory.
const MAX_BUDGET_BYTES: u64 = 64 * 1024 * 1024;

/// Chunk size for payload framing.
const CHUNK_BYTES: usize = 64 * 1024;

/// Channel depth for the streaming transport (frames, not bytes; byte
/// pressure comes from the semaphore budget).
const STREAM_CHANNEL_FRAMES: usize = 64;

/// Errors from staging, producing, or draining uploads.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload stream error: {0}")]
    Stream(#[from] std::io::Error),

    /// The other side went away before the stream terminated.
    #[error("upload channel closed")]
    Closed,

    /// The stream ended before all declared files and bytes arrived.
    #[error("upload incomplete: {0}")]
    Incomplete(String),

    /// A destination path tried to escape the working directory.
    #[error("unsafe upload path '{0}'")]
    UnsafePath(String),

    /// No staged content exists for a declared file.
    #[error("no staged content for '{0}'")]
    NotStaged(String),
}

impl UploadError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Backpressure budget for a job's upload stream.
pub fn byte_budget(memory_mb: u64) -> u64 {
    if memory_mb == 0 {
        return MAX_BUDGET_BYTES;
    }
    MAX_BUDGET_BYTES.min(memory_mb * 1024 * 1024 / 4)
}

/// An upload session: the declared files and derived totals for one job.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub job_id: JobId,
    pub files: Vec<UploadFile>,
    pub total_files: u64,
    pub total_bytes: u64,
    pub budget_bytes: u64,
}

/// Transport variants for delivering a session's bytes.
pub enum UploadTransport {
    /// FIFO path the init side opens for reading.
    Pipe { path: PathBuf },
    /// In-memory bounded channel.
    Stream(StreamPair),
}

/// Both ends of a streaming transport.
pub struct StreamPair {
    pub producer: StreamProducer,
    pub consumer: StreamConsumer,
}

enum Frame {
    File { path: String, mode: u32, size: u64 },
    Chunk(Vec<u8>),
    End,
}

/// Producer half of the streaming transport.
///
/// `send_file` blocks (asynchronously) while the byte budget is exhausted;
/// dropping the producer without [`StreamProducer::finish`] aborts the
/// stream, which the consumer reports as incomplete.
pub struct StreamProducer {
    tx: mpsc::Sender<Frame>,
    budget: Arc<Semaphore>,
}

impl StreamProducer {
    pub async fn send_file(&self, path: &str, mode: u32, data: &[u8]) -> Result<(), UploadError> {
        self.tx
            .send(Frame::File {
                path: path.to_string(),
                mode,
                size: data.len() as u64,
            })
            .await
            .map_err(|_| UploadError::Closed)?;

        for chunk in data.chunks(CHUNK_BYTES) {
            let permits = chunk.len() as u32;
            let permit = self
                .budget
                .acquire_many(permits)
                .await
                .map_err(|_| UploadError::Closed)?;
            // Permits come back when the consumer has written the chunk.
            permit.forget();
            self.tx
                .send(Frame::Chunk(chunk.to_vec()))
                .await
                .map_err(|_| UploadError::Closed)?;
        }
        Ok(())
    }

    /// Terminate the stream cleanly.
    pub async fn finish(self) -> Result<(), UploadError> {
        self.tx
            .send(Frame::End)
            .await
            .map_err(|_| UploadError::Closed)
    }
}

/// Consumer half of the streaming transport.
pub struct StreamConsumer {
    rx: mpsc::Receiver<Frame>,
    budget: Arc<Semaphore>,
    expected_files: u64,
    expected_bytes: u64,
}

impl StreamConsumer {
    /// Drain every frame into `dest`, enforcing the declared totals.
    pub async fn drain_to(mut self, dest: &Path) -> Result<(), UploadError> {
        let mut current: Option<std::fs::File> = None;
        let mut files: u64 = 0;
        let mut bytes: u64 = 0;

        loop {
            let frame = match self.rx.recv().await {
                Some(frame) => frame,
                None => {
                    return Err(UploadError::Incomplete(
                        "stream closed before terminator".to_string(),
                    ))
                }
            };
            match frame {
                Frame::File { path, mode, size: _ } => {
                    let full = safe_join(dest, &path)?;
                    if let Some(parent) = full.parent() {
                        std::fs::create_dir_all(parent).map_err(|e| UploadError::io(parent, e))?;
                    }
                    current = Some(create_with_mode(&full, mode)?);
                    files += 1;
                }
                Frame::Chunk(chunk) => {
                    let Some(file) = current.as_mut() else {
                        return Err(UploadError::Incomplete("chunk before header".to_string()));
                    };
                    file.write_all(&chunk)
                        .map_err(|e| UploadError::io(dest, e))?;
                    bytes += chunk.len() as u64;
                    self.budget.add_permits(chunk.len());
                }
                Frame::End => break,
            }
        }

        if files != self.expected_files || bytes != self.expected_bytes {
            return Err(UploadError::Incomplete(format!(
                "expected {} files / {} bytes, got {files} / {bytes}",
                self.expected_files, self.expected_bytes
            )));
        }
        Ok(())
    }
}

impl Drop for StreamConsumer {
    fn drop(&mut self) {
        // Unblock a producer stuck on the budget once the consumer is gone.
        self.budget.close();
    }
}

/// Stages uploads and opens transports.
pub struct UploadManager {
    state_dir: PathBuf,
}

impl UploadManager {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    fn job_dir(&self, job: &JobId) -> PathBuf {
        self.state_dir.join("jobs").join(job.as_str())
    }

    /// Directory where callers stage upload content before dispatch.
    pub fn staging_dir(&self, job: &JobId) -> PathBuf {
        self.job_dir(job).join("uploads")
    }

    /// Build the session handle for a job's declared uploads.
    pub fn prepare_session(
        &self,
        job: &JobId,
        files: Vec<UploadFile>,
        memory_mb: u64,
    ) -> UploadSession {
        let total_files = files.len() as u64;
        let total_bytes = files.iter().map(|f| f.size).sum();
        UploadSession {
            job_id: job.clone(),
            files,
            total_files,
            total_bytes,
            budget_bytes: byte_budget(memory_mb),
        }
    }

    /// Write staged content for one declared file.
    pub fn stage(
        &self,
        job: &JobId,
        file: &UploadFile,
        data: &[u8],
    ) -> Result<(), UploadError> {
        let dir = self.staging_dir(job);
        let full = safe_join(&dir, &file.path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).map_err(|e| UploadError::io(parent, e))?;
        }
        std::fs::write(&full, data).map_err(|e| UploadError::io(&full, e))
    }

    /// Create the FIFO for the pipe transport.
    pub fn create_pipe_transport(
        &self,
        session: &UploadSession,
    ) -> Result<UploadTransport, IsolationError> {
        let dir = self.job_dir(&session.job_id);
        std::fs::create_dir_all(&dir).map_err(|e| IsolationError::io(&dir, e))?;
        let path = dir.join("upload.pipe");
        nix::unistd::mkfifo(&path, nix::sys::stat::Mode::S_IRUSR | nix::sys::stat::Mode::S_IWUSR)
            .map_err(|e| IsolationError::io(&path, std::io::Error::from(e)))?;
        Ok(UploadTransport::Pipe { path })
    }

    /// Create an in-memory streaming transport.
    pub fn create_stream_transport(&self, session: &UploadSession) -> UploadTransport {
        // Semaphore permits are u32-sized; the budget cap (64 MiB) fits.
        let budget = Arc::new(Semaphore::new(session.budget_bytes as usize));
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_FRAMES);
        UploadTransport::Stream(StreamPair {
            producer: StreamProducer {
                tx,
                budget: Arc::clone(&budget),
            },
            consumer: StreamConsumer {
                rx,
                budget,
                expected_files: session.total_files,
                expected_bytes: session.total_bytes,
            },
        })
    }

    /// Feed the session's staged files into the pipe transport.
    ///
    /// Waits up to [`PIPE_OPEN_TIMEOUT`] for the init side to open the FIFO
    /// for reading, then streams frames with plain blocking writes: the
    /// FIFO's bounded kernel buffer paces the producer against the drain.
    /// Runs on the blocking pool.
    pub async fn produce_pipe(
        &self,
        session: &UploadSession,
        pipe: &Path,
    ) -> Result<(), UploadError> {
        let staging = self.staging_dir(&session.job_id);
        let session = session.clone();
        let pipe = pipe.to_path_buf();
        tokio::task::spawn_blocking(move || produce_pipe_blocking(&session, &staging, &pipe))
            .await
            .map_err(|e| UploadError::Incomplete(format!("producer task: {e}")))?
    }

    /// Remove the job's upload state (staging dir, FIFO).
    pub fn cleanup(&self, job: &JobId) {
        let dir = self.job_dir(job);
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %dir.display(), error = %e, "upload cleanup failed");
            }
        }
    }
}

/// How long the producer waits for the init side to open the FIFO.
const PIPE_OPEN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Blocking body of [`UploadManager::produce_pipe`].
fn produce_pipe_blocking(
    session: &UploadSession,
    staging: &Path,
    pipe: &Path,
) -> Result<(), UploadError> {
    use std::os::unix::fs::OpenOptionsExt;

    // Probe non-blocking until a reader appears; ENXIO means none yet.
    let deadline = std::time::Instant::now() + PIPE_OPEN_TIMEOUT;
    let file = loop {
        match std::fs::OpenOptions::new()
            .write(true)
            .custom_flags(nix::libc::O_NONBLOCK)
            .open(pipe)
        {
            Ok(file) => break file,
            Err(e) if e.raw_os_error() == Some(nix::libc::ENXIO) => {
                if std::time::Instant::now() > deadline {
                    return Err(UploadError::Closed);
                }
                std::thread::sleep(std::time::Duration::from_millis(50));
            }
            Err(e) => return Err(UploadError::io(pipe, e)),
        }
    };

    // Back to blocking writes so the kernel buffer provides backpressure.
    use std::os::fd::AsRawFd;
    nix::fcntl::fcntl(
        file.as_raw_fd(),
        nix::fcntl::FcntlArg::F_SETFL(nix::fcntl::OFlag::empty()),
    )
    .map_err(|e| UploadError::io(pipe, std::io::Error::from(e)))?;

    let mut out = std::io::BufWriter::new(file);
    for upload in &session.files {
        let staged = safe_join(staging, &upload.path)?;
        let data = std::fs::read(&staged).map_err(|_| UploadError::NotStaged(upload.path.clone()))?;

        let mut header = Vec::with_capacity(upload.path.len() + 14);
        encode_header(&mut header, &upload.path, upload.mode, data.len() as u64);
        out.write_all(&header).map_err(|e| UploadError::io(pipe, e))?;
        out.write_all(&data).map_err(|e| UploadError::io(pipe, e))?;
    }
    out.write_all(&[0, 0]).map_err(|e| UploadError::io(pipe, e))?;
    out.flush().map_err(|e| UploadError::io(pipe, e))?;
    Ok(())
}

fn encode_header(out: &mut Vec<u8>, path: &str, mode: u32, size: u64) {
    out.extend_from_slice(&(path.len() as u16).to_be_bytes());
    out.extend_from_slice(path.as_bytes());
    out.extend_from_slice(&mode.to_be_bytes());
    out.extend_from_slice(&size.to_be_bytes());
}

/// Read one frame header. `Ok(None)` is the terminator.
fn read_header<R: Read>(r: &mut R) -> std::io::Result<Option<(String, u32, u64)>> {
    let mut len_buf = [0u8; 2];
    r.read_exact(&mut len_buf)?;
    let path_len = u16::from_be_bytes(len_buf) as usize;
    if path_len == 0 {
        return Ok(None);
    }

    let mut path_buf = vec![0u8; path_len];
    r.read_exact(&mut path_buf)?;
    let path = String::from_utf8(path_buf)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let mut mode_buf = [0u8; 4];
    r.read_exact(&mut mode_buf)?;
    let mut size_buf = [0u8; 8];
    r.read_exact(&mut size_buf)?;

    Ok(Some((
        path,
        u32::from_be_bytes(mode_buf),
        u64::from_be_bytes(size_buf),
    )))
}

/// Drain a pipe transport to `dest`. Blocking; runs on the init side.
pub fn drain_pipe(
    pipe: &Path,
    dest: &Path,
    expected_files: u64,
    expected_bytes: u64,
) -> Result<(), UploadError> {
    let file = std::fs::File::open(pipe).map_err(|e| UploadError::io(pipe, e))?;
    drain_reader(
        std::io::BufReader::new(file),
        dest,
        expected_files,
        expected_bytes,
    )
}

/// Drain framed uploads from any reader to `dest`.
///
/// Files land with their declared mode; premature EOF or totals that do not
/// match the session's declaration fail as incomplete.
pub fn drain_reader<R: Read>(
    mut r: R,
    dest: &Path,
    expected_files: u64,
    expected_bytes: u64,
) -> Result<(), UploadError> {
    let mut files: u64 = 0;
    let mut bytes: u64 = 0;

    loop {
        let header = match read_header(&mut r) {
            Ok(header) => header,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(UploadError::Incomplete(
                    "stream ended before terminator".to_string(),
                ))
            }
            Err(e) => return Err(UploadError::Stream(e)),
        };
        let Some((path, mode, size)) = header else {
            break;
        };

        let full = safe_join(dest, &path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).map_err(|e| UploadError::io(parent, e))?;
        }
        let mut file = create_with_mode(&full, mode)?;
        let copied = std::io::copy(&mut r.by_ref().take(size), &mut file)
            .map_err(|e| UploadError::io(&full, e))?;
        if copied != size {
            return Err(UploadError::Incomplete(format!(
                "file '{path}' truncated at {copied} of {size} bytes"
            )));
        }
        files += 1;
        bytes += size;
    }

    if files != expected_files || bytes != expected_bytes {
        return Err(UploadError::Incomplete(format!(
            "expected {expected_files} files / {expected_bytes} bytes, got {files} / {bytes}"
        )));
    }
    Ok(())
}

/// Join a relative upload path onto a base, refusing escapes.
fn safe_join(base: &Path, rel: &str) -> Result<PathBuf, UploadError> {
    let rel_path = Path::new(rel);
    if rel_path.is_absolute() {
        return Err(UploadError::UnsafePath(rel.to_string()));
    }
    for component in rel_path.components() {
        match component {
            Component::Normal(_) => {}
            _ => return Err(UploadError::UnsafePath(rel.to_string())),
        }
    }
    Ok(base.join(rel_path))
}

fn create_with_mode(path: &Path, mode: u32) -> Result<std::fs::File, UploadError> {
    use std::os::unix::fs::OpenOptionsExt;
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
        .map_err(|e| UploadError::io(path, e))
}

#[cfg(test)]
#[path = "upload_tests.rs"]
mod tests;
