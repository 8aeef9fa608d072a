//! # Stage: nestable reader/writer wrapper.
//!
//! A [`Stage`] wraps one nested stream (or, as a `Starter`, a reader and a
//! writer it copies between) and adds optional capabilities, all set before
//! [`Stage::init`]:
//!
//! ```text
//!            ┌──────────────────────────── Stage ─────────────────────────────┐
//! caller ──► │ read/write path ─► HookedReader/HookedWriter ─► nested stream  │
//!            │   Direct   : pass-through                                      │
//!            │   Buffered : one pooled buffer, refilled / flushed in place    │
//!            │   Queued   : AsyncReader / AsyncWriter (background pump)       │
//!            └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - `Reader` stages hold exactly one nested reader, `Writer` stages exactly one
//!   nested writer; a `Starter` holds up to one of each, never none.
//! - Hooks run after every **underlying** call, so a buffered stage hashes and
//!   counts what it pulls from (or pushes to) the nested stream.
//! - `close` runs once: readers close the nested reader and release buffers;
//!   writers flush their buffer or queue first and close the nested writer last.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::hook::{Direction, Hook, HookChain, HookedReader, HookedWriter};
use super::hooks::{
    ChecksumHook, CountHook, HashAlgorithm, HashHook, RateLimitHook, RateLimiter, SpeedHook,
    StopHook,
};
use super::stream::{StreamRead, StreamWrite, write_all};
use crate::aio::{AsyncConfig, AsyncReader, AsyncWriter};
use crate::config::StageConfig;
use crate::error::StreamError;
use crate::pool::{BufferPool, PooledBuf};

/// Copy chunk size of a `Starter` without a read buffer.
const DEFAULT_COPY_BUF: usize = 32 * 1024;

type BoxReader = Box<dyn StreamRead>;
type BoxWriter = Box<dyn StreamWrite>;

/// Surface a stage exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Drives the flow itself with [`Stage::run`].
    Starter,
    /// Exposes `read` only.
    Reader,
    /// Exposes `write`/`flush` only.
    Writer,
}

impl Role {
    /// Direction hashing, checksum, rate limiting and speed monitoring apply to.
    fn primary(self) -> Direction {
        match self {
            Role::Writer => Direction::Write,
            Role::Starter | Role::Reader => Direction::Read,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct Capabilities {
    read_buf: usize,
    write_buf: usize,
    write_deadline: Duration,
    async_read: Option<AsyncConfig>,
    async_write: Option<AsyncConfig>,
    hash: Option<String>,
    checksum: Option<String>,
    rate_limit: Option<Arc<RateLimiter>>,
    monitor_speed: Option<Duration>,
    stop: Option<CancellationToken>,
}

/// Nestable stream stage.
///
/// # Example
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), stagevisor::StreamError> {
/// use std::io::Cursor;
/// use stagevisor::{Role, Stage, StreamRead};
///
/// let mut stage = Stage::new(Role::Reader);
/// stage.nest_reader(Cursor::new(b"hello".to_vec()))?;
/// stage.enable_read_buf(4).enable_calc_hash("sha256");
/// stage.init()?;
///
/// let mut out = [0u8; 16];
/// let n = stage.read(&mut out).await?;
/// assert_eq!(&out[..n], b"hello");
/// stage.close().await?;
/// assert_eq!(stage.bytes_read(), 5);
/// # Ok(())
/// # }
/// ```
pub struct Stage {
    name: String,
    role: Role,
    pool: BufferPool,
    reader: Option<BoxReader>,
    writer: Option<BoxWriter>,
    read_hooks: HookChain,
    write_hooks: HookChain,
    caps: Capabilities,
    meta: Arc<Map<String, Value>>,
    read_count: Arc<CountHook>,
    write_count: Arc<CountHook>,
    hash: Option<Arc<HashHook>>,
    write_checksum: Option<Arc<ChecksumHook>>,
    speed: Option<Arc<SpeedHook>>,
    read_path: Option<ReadPath>,
    write_path: Option<WritePath>,
    inited: bool,
    closed: Option<Result<(), StreamError>>,
}

impl Stage {
    /// Creates an empty stage with the given role.
    pub fn new(role: Role) -> Self {
        Self {
            name: "stage".to_string(),
            role,
            pool: BufferPool::shared(),
            reader: None,
            writer: None,
            read_hooks: HookChain::new(),
            write_hooks: HookChain::new(),
            caps: Capabilities::default(),
            meta: Arc::default(),
            read_count: Arc::new(CountHook::new()),
            write_count: Arc::new(CountHook::new()),
            hash: None,
            write_checksum: None,
            speed: None,
            read_path: None,
            write_path: None,
            inited: false,
            closed: None,
        }
    }

    /// Names the stage in logs.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Draws buffers from `pool` instead of the shared pool.
    pub fn with_pool(mut self, pool: BufferPool) -> Self {
        self.pool = pool;
        self
    }

    /// Applies every capability of `cfg`.
    pub fn with_config(mut self, cfg: &StageConfig) -> Self {
        self.enable_read_buf(cfg.read_buf)
            .enable_write_buf(cfg.write_buf)
            .enable_write_deadline(cfg.write_deadline);
        if let Some(a) = &cfg.async_read {
            self.enable_async_read(a.clone());
        }
        if let Some(a) = &cfg.async_write {
            self.enable_async_write(a.clone());
        }
        if let Some(h) = &cfg.hash {
            self.enable_calc_hash(h.clone());
        }
        if let Some(c) = &cfg.checksum {
            self.enable_checksum(c.clone());
        }
        if let Some(r) = &cfg.rate_limit {
            self.enable_rate_limit(Arc::new(RateLimiter::from_config(r)));
        }
        if let Some(every) = cfg.monitor_speed {
            self.enable_monitor_speed(every);
        }
        self
    }

    /// Stage name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stage role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns `true` after a successful [`init`](Self::init).
    pub fn is_inited(&self) -> bool {
        self.inited
    }

    /// Returns `true` once [`close`](Self::close) ran.
    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    /// Bytes pulled from the nested reader.
    pub fn bytes_read(&self) -> u64 {
        self.read_count.bytes()
    }

    /// Bytes pushed to the nested writer.
    pub fn bytes_written(&self) -> u64 {
        self.write_count.bytes()
    }

    /// Current rolling hash (lowercase hex), if hashing is enabled.
    pub fn hash_hex(&self) -> Option<String> {
        self.hash.as_ref().map(|h| h.hex_digest())
    }

    /// Hash algorithm in use, if hashing is enabled.
    pub fn hash_algorithm(&self) -> Option<HashAlgorithm> {
        self.hash.as_ref().map(|h| h.algorithm())
    }

    /// Throughput of the last completed monitoring window.
    pub fn bytes_per_sec(&self) -> Option<u64> {
        self.speed.as_ref().map(|s| s.bytes_per_sec())
    }

    // ---- nesting ----

    /// Attaches a nested reader.
    ///
    /// When a reader is already attached and `reader` is itself a stage, the
    /// current reader moves into the innermost free reader slot of `reader`'s
    /// chain and `reader` becomes the immediate nested reader. Otherwise an
    /// occupied slot is [`StreamError::AlreadyNested`].
    pub fn nest_reader<R: StreamRead + 'static>(&mut self, reader: R) -> Result<(), StreamError> {
        self.check_nestable("nest_reader", Role::Writer)?;
        let mut incoming: BoxReader = Box::new(reader);
        if let Some(stage) = incoming.stage_mut() {
            stage.check_nested_as(Role::Reader)?;
        }
        let Some(existing) = self.reader.take() else {
            self.reader = Some(incoming);
            return Ok(());
        };

        let pushed = match incoming.stage_mut() {
            Some(stage) => stage.push_down_reader(existing),
            None => Err(existing),
        };
        match pushed {
            Ok(()) => {
                self.reader = Some(incoming);
                Ok(())
            }
            Err(existing) => {
                self.reader = Some(existing);
                Err(StreamError::AlreadyNested("reader"))
            }
        }
    }

    /// Attaches a nested writer; same push-down rules as [`nest_reader`](Self::nest_reader).
    pub fn nest_writer<W: StreamWrite + 'static>(&mut self, writer: W) -> Result<(), StreamError> {
        self.check_nestable("nest_writer", Role::Reader)?;
        let mut incoming: BoxWriter = Box::new(writer);
        if let Some(stage) = incoming.stage_mut() {
            stage.check_nested_as(Role::Writer)?;
        }
        let Some(existing) = self.writer.take() else {
            self.writer = Some(incoming);
            return Ok(());
        };

        let pushed = match incoming.stage_mut() {
            Some(stage) => stage.push_down_writer(existing),
            None => Err(existing),
        };
        match pushed {
            Ok(()) => {
                self.writer = Some(incoming);
                Ok(())
            }
            Err(existing) => {
                self.writer = Some(existing);
                Err(StreamError::AlreadyNested("writer"))
            }
        }
    }

    /// A nested stage must have the role of the slot it fills.
    fn check_nested_as(&self, slot: Role) -> Result<(), StreamError> {
        if self.role != slot {
            return Err(StreamError::Nesting(format!(
                "{:?} stage {:?} cannot fill a {slot:?} slot",
                self.role, self.name
            )));
        }
        Ok(())
    }

    fn check_nestable(&self, op: &'static str, forbidden: Role) -> Result<(), StreamError> {
        if self.inited || self.closed.is_some() {
            return Err(StreamError::Nesting(format!(
                "stage {:?} is already initialized",
                self.name
            )));
        }
        if self.role == forbidden {
            return Err(StreamError::Role {
                op,
                role: self.role,
            });
        }
        Ok(())
    }

    fn push_down_reader(&mut self, reader: BoxReader) -> Result<(), BoxReader> {
        if self.inited || self.role != Role::Reader {
            return Err(reader);
        }
        if self.reader.is_none() {
            self.reader = Some(reader);
            return Ok(());
        }
        match self.reader.as_mut().and_then(|inner| inner.stage_mut()) {
            Some(stage) => stage.push_down_reader(reader),
            None => Err(reader),
        }
    }

    fn push_down_writer(&mut self, writer: BoxWriter) -> Result<(), BoxWriter> {
        if self.inited || self.role != Role::Writer {
            return Err(writer);
        }
        if self.writer.is_none() {
            self.writer = Some(writer);
            return Ok(());
        }
        match self.writer.as_mut().and_then(|inner| inner.stage_mut()) {
            Some(stage) => stage.push_down_writer(writer),
            None => Err(writer),
        }
    }

    // ---- hooks and capabilities (before init) ----

    /// Registers a hook run after every underlying read.
    pub fn hook_read(&mut self, hook: Arc<dyn Hook>) -> &mut Self {
        self.read_hooks.push(hook);
        self
    }

    /// Registers a hook run after every underlying write.
    pub fn hook_write(&mut self, hook: Arc<dyn Hook>) -> &mut Self {
        self.write_hooks.push(hook);
        self
    }

    /// Adds free-form metadata handed to hooks.
    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        Arc::make_mut(&mut self.meta).insert(key.into(), value.into());
        self
    }

    /// Synchronous read buffer of `size` bytes (0 = off).
    pub fn enable_read_buf(&mut self, size: usize) -> &mut Self {
        self.caps.read_buf = size;
        self
    }

    /// Synchronous write buffer of `size` bytes (0 = off).
    pub fn enable_write_buf(&mut self, size: usize) -> &mut Self {
        self.caps.write_buf = size;
        self
    }

    /// Flushes the synchronous write buffer on the first write at least
    /// `deadline` after the previous flush (0 = off).
    pub fn enable_write_deadline(&mut self, deadline: Duration) -> &mut Self {
        self.caps.write_deadline = deadline;
        self
    }

    /// Background-queue reading.
    pub fn enable_async_read(&mut self, cfg: AsyncConfig) -> &mut Self {
        self.caps.async_read = Some(cfg);
        self
    }

    /// Background-queue writing.
    pub fn enable_async_write(&mut self, cfg: AsyncConfig) -> &mut Self {
        self.caps.async_write = Some(cfg);
        self
    }

    /// Rolling hash by algorithm name, resolved at init.
    pub fn enable_calc_hash(&mut self, algorithm: impl Into<String>) -> &mut Self {
        self.caps.hash = Some(algorithm.into());
        self
    }

    /// Verifies the rolling hash against `expected` at end-of-stream.
    ///
    /// Writer stages check once everything was flushed, in [`close`](Self::close).
    pub fn enable_checksum(&mut self, expected: impl Into<String>) -> &mut Self {
        self.caps.checksum = Some(expected.into());
        self
    }

    /// Limits throughput through `limiter`.
    pub fn enable_rate_limit(&mut self, limiter: Arc<RateLimiter>) -> &mut Self {
        self.caps.rate_limit = Some(limiter);
        self
    }

    /// Logs throughput every `interval`.
    pub fn enable_monitor_speed(&mut self, interval: Duration) -> &mut Self {
        self.caps.monitor_speed = Some(interval);
        self
    }

    /// Fails I/O with [`StreamError::Stopped`] once `token` is cancelled; also
    /// interrupts [`run`](Self::run).
    pub fn enable_stop_check(&mut self, token: CancellationToken) -> &mut Self {
        self.caps.stop = Some(token);
        self
    }

    // ---- init ----

    /// Validates role, nesting and capabilities and wires the hook chains.
    ///
    /// A second call is a no-op.
    pub fn init(&mut self) -> Result<(), StreamError> {
        if self.inited {
            return Ok(());
        }
        if self.closed.is_some() {
            return Err(StreamError::Closed);
        }
        self.validate()?;

        let algorithm = self
            .caps
            .hash
            .as_deref()
            .map(HashAlgorithm::from_name)
            .transpose()?;
        if self.caps.checksum.is_some() && algorithm.is_none() {
            return Err(StreamError::Config(
                "checksum verification requires a hash algorithm".into(),
            ));
        }

        let mut primary = HookChain::new();
        if let Some(limiter) = &self.caps.rate_limit {
            primary.push(Arc::new(RateLimitHook::new(Arc::clone(limiter))));
        }
        if let Some(interval) = self.caps.monitor_speed {
            let speed = Arc::new(SpeedHook::new(self.name.as_str(), interval));
            self.speed = Some(Arc::clone(&speed));
            primary.push(speed);
        }
        if let Some(algorithm) = algorithm {
            let hash = Arc::new(HashHook::new(algorithm));
            self.hash = Some(Arc::clone(&hash));
            primary.push(Arc::clone(&hash) as Arc<dyn Hook>);
            if let Some(expected) = &self.caps.checksum {
                let check = Arc::new(ChecksumHook::new(expected.as_str(), hash));
                match self.role.primary() {
                    Direction::Read => primary.push(check),
                    Direction::Write => self.write_checksum = Some(check),
                }
            }
        }

        let mut read_chain = HookChain::new();
        let mut write_chain = HookChain::new();
        read_chain.push(Arc::clone(&self.read_count) as Arc<dyn Hook>);
        write_chain.push(Arc::clone(&self.write_count) as Arc<dyn Hook>);
        if let Some(token) = &self.caps.stop {
            let stop: Arc<dyn Hook> = Arc::new(StopHook::new(token.clone()));
            read_chain.push(Arc::clone(&stop));
            write_chain.push(stop);
        }
        match self.role.primary() {
            Direction::Read => read_chain.extend(&primary),
            Direction::Write => write_chain.extend(&primary),
        }
        read_chain.extend(&self.read_hooks);
        write_chain.extend(&self.write_hooks);

        if let Some(reader) = self.reader.take() {
            let hooked = HookedReader::new(reader, read_chain, Arc::clone(&self.meta));
            self.read_path = Some(if let Some(cfg) = self.caps.async_read.clone() {
                ReadPath::Queued(AsyncReader::with_pool(hooked, cfg, self.pool.clone()))
            } else if self.caps.read_buf > 0 {
                ReadPath::Buffered(BufferedReader::new(
                    hooked,
                    self.pool.clone(),
                    self.caps.read_buf,
                ))
            } else {
                ReadPath::Direct(hooked)
            });
        }
        if let Some(writer) = self.writer.take() {
            let hooked = HookedWriter::new(writer, write_chain, Arc::clone(&self.meta));
            self.write_path = Some(if let Some(cfg) = self.caps.async_write.clone() {
                WritePath::Queued(AsyncWriter::with_pool(hooked, cfg, self.pool.clone()))
            } else if self.caps.write_buf > 0 {
                WritePath::Buffered(BufferedWriter::new(
                    hooked,
                    self.pool.clone(),
                    self.caps.write_buf,
                    self.caps.write_deadline,
                ))
            } else {
                WritePath::Direct(hooked)
            });
        }

        self.inited = true;
        tracing::debug!(
            stage = %self.name,
            role = ?self.role,
            read = self.read_path.as_ref().map(ReadPath::kind),
            write = self.write_path.as_ref().map(WritePath::kind),
            hash = algorithm.map(|a| a.name()),
            "stage initialized"
        );
        Ok(())
    }

    fn validate(&self) -> Result<(), StreamError> {
        let nesting = |msg: &str| Err(StreamError::Nesting(format!("stage {:?}: {msg}", self.name)));
        match (self.role, self.reader.is_some(), self.writer.is_some()) {
            (_, false, false) => return nesting("no nested reader or writer"),
            (Role::Reader, _, true) => return nesting("a reader stage cannot hold a writer"),
            (Role::Writer, true, _) => return nesting("a writer stage cannot hold a reader"),
            _ => {}
        }
        if self.caps.read_buf > 0 && self.caps.async_read.is_some() {
            return Err(StreamError::Config(
                "read side: synchronous and queued buffering are exclusive".into(),
            ));
        }
        if self.caps.write_buf > 0 && self.caps.async_write.is_some() {
            return Err(StreamError::Config(
                "write side: synchronous and queued buffering are exclusive".into(),
            ));
        }
        Ok(())
    }

    fn check_role(&self, op: &'static str, wanted: Role) -> Result<(), StreamError> {
        if self.role != wanted {
            return Err(StreamError::Role {
                op,
                role: self.role,
            });
        }
        Ok(())
    }

    fn ready(&mut self) -> Result<(), StreamError> {
        if self.closed.is_some() {
            return Err(StreamError::Closed);
        }
        self.init()
    }

    // ---- data path ----

    /// Reads into `dst` (`Reader` role). Initializes the stage on first use.
    ///
    /// With a synchronous buffer the call keeps refilling until `dst` is full
    /// or the stream ends; `Ok(0)` is end-of-stream.
    pub async fn read(&mut self, dst: &mut [u8]) -> Result<usize, StreamError> {
        self.check_role("read", Role::Reader)?;
        self.ready()?;
        match self.read_path.as_mut() {
            Some(path) => path.read(dst).await,
            None => Err(StreamError::Closed),
        }
    }

    /// Writes all of `src` (`Writer` role). Initializes the stage on first use.
    pub async fn write(&mut self, src: &[u8]) -> Result<usize, StreamError> {
        self.check_role("write", Role::Writer)?;
        self.ready()?;
        match self.write_path.as_mut() {
            Some(path) => path.write(src).await,
            None => Err(StreamError::Closed),
        }
    }

    /// Forces buffered bytes to the nested writer (`Writer` role).
    ///
    /// A no-op for stages without a buffer or queue.
    pub async fn flush(&mut self) -> Result<(), StreamError> {
        self.check_role("flush", Role::Writer)?;
        self.ready()?;
        match self.write_path.as_mut() {
            Some(path) => path.flush().await,
            None => Ok(()),
        }
    }

    /// Closes the stage once; later calls return the first result.
    ///
    /// The read side closes first (nested reader, buffers, queue), then the
    /// write side (queue or buffer flushed, nested writer last).
    pub async fn close(&mut self) -> Result<(), StreamError> {
        if let Some(res) = &self.closed {
            return res.clone();
        }

        let mut results = Vec::with_capacity(2);
        if let Some(mut path) = self.read_path.take() {
            results.push(path.close().await);
        }
        if let Some(mut reader) = self.reader.take() {
            results.push(reader.close().await);
        }
        if let Some(mut path) = self.write_path.take() {
            let flushed = path.close().await;
            if let (Ok(()), Some(check)) = (&flushed, self.write_checksum.take()) {
                results.push(check.verify());
            }
            results.push(flushed);
        }
        if let Some(mut writer) = self.writer.take() {
            results.push(writer.close().await);
        }

        let res = merge(results);
        match &res {
            Ok(()) => tracing::debug!(stage = %self.name, "stage closed"),
            Err(e) => tracing::warn!(stage = %self.name, error = %e, "stage close failed"),
        }
        self.closed = Some(res.clone());
        res
    }

    /// Copies the nested reader into the nested writer (`Starter` role), or
    /// drains the reader when no writer is nested, then closes the stage.
    ///
    /// Returns the number of bytes copied.
    pub async fn run(&mut self) -> Result<u64, StreamError> {
        self.check_role("run", Role::Starter)?;
        self.ready()?;

        let copied = match self.caps.stop.clone() {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(StreamError::Stopped),
                    res = self.copy() => res,
                }
            }
            None => self.copy().await,
        };
        let closed = self.close().await;

        match (copied, closed) {
            (Ok(n), Ok(())) => Ok(n),
            (Ok(_), Err(e)) | (Err(e), Ok(())) => Err(e),
            (Err(e), Err(c)) => Err(StreamError::Joined(vec![e, c])),
        }
    }

    async fn copy(&mut self) -> Result<u64, StreamError> {
        let size = match self.caps.read_buf {
            0 => DEFAULT_COPY_BUF,
            n => n,
        };
        let Some(reader) = self.read_path.as_mut() else {
            return Ok(0);
        };
        let mut chunk = self.pool.get(size);
        let mut total = 0u64;
        loop {
            chunk.reset();
            let n = reader.read(chunk.spare_mut()).await?;
            if n == 0 {
                break;
            }
            chunk.commit(n);
            if let Some(writer) = self.write_path.as_mut() {
                writer.write(chunk.filled()).await?;
            }
            total += n as u64;
        }
        if let Some(writer) = self.write_path.as_mut() {
            writer.flush().await?;
        }
        Ok(total)
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("inited", &self.inited)
            .field("closed", &self.closed.is_some())
            .field("read_hooks", &self.read_hooks)
            .field("write_hooks", &self.write_hooks)
            .finish()
    }
}

#[async_trait]
impl StreamRead for Stage {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        Stage::read(self, buf).await
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        Stage::close(self).await
    }

    fn stage_mut(&mut self) -> Option<&mut Stage> {
        Some(self)
    }
}

#[async_trait]
impl StreamWrite for Stage {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, StreamError> {
        Stage::write(self, buf).await
    }

    async fn flush(&mut self) -> Result<(), StreamError> {
        Stage::flush(self).await
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        Stage::close(self).await
    }

    fn stage_mut(&mut self) -> Option<&mut Stage> {
        Some(self)
    }
}

/// Joins close results, keeping every failure.
fn merge(results: Vec<Result<(), StreamError>>) -> Result<(), StreamError> {
    let mut errors: Vec<StreamError> = results.into_iter().filter_map(Result::err).collect();
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(StreamError::Joined(errors)),
    }
}

// ---- read strategies ----

enum ReadPath {
    Direct(HookedReader<BoxReader>),
    Buffered(BufferedReader),
    Queued(AsyncReader<HookedReader<BoxReader>>),
}

impl ReadPath {
    fn kind(&self) -> &'static str {
        match self {
            ReadPath::Direct(_) => "direct",
            ReadPath::Buffered(_) => "buffered",
            ReadPath::Queued(_) => "queued",
        }
    }

    async fn read(&mut self, dst: &mut [u8]) -> Result<usize, StreamError> {
        match self {
            ReadPath::Direct(r) => r.read(dst).await,
            ReadPath::Buffered(r) => r.read(dst).await,
            ReadPath::Queued(r) => r.read(dst).await,
        }
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        match self {
            ReadPath::Direct(r) => r.close().await,
            ReadPath::Buffered(r) => r.close().await,
            ReadPath::Queued(r) => r.close().await,
        }
    }
}

struct BufferedReader {
    inner: HookedReader<BoxReader>,
    pool: BufferPool,
    size: usize,
    buf: Option<PooledBuf>,
    eof: bool,
    pending: Option<StreamError>,
}

impl BufferedReader {
    fn new(inner: HookedReader<BoxReader>, pool: BufferPool, size: usize) -> Self {
        Self {
            inner,
            pool,
            size,
            buf: None,
            eof: false,
            pending: None,
        }
    }

    /// Fills `dst` across refills. An error after some bytes were copied is
    /// held back and returned by the next call.
    async fn read(&mut self, dst: &mut [u8]) -> Result<usize, StreamError> {
        if let Some(err) = self.pending.take() {
            return Err(err);
        }
        let mut filled = 0;
        while filled < dst.len() {
            let buf = self.buf.get_or_insert_with(|| self.pool.get(self.size));
            if buf.remaining() > 0 {
                filled += buf.take_into(&mut dst[filled..]);
                continue;
            }
            if self.eof {
                break;
            }

            buf.reset();
            match self.inner.read(buf.spare_mut()).await {
                Ok(0) => self.eof = true,
                Ok(n) => buf.commit(n),
                Err(e) => {
                    if e.is_eof() {
                        self.eof = true;
                    }
                    if filled > 0 {
                        self.pending = Some(e);
                        break;
                    }
                    return Err(e);
                }
            }
        }
        Ok(filled)
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        let res = self.inner.close().await;
        if let Some(buf) = self.buf.take() {
            buf.free();
        }
        res
    }
}

// ---- write strategies ----

enum WritePath {
    Direct(HookedWriter<BoxWriter>),
    Buffered(BufferedWriter),
    Queued(AsyncWriter<HookedWriter<BoxWriter>>),
}

impl WritePath {
    fn kind(&self) -> &'static str {
        match self {
            WritePath::Direct(_) => "direct",
            WritePath::Buffered(_) => "buffered",
            WritePath::Queued(_) => "queued",
        }
    }

    async fn write(&mut self, src: &[u8]) -> Result<usize, StreamError> {
        match self {
            WritePath::Direct(w) => {
                write_all(w, src).await?;
                Ok(src.len())
            }
            WritePath::Buffered(w) => w.write(src).await,
            WritePath::Queued(w) => w.write(src).await,
        }
    }

    async fn flush(&mut self) -> Result<(), StreamError> {
        match self {
            WritePath::Direct(_) => Ok(()),
            WritePath::Buffered(w) => w.flush().await,
            WritePath::Queued(w) => w.flush().await,
        }
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        match self {
            WritePath::Direct(w) => w.close().await,
            WritePath::Buffered(w) => w.close().await,
            WritePath::Queued(w) => w.close().await,
        }
    }
}

struct BufferedWriter {
    inner: HookedWriter<BoxWriter>,
    pool: BufferPool,
    size: usize,
    buf: Option<PooledBuf>,
    deadline: Duration,
    last_flush: Instant,
    failed: Option<StreamError>,
}

impl BufferedWriter {
    fn new(inner: HookedWriter<BoxWriter>, pool: BufferPool, size: usize, deadline: Duration) -> Self {
        Self {
            inner,
            pool,
            size,
            buf: None,
            deadline,
            last_flush: Instant::now(),
            failed: None,
        }
    }

    async fn write(&mut self, src: &[u8]) -> Result<usize, StreamError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        let mut rest = src;
        while !rest.is_empty() {
            let buf = self.buf.get_or_insert_with(|| self.pool.get(self.size));
            let n = buf.append(rest);
            rest = &rest[n..];
            if buf.is_full() {
                self.flush().await?;
            }
        }
        if !self.deadline.is_zero() && self.last_flush.elapsed() >= self.deadline {
            self.flush().await?;
        }
        Ok(src.len())
    }

    /// Writes the buffered bytes through; the first failure is sticky.
    async fn flush(&mut self) -> Result<(), StreamError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        self.last_flush = Instant::now();
        let Some(buf) = self.buf.as_mut() else {
            return Ok(());
        };
        if buf.is_empty() {
            return Ok(());
        }
        let res = write_all(&mut self.inner, buf.filled()).await;
        buf.reset();
        if let Err(e) = &res {
            self.failed = Some(e.clone());
        }
        res
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        let flushed = self.flush().await;
        let closed = self.inner.close().await;
        if let Some(buf) = self.buf.take() {
            buf.free();
        }
        merge(vec![flushed, closed])
    }
}
