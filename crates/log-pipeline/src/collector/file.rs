//! 파일 기반 라인 수집기
//!
//! 로그 파일을 감시하며 새로운 라인이 추가되면 수집합니다.
//! `tail -F`와 유사한 동작을 비동기 방식으로 구현합니다.
//!
//! # 로테이션 감지
//! - inode 변경 감지 (logrotate 등)
//! - 파일 크기 축소 감지 (truncation)
//! - 사라진 경로는 다시 생길 때까지 대기
//!
//! named pipe는 폴링 대신 스트림으로 읽고, writer가 모두 닫히면 다시 엽니다.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::BytesMut;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tailmetrics_core::metrics as m;

use super::decode_line;
use crate::dispatcher::Dispatcher;
use crate::error::LogPipelineError;

const SOURCE_TYPE: &str = "file";
const READ_CHUNK: usize = 8 * 1024;

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct FileCollectorConfig {
    /// 감시할 파일 경로
    pub path: PathBuf,
    /// 파일 상태 체크 주기 (밀리초)
    pub poll_interval_ms: u64,
    /// 최대 라인 길이 (바이트)
    pub max_line_length: usize,
}

impl FileCollectorConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval_ms: 250,
            max_line_length: 64 * 1024,
        }
    }
}

/// 파일 식별자 (device, inode)
#[cfg(unix)]
type FileId = Option<(u64, u64)>;
#[cfg(not(unix))]
type FileId = Option<()>;

#[cfg(unix)]
fn file_id(meta: &std::fs::Metadata) -> FileId {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_id(_meta: &std::fs::Metadata) -> FileId {
    None
}

#[cfg(unix)]
fn is_fifo(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::FileTypeExt;
    meta.file_type().is_fifo()
}

#[cfg(not(unix))]
fn is_fifo(_meta: &std::fs::Metadata) -> bool {
    false
}

/// 바이트 스트림을 완성된 라인으로 조립합니다.
///
/// 개행이 없는 꼬리는 다음 읽기까지 보관합니다. 꼬리가 최대 길이를 넘으면
/// 버리고, 다음 개행까지 들어오는 바이트도 함께 버립니다.
#[derive(Debug)]
struct LineAssembler {
    buf: BytesMut,
    max_line_length: usize,
    discarding: bool,
}

impl LineAssembler {
    fn new(max_line_length: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(READ_CHUNK),
            max_line_length,
            discarding: false,
        }
    }

    fn push(&mut self, data: &[u8], out: &mut Vec<String>) {
        self.buf.extend_from_slice(data);

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw = self.buf.split_to(pos + 1);
            if self.discarding {
                self.discarding = false;
                continue;
            }
            let line = decode_line(&raw);
            if line.len() > self.max_line_length {
                warn!(max = self.max_line_length, "line exceeds max length, dropped");
                continue;
            }
            if !line.is_empty() {
                out.push(line.into_owned());
            }
        }

        if self.buf.len() > self.max_line_length {
            if !self.discarding {
                warn!(max = self.max_line_length, "line exceeds max length, dropped");
            }
            self.buf.clear();
            self.discarding = true;
        }
    }

    /// 보관 중인 미완성 라인을 버립니다 (파일 교체 시).
    fn reset(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }
}

/// 현재 열려 있는 일반 파일
struct OpenFile {
    file: File,
    offset: u64,
    id: FileId,
}

/// 파일 기반 라인 수집기
///
/// 지정된 파일을 주기적으로 폴링하여 새로운 라인을 수집합니다.
/// 시작 시점에 이미 있는 파일은 끝에서부터, 이후 새로 생긴 파일은 처음부터 읽습니다.
pub struct FileCollector {
    config: FileCollectorConfig,
    dispatcher: Dispatcher,
    cancel_token: CancellationToken,
}

impl FileCollector {
    pub fn new(
        config: FileCollectorConfig,
        dispatcher: Dispatcher,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            dispatcher,
            cancel_token,
        }
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms.max(1))
    }

    /// 취소될 때까지 실행됩니다. `tokio::spawn`으로 별도 태스크에서 호출하세요.
    pub async fn run(self) -> Result<(), LogPipelineError> {
        info!(path = %self.config.path.display(), "file collector started");

        let mut assembler = LineAssembler::new(self.config.max_line_length);
        let mut current: Option<OpenFile> = None;
        let mut first_open = true;
        let mut reported_missing = false;

        loop {
            match tokio::fs::metadata(&self.config.path).await {
                Ok(meta) if is_fifo(&meta) => {
                    reported_missing = false;
                    current = None;
                    assembler.reset();
                    if !self.follow_pipe(&mut assembler).await? {
                        break;
                    }
                    continue;
                }
                Ok(meta) => {
                    reported_missing = false;
                    let id = file_id(&meta);

                    if let Some(open) = current.as_mut() {
                        if open.id != id {
                            // 로테이션: 옛 파일에 남은 내용을 마저 읽고 새 파일로 전환
                            info!(path = %self.config.path.display(), "file rotated, reopening");
                            self.drain(open, &mut assembler).await?;
                            current = None;
                            assembler.reset();
                        } else if meta.len() < open.offset {
                            info!(path = %self.config.path.display(), "file truncated, reading from start");
                            open.file.seek(SeekFrom::Start(0)).await?;
                            open.offset = 0;
                            assembler.reset();
                        }
                    }

                    if current.is_none() {
                        current = self.open(first_open).await?;
                    }
                    first_open = false;

                    if let Some(open) = current.as_mut() {
                        self.drain(open, &mut assembler).await?;
                    }
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    if let Some(open) = current.as_mut() {
                        self.drain(open, &mut assembler).await?;
                    }
                    current = None;
                    first_open = false;
                    if !reported_missing {
                        info!(path = %self.config.path.display(), "waiting for file to appear");
                        reported_missing = true;
                    }
                }
                Err(e) => {
                    warn!(path = %self.config.path.display(), error = %e, "failed to stat file");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval()) => {}
                _ = self.cancel_token.cancelled() => break,
            }
        }

        info!(path = %self.config.path.display(), "file collector stopped");
        Ok(())
    }

    /// 파일을 엽니다. 처음 열 때는 끝으로 이동합니다.
    async fn open(&self, seek_to_end: bool) -> Result<Option<OpenFile>, LogPipelineError> {
        let mut file = match File::open(&self.config.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LogPipelineError::Collector {
                    source_type: SOURCE_TYPE.to_owned(),
                    reason: format!("failed to open {}: {}", self.config.path.display(), e),
                });
            }
        };

        let meta = file.metadata().await?;
        let offset = if seek_to_end {
            file.seek(SeekFrom::End(0)).await?
        } else {
            0
        };

        debug!(path = %self.config.path.display(), offset, "file opened");
        metrics::counter!(m::SOURCE_CONNECTIONS_TOTAL, m::LABEL_SOURCE => SOURCE_TYPE).increment(1);
        Ok(Some(OpenFile {
            file,
            offset,
            id: file_id(&meta),
        }))
    }

    /// 현재 위치부터 EOF까지 읽고 완성된 라인을 디스패처로 넘깁니다.
    async fn drain(
        &self,
        open: &mut OpenFile,
        assembler: &mut LineAssembler,
    ) -> Result<(), LogPipelineError> {
        let mut chunk = vec![0u8; READ_CHUNK];
        let mut lines = Vec::new();
        loop {
            let n = open.file.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            open.offset += n as u64;
            assembler.push(&chunk[..n], &mut lines);
            for line in lines.drain(..) {
                self.dispatcher.ingest(&line).await;
            }
        }
        Ok(())
    }

    /// named pipe를 writer가 닫을 때까지 읽습니다.
    ///
    /// 취소되면 `false`를 반환합니다.
    #[cfg(unix)]
    async fn follow_pipe(&self, assembler: &mut LineAssembler) -> Result<bool, LogPipelineError> {
        use tokio::net::unix::pipe;

        let mut receiver = match pipe::OpenOptions::new().open_receiver(&self.config.path) {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %self.config.path.display(), error = %e, "failed to open pipe");
                return Ok(self.pause().await);
            }
        };
        debug!(path = %self.config.path.display(), "pipe opened");
        metrics::counter!(m::SOURCE_CONNECTIONS_TOTAL, m::LABEL_SOURCE => SOURCE_TYPE).increment(1);

        let mut chunk = vec![0u8; READ_CHUNK];
        let mut lines = Vec::new();
        loop {
            tokio::select! {
                result = receiver.read(&mut chunk) => {
                    match result {
                        Ok(0) => {
                            debug!(path = %self.config.path.display(), "pipe writer closed, reopening");
                            return Ok(self.pause().await);
                        }
                        Ok(n) => {
                            assembler.push(&chunk[..n], &mut lines);
                            for line in lines.drain(..) {
                                self.dispatcher.ingest(&line).await;
                            }
                        }
                        Err(e) => {
                            warn!(path = %self.config.path.display(), error = %e, "pipe read failed");
                            return Ok(self.pause().await);
                        }
                    }
                }
                _ = self.cancel_token.cancelled() => return Ok(false),
            }
        }
    }

    #[cfg(not(unix))]
    async fn follow_pipe(&self, _assembler: &mut LineAssembler) -> Result<bool, LogPipelineError> {
        Ok(self.pause().await)
    }

    /// 한 폴링 주기만큼 쉽니다. 취소되면 `false`.
    async fn pause(&self) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval()) => true,
            _ = self.cancel_token.cancelled() => false,
        }
    }
}
