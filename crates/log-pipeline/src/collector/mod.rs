//! 라인 수집 모듈 -- 다양한 소스에서 텍스트 라인을 받아 디스패처로 넘깁니다.
//!
//! # 수집 소스
//! - [`FileCollector`]: 파일/named pipe tail
//! - [`TcpCollector`]: 연결마다 개행 구분 텍스트 수신
//! - [`UdpCollector`]: 데이터그램마다 개행으로 나눠 수신
//!
//! # 아키텍처
//! 각 수집기는 자체 tokio 태스크에서 실행되며, 받은 라인마다
//! [`Dispatcher::ingest`](crate::dispatcher::Dispatcher::ingest)를 직접 호출합니다.
//! 디스패처가 막히면 수집기도 함께 기다립니다.

pub mod file;
pub mod tcp;
pub mod udp;

pub use file::{FileCollector, FileCollectorConfig};
pub use tcp::{TcpCollector, TcpCollectorConfig};
pub use udp::UdpCollector;

use std::borrow::Cow;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::LogPipelineError;

/// 수집기 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorStatus {
    /// 실행 대기 중
    Idle,
    /// 실행 중
    Running,
    /// 에러로 중단됨
    Error(String),
    /// 정상 종료됨
    Stopped,
}

/// 줄 끝의 `\n`, `\r\n`을 떼고 UTF-8로 해석합니다 (잘못된 바이트는 대체 문자).
pub fn decode_line(raw: &[u8]) -> Cow<'_, str> {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw)
}

/// 버퍼를 개행으로 나눕니다. 빈 줄은 건너뜁니다.
pub fn split_lines(buf: &[u8]) -> impl Iterator<Item = Cow<'_, str>> {
    buf.split(|&b| b == b'\n')
        .map(decode_line)
        .filter(|line| !line.is_empty())
}

struct CollectorEntry {
    name: String,
    status: Arc<Mutex<CollectorStatus>>,
    handle: JoinHandle<()>,
}

/// 수집기 세트 -- 실행 중인 수집기 태스크와 상태를 관리합니다.
#[derive(Default)]
pub struct CollectorSet {
    entries: Vec<CollectorEntry>,
}

impl CollectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 수집기 future를 태스크로 띄우고 종료 결과를 상태로 기록합니다.
    pub fn spawn<F>(&mut self, name: impl Into<String>, collector: F)
    where
        F: Future<Output = Result<(), LogPipelineError>> + Send + 'static,
    {
        let name = name.into();
        let status = Arc::new(Mutex::new(CollectorStatus::Running));
        let task_status = Arc::clone(&status);
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let finished = match collector.await {
                Ok(()) => CollectorStatus::Stopped,
                Err(e) => {
                    tracing::error!(collector = %task_name, error = %e, "collector failed");
                    CollectorStatus::Error(e.to_string())
                }
            };
            *task_status.lock().unwrap_or_else(PoisonError::into_inner) = finished;
        });

        self.entries.push(CollectorEntry {
            name,
            status,
            handle,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 모든 수집기의 이름과 상태
    pub fn statuses(&self) -> Vec<(String, CollectorStatus)> {
        self.entries
            .iter()
            .map(|e| {
                let status = e.status.lock().unwrap_or_else(PoisonError::into_inner).clone();
                (e.name.clone(), status)
            })
            .collect()
    }

    /// 이미 끝난 수집기 이름 (정지 요청 전이라면 비정상)
    pub fn finished(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.handle.is_finished())
            .map(|e| e.name.clone())
            .collect()
    }

    /// 모든 수집기가 끝나기를 `grace` 동안 기다리고, 남은 태스크는 중단합니다.
    pub async fn join_all(&mut self, grace: Duration) {
        for mut entry in self.entries.drain(..) {
            match tokio::time::timeout(grace, &mut entry.handle).await {
                Ok(_) => {}
                Err(_) => {
                    tracing::warn!(collector = %entry.name, "collector did not stop in time, aborting");
                    entry.handle.abort();
                }
            }
        }
    }
}
