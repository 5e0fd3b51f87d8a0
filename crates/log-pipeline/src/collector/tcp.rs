//! TCP 라인 수집기
//!
//! 연결마다 개행으로 구분된 텍스트를 읽어 디스패처로 넘깁니다.
//! 각 연결은 별도의 tokio 태스크에서 처리됩니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tailmetrics_core::metrics as m;

use super::decode_line;
use crate::dispatcher::Dispatcher;
use crate::error::LogPipelineError;

const SOURCE_TYPE: &str = "tcp";

/// TCP 수집기 설정
#[derive(Debug, Clone)]
pub struct TcpCollectorConfig {
    /// 바인드 주소 (예: "0.0.0.0:9129")
    pub bind_addr: String,
    /// 최대 동시 연결 수
    pub max_connections: usize,
    /// 최대 라인 길이 (바이트)
    pub max_line_length: usize,
    /// 유휴 연결 타임아웃 (초)
    pub connection_timeout_secs: u64,
}

impl Default for TcpCollectorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9129".to_owned(),
            max_connections: 256,
            max_line_length: 64 * 1024,
            connection_timeout_secs: 300,
        }
    }
}

/// TCP 라인 수집기
pub struct TcpCollector {
    config: TcpCollectorConfig,
    listener: TcpListener,
    dispatcher: Dispatcher,
    cancel_token: CancellationToken,
}

impl TcpCollector {
    /// 소켓을 바인드합니다. 실패하면 파이프라인 시작이 실패합니다.
    pub async fn bind(
        config: TcpCollectorConfig,
        dispatcher: Dispatcher,
        cancel_token: CancellationToken,
    ) -> Result<Self, LogPipelineError> {
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|e| LogPipelineError::Collector {
                source_type: SOURCE_TYPE.to_owned(),
                reason: format!("failed to bind to {}: {}", config.bind_addr, e),
            })?;

        Ok(Self {
            config,
            listener,
            dispatcher,
            cancel_token,
        })
    }

    /// 실제로 바인드된 주소 (포트 0으로 바인드한 경우에 유용)
    pub fn local_addr(&self) -> Result<SocketAddr, LogPipelineError> {
        Ok(self.listener.local_addr()?)
    }

    /// 연결 수락 루프를 실행합니다. 취소 토큰이 울리면 종료합니다.
    pub async fn run(self) -> Result<(), LogPipelineError> {
        let local = self
            .listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| self.config.bind_addr.clone());
        info!(addr = %local, "tcp collector listening");

        let connection_semaphore = Arc::new(Semaphore::new(self.config.max_connections));

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    let (stream, addr) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            // accept 실패는 해당 연결에만 해당하므로 루프는 계속
                            warn!(error = %e, "tcp accept failed");
                            continue;
                        }
                    };

                    let permit = match Arc::clone(&connection_semaphore).try_acquire_owned() {
                        Ok(p) => p,
                        Err(_) => {
                            warn!(peer = %addr, "max connections reached, rejecting connection");
                            continue;
                        }
                    };

                    debug!(peer = %addr, "accepted connection");
                    metrics::counter!(m::SOURCE_CONNECTIONS_TOTAL, m::LABEL_SOURCE => SOURCE_TYPE)
                        .increment(1);

                    let dispatcher = self.dispatcher.clone();
                    let config = self.config.clone();
                    let cancel = self.cancel_token.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, dispatcher, config, cancel).await {
                            error!(peer = %addr, error = %e, "connection handler error");
                        }
                        drop(permit);
                    });
                }
                _ = self.cancel_token.cancelled() => {
                    info!("tcp collector received shutdown signal");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// 단일 TCP 연결을 처리합니다.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Dispatcher,
    config: TcpCollectorConfig,
    cancel: CancellationToken,
) -> Result<(), LogPipelineError> {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(256);
    let idle_timeout = Duration::from_secs(config.connection_timeout_secs);
    // 개행 한 바이트까지 허용
    let read_limit = config.max_line_length as u64 + 1;

    loop {
        buf.clear();
        let mut limited = (&mut reader).take(read_limit);

        tokio::select! {
            result = timeout(idle_timeout, limited.read_until(b'\n', &mut buf)) => {
                match result {
                    Ok(Ok(0)) => {
                        debug!(peer = %peer, "connection closed by peer");
                        break;
                    }
                    Ok(Ok(_)) => {
                        let terminated = buf.last() == Some(&b'\n');
                        let content_len = if terminated { buf.len() - 1 } else { buf.len() };
                        if content_len > config.max_line_length {
                            warn!(
                                peer = %peer,
                                max = config.max_line_length,
                                "line exceeds max length, closing connection"
                            );
                            break;
                        }

                        let line = decode_line(&buf);
                        if line.is_empty() {
                            continue;
                        }
                        dispatcher.ingest(&line).await;
                    }
                    Ok(Err(e)) => {
                        return Err(LogPipelineError::Collector {
                            source_type: SOURCE_TYPE.to_owned(),
                            reason: format!("read error from {}: {}", peer, e),
                        });
                    }
                    Err(_) => {
                        debug!(peer = %peer, "idle connection timed out");
                        break;
                    }
                }
            }
            _ = cancel.cancelled() => {
                debug!(peer = %peer, "connection handler received shutdown signal");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::IngestStats;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::mpsc;

    fn local_config() -> TcpCollectorConfig {
        TcpCollectorConfig {
            bind_addr: "127.0.0.1:0".to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn default_config() {
        let config = TcpCollectorConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:9129");
        assert_eq!(config.max_connections, 256);
        assert_eq!(config.max_line_length, 65536);
    }

    #[tokio::test]
    async fn bind_to_ephemeral_port() {
        let dispatcher = Dispatcher::new(Arc::new(IngestStats::new()));
        let collector = TcpCollector::bind(local_config(), dispatcher, CancellationToken::new())
            .await
            .unwrap();
        assert_ne!(collector.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn bind_failure_is_collector_error() {
        let dispatcher = Dispatcher::new(Arc::new(IngestStats::new()));
        let config = TcpCollectorConfig {
            bind_addr: "not-an-address".to_owned(),
            ..Default::default()
        };
        let err = TcpCollector::bind(config, dispatcher, CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LogPipelineError::Collector { .. }));
    }

    #[tokio::test]
    async fn lines_reach_dispatcher() {
        let (tx, mut rx) = mpsc::channel(16);
        let stats = Arc::new(IngestStats::new());
        let dispatcher = Dispatcher::new(Arc::clone(&stats)).with_queue("r", tx);
        let cancel = CancellationToken::new();
        let collector = TcpCollector::bind(local_config(), dispatcher, cancel.clone())
            .await
            .unwrap();
        let addr = collector.local_addr().unwrap();
        let task = tokio::spawn(collector.run());

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"first\r\n\nsecond\nthird").await.unwrap();
        client.shutdown().await.unwrap();

        assert_eq!(&*rx.recv().await.unwrap(), "first");
        assert_eq!(&*rx.recv().await.unwrap(), "second");
        assert_eq!(&*rx.recv().await.unwrap(), "third");
        assert_eq!(stats.ingested(), 3);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn overlong_line_closes_connection() {
        let (tx, mut rx) = mpsc::channel(16);
        let dispatcher = Dispatcher::new(Arc::new(IngestStats::new())).with_queue("r", tx);
        let cancel = CancellationToken::new();
        let config = TcpCollectorConfig {
            max_line_length: 8,
            ..local_config()
        };
        let collector = TcpCollector::bind(config, dispatcher, cancel.clone())
            .await
            .unwrap();
        let addr = collector.local_addr().unwrap();
        let task = tokio::spawn(collector.run());

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"12345678\nthis line is far too long\nafter\n")
            .await
            .unwrap();

        assert_eq!(&*rx.recv().await.unwrap(), "12345678");
        let next = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(next.is_err(), "nothing after the overlong line should arrive");

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn overlong_line_without_newline_hangs_up_on_peer() {
        let dispatcher = Dispatcher::new(Arc::new(IngestStats::new()));
        let cancel = CancellationToken::new();
        let config = TcpCollectorConfig {
            max_line_length: 8,
            ..local_config()
        };
        let collector = TcpCollector::bind(config, dispatcher, cancel.clone())
            .await
            .unwrap();
        let addr = collector.local_addr().unwrap();
        let task = tokio::spawn(collector.run());

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"0123456789abcdef").await.unwrap();

        // 서버가 연결을 닫으면 EOF(또는 reset)가 보여야 함
        let mut scratch = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(2), client.read(&mut scratch))
            .await
            .expect("server should close the connection");
        assert!(matches!(read, Ok(0) | Err(_)), "got: {read:?}");

        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
