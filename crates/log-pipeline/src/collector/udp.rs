//! UDP 라인 수집기
//!
//! 데이터그램 하나에 여러 줄이 들어 있을 수 있으므로 개행으로 나눠
//! 한 줄씩 디스패처에 넘깁니다.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::split_lines;
use crate::dispatcher::Dispatcher;
use crate::error::LogPipelineError;

const SOURCE_TYPE: &str = "udp";

/// UDP 데이터그램 최대 크기
const MAX_DATAGRAM_SIZE: usize = 65536;

/// UDP 라인 수집기
pub struct UdpCollector {
    socket: UdpSocket,
    dispatcher: Dispatcher,
    cancel_token: CancellationToken,
}

impl UdpCollector {
    /// 소켓을 바인드합니다.
    pub async fn bind(
        bind_addr: &str,
        dispatcher: Dispatcher,
        cancel_token: CancellationToken,
    ) -> Result<Self, LogPipelineError> {
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| LogPipelineError::Collector {
                source_type: SOURCE_TYPE.to_owned(),
                reason: format!("failed to bind to {}: {}", bind_addr, e),
            })?;

        Ok(Self {
            socket,
            dispatcher,
            cancel_token,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, LogPipelineError> {
        Ok(self.socket.local_addr()?)
    }

    /// 수신 루프. 데이터그램을 모두 처리한 뒤에야 다음 데이터그램을 받습니다.
    pub async fn run(self) -> Result<(), LogPipelineError> {
        if let Ok(addr) = self.socket.local_addr() {
            info!(addr = %addr, "udp collector listening");
        }

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, peer)) => {
                            debug!(peer = %peer, bytes = len, "datagram received");
                            for line in split_lines(&buf[..len]) {
                                self.dispatcher.ingest(&line).await;
                            }
                        }
                        Err(e) => {
                            // ICMP port unreachable 등은 소켓 자체 문제가 아님
                            warn!(error = %e, "udp receive failed");
                        }
                    }
                }
                _ = self.cancel_token.cancelled() => {
                    info!("udp collector received shutdown signal");
                    break;
                }
            }
        }

        Ok(())
    }
}
