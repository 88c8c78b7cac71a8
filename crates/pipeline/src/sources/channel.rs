//! 채널 소스 -- 인프로세스 mpsc 채널로 이벤트를 주입
//!
//! 임베딩 환경이나 테스트 하네스가 `Sender` 측을 쥐고 파이프라인에
//! 이벤트를 직접 주입할 때 사용합니다. 팩토리가 채널 쌍을 만들어
//! `Sender`를 호출자에게 돌려주는 구조이므로, 인스턴스는 한 번만
//! 생성할 수 있습니다 (재시작하려면 팩토리를 다시 만들어야 합니다).

use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc};

use logflow_core::config::BackpressureMode;
use logflow_core::error::{ConfigError, SourceError};
use logflow_core::event::LogEvent;
use logflow_core::plugin::{EventSender, Source, SourceFactory};

/// 채널 소스
pub struct ChannelSource {
    name: String,
    rx: Option<mpsc::Receiver<LogEvent>>,
    backpressure: BackpressureMode,
}

impl ChannelSource {
    /// 채널 쌍을 만들어 (팩토리, 주입용 Sender)를 반환합니다.
    ///
    /// 팩토리는 레지스트리에 임의의 타입 태그로 등록할 수 있으며,
    /// 첫 번째 인스턴스 생성 시 Receiver를 소비합니다.
    pub fn factory(capacity: usize) -> (SourceFactory, mpsc::Sender<LogEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let slot = Arc::new(Mutex::new(Some(rx)));
        let factory: SourceFactory = Arc::new(move |record| {
            let rx = slot
                .lock()
                .expect("channel source slot lock poisoned")
                .take()
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: format!("sources.{}", record.name),
                    reason: "channel source can only be instantiated once".to_owned(),
                })?;
            Ok(Box::new(ChannelSource {
                name: record.name.clone(),
                rx: Some(rx),
                backpressure: BackpressureMode::Block,
            }))
        });
        (factory, tx)
    }
}

impl Source for ChannelSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn backpressure(&self) -> BackpressureMode {
        self.backpressure
    }

    async fn run(
        &mut self,
        emit: EventSender,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), SourceError> {
        let Some(mut rx) = self.rx.take() else {
            return Err(SourceError::Read {
                name: self.name.clone(),
                reason: "channel source already consumed".to_owned(),
            });
        };

        tracing::info!(source = %self.name, "channel source started");

        loop {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(mut event) => {
                        if event.source.is_empty() {
                            event.source = self.name.clone();
                        }
                        if emit.emit(event).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        // 주입 측이 Sender를 닫음: 수집 종료
                        tracing::debug!(source = %self.name, "injection channel closed");
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    // 정지 신호: 이미 주입된 이벤트는 가능한 만큼 전달
                    while let Ok(mut event) = rx.try_recv() {
                        if event.source.is_empty() {
                            event.source = self.name.clone();
                        }
                        if emit.emit(event).await.is_err() {
                            break;
                        }
                    }
                    break;
                }
            }
        }

        tracing::info!(source = %self.name, "channel source stopped");
        Ok(())
    }
}
