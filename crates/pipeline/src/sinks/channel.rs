//! 채널 싱크 -- 배치를 인프로세스 mpsc 채널로 전달
//!
//! 임베딩 환경이나 테스트 하네스가 `Receiver` 측을 쥐고 파이프라인의
//! 출력을 직접 관찰할 때 사용합니다. 채널 소스와 마찬가지로 팩토리가
//! 채널 쌍을 만들어 `Receiver`를 호출자에게 돌려줍니다.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use logflow_core::error::{ConfigError, SinkError};
use logflow_core::event::Batch;
use logflow_core::plugin::{Sink, SinkFactory};

/// 채널 싱크
pub struct ChannelSink {
    name: String,
    tx: mpsc::Sender<Batch>,
}

impl ChannelSink {
    /// 채널 쌍을 만들어 (팩토리, 관찰용 Receiver)를 반환합니다.
    pub fn factory(capacity: usize) -> (SinkFactory, mpsc::Receiver<Batch>) {
        let (tx, rx) = mpsc::channel(capacity);
        let slot = Arc::new(Mutex::new(Some(tx)));
        let factory: SinkFactory = Arc::new(move |record| {
            let tx = slot
                .lock()
                .expect("channel sink slot lock poisoned")
                .take()
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: format!("sinks.{}", record.name),
                    reason: "channel sink can only be instantiated once".to_owned(),
                })?;
            Ok(Box::new(ChannelSink {
                name: record.name.clone(),
                tx,
            }))
        });
        (factory, rx)
    }
}

impl Sink for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn write(&mut self, batch: &Batch) -> Result<(), SinkError> {
        self.tx
            .send(batch.clone())
            .await
            .map_err(|_| SinkError::Fatal("observer channel closed".to_owned()))
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
