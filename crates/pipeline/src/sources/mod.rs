//! 내장 소스 -- 이벤트 생산 플러그인
//!
//! - [`FileSource`]: 파일 테일링 (`tail -f` 방식, 로테이션 감지)
//! - [`ChannelSource`]: 인프로세스 채널 주입 (임베딩/테스트용)
//!
//! 각 소스는 파이프라인의 소스별 tokio 태스크에서 실행되며,
//! [`EventSender`](logflow_core::plugin::EventSender)를 통해 유입 큐에
//! 이벤트를 전달합니다.

pub mod channel;
pub mod file;

pub use channel::ChannelSource;
pub use file::FileSource;
