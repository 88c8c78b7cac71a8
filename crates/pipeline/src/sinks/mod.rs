//! 내장 싱크 -- 배치 소비 플러그인
//!
//! - [`FileSink`]: JSON Lines / 템플릿 텍스트 파일 출력
//! - [`ChannelSink`]: 인프로세스 채널로 배치 전달 (임베딩/테스트용)

pub mod channel;
pub mod file;

pub use channel::ChannelSink;
pub use file::FileSink;
