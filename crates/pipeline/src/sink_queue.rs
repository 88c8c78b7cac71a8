//! 싱크 대기 큐 -- 배치 단위 유한 큐와 오버플로우 정책
//!
//! 배처와 싱크 워커 사이의 유한 큐입니다. 큐가 가득 찼을 때:
//! - [`OverflowPolicy::Block`]: 공간이 생길 때까지 배처를 대기시킴
//! - [`OverflowPolicy::DropOldest`]: 가장 오래된 배치를 드롭하고 수용
//! - [`OverflowPolicy::DropNew`]: 새 배치를 거부
//!
//! 배처 하나(생산자)와 싱크 워커 하나(소비자)가 사용합니다.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use logflow_core::OverflowPolicy;
use logflow_core::event::Batch;

/// 싱크별 배치 대기 큐
pub struct SinkQueue {
    /// 큐 내부 저장소
    inner: Mutex<VecDeque<Arc<Batch>>>,
    /// 최대 용량 (배치 단위)
    capacity: usize,
    /// 오버플로우 정책
    policy: OverflowPolicy,
    /// 닫힘 플래그. 닫힌 뒤에는 push가 드롭으로 처리되고,
    /// pop은 잔여 배치를 모두 비운 뒤 None을 반환합니다.
    closed: AtomicBool,
    /// 공간이 생겼을 때 생산자에게 알림
    space: Notify,
    /// 배치가 들어오거나 큐가 닫혔을 때 소비자에게 알림
    items: Notify,
}

impl SinkQueue {
    /// 새 큐를 생성합니다.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
            policy,
            closed: AtomicBool::new(false),
            space: Notify::new(),
            items: Notify::new(),
        }
    }

    /// 배치를 큐에 넣습니다.
    ///
    /// 오버플로우 정책에 따라 드롭된 이벤트 수를 반환합니다.
    /// 큐가 닫혀 있으면 배치 전체가 드롭으로 처리됩니다.
    pub async fn push(&self, batch: Arc<Batch>) -> u64 {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return batch.len() as u64;
            }

            {
                let mut queue = self.inner.lock().expect("sink queue lock poisoned");
                if queue.len() < self.capacity {
                    queue.push_back(batch);
                    drop(queue);
                    self.items.notify_one();
                    return 0;
                }

                match self.policy {
                    OverflowPolicy::DropOldest => {
                        let dropped = queue.pop_front().map(|old| old.len() as u64).unwrap_or(0);
                        queue.push_back(batch);
                        drop(queue);
                        self.items.notify_one();
                        return dropped;
                    }
                    OverflowPolicy::DropNew => {
                        return batch.len() as u64;
                    }
                    OverflowPolicy::Block => {}
                }
            }

            // Block 정책: 소비자가 공간을 비우거나 큐가 닫힐 때까지 대기
            self.space.notified().await;
        }
    }

    /// 배치를 꺼냅니다.
    ///
    /// 큐가 비어있으면 배치가 들어올 때까지 대기하고,
    /// 닫힌 큐가 비면 `None`을 반환합니다.
    pub async fn pop(&self) -> Option<Arc<Batch>> {
        loop {
            {
                let mut queue = self.inner.lock().expect("sink queue lock poisoned");
                if let Some(batch) = queue.pop_front() {
                    drop(queue);
                    self.space.notify_one();
                    return Some(batch);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }

            self.items.notified().await;
        }
    }

    /// 큐를 닫습니다. 대기 중인 생산자/소비자가 모두 깨어납니다.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.items.notify_waiters();
        self.space.notify_waiters();
        // 알림 이후 대기에 들어간 태스크를 위한 잔여 퍼밋
        self.items.notify_one();
        self.space.notify_one();
    }

    /// 현재 큐에 대기 중인 배치 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("sink queue lock poisoned").len()
    }

    /// 큐가 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
