//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: Clock の時刻 + ランダム部分で ULID を作る。
//!   同じミリ秒内や時計が戻った場合は直前の値を increment して単調増加を保つ

use std::sync::{Arc, Mutex};

use ulid::Ulid;

use crate::domain::{EnvelopeId, WorkerId};
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    /// Strictly increasing within one generator.
    fn next_ulid(&self) -> Ulid;

    fn envelope_id(&self, sender: &WorkerId) -> EnvelopeId {
        EnvelopeId::new(sender.clone(), self.next_ulid())
    }
}

pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
    last: Mutex<Option<Ulid>>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last: Mutex::new(None),
        }
    }
}

impl IdGenerator for UlidGenerator {
    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let candidate = Ulid::from_parts(timestamp_ms, rand::random());

        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let next = match *last {
            // increment は 80bit のランダム部分が溢れたときだけ None
            Some(prev) if candidate <= prev => prev.increment().unwrap_or(candidate),
            _ => candidate,
        };
        *last = Some(next);
        next
    }
}
