//! Mailbox - worker 専用の MPSC FIFO キュー
//!
//! # 実装詳細
//! - `Mutex<VecDeque<Envelope>>` が正本、`Notify` で consumer / 待機中の producer を起こす
//! - producer は何本でもよい（Directory 経由で任意の worker が push する）
//! - consumer は所有 worker のループ 1 本だけ
//! - `pop()` は cancel-safe: lock 取得後に await を挟まずに取り出すので、
//!   `select!` で負けても envelope は失われない

mod policy;

pub use policy::{MailboxConfig, OverflowPolicy, PushOutcome};

use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};

use crate::domain::{Envelope, WorkerId};
use crate::error::ForgeError;

struct MailboxState {
    queue: VecDeque<Envelope>,
    /// pop された envelope を consumer がまだ処理中
    in_flight: bool,
    closed: bool,
}

pub struct Mailbox {
    owner: WorkerId,
    config: MailboxConfig,
    state: Mutex<MailboxState>,
    /// push 時の通知（consumer 用）
    items: Notify,
    /// pop 時の通知（Block policy で待っている producer 用）
    space: Notify,
}

impl Mailbox {
    pub fn new(owner: WorkerId, config: MailboxConfig) -> Self {
        let config = MailboxConfig {
            capacity: config.capacity.max(1),
            ..config
        };
        Self {
            owner,
            config,
            state: Mutex::new(MailboxState {
                queue: VecDeque::new(),
                in_flight: false,
                closed: false,
            }),
            items: Notify::new(),
            space: Notify::new(),
        }
    }

    /// Enqueue one envelope according to the overflow policy.
    ///
    /// Only `Block` can make this wait; every other policy returns immediately.
    pub async fn push(&self, envelope: Envelope) -> Result<PushOutcome, ForgeError> {
        loop {
            let space = self.space.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Err(ForgeError::MailboxClosed(self.owner.clone()));
                }

                let full = self
                    .config
                    .limit()
                    .is_some_and(|limit| state.queue.len() >= limit);

                if !full {
                    state.queue.push_back(envelope);
                    drop(state);
                    self.items.notify_one();
                    return Ok(PushOutcome::Enqueued);
                }

                match self.config.policy {
                    OverflowPolicy::DropNewest => return Ok(PushOutcome::Rejected),
                    OverflowPolicy::DropOldest => {
                        let evicted = state.queue.pop_front();
                        state.queue.push_back(envelope);
                        drop(state);
                        self.items.notify_one();
                        return Ok(match evicted {
                            Some(old) => PushOutcome::Evicted(old.id().clone()),
                            None => PushOutcome::Enqueued,
                        });
                    }
                    // full のときだけここに来るので Unbounded は実質到達しない
                    OverflowPolicy::Block | OverflowPolicy::Unbounded => {}
                }
            }

            space.await;
        }
    }

    /// Wait for the next envelope. `None` once the mailbox is closed and drained.
    ///
    /// The popped envelope counts as in flight until the consumer calls [`Mailbox::done`].
    pub async fn pop(&self) -> Option<Envelope> {
        loop {
            let items = self.items.notified();
            tokio::pin!(items);
            items.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if let Some(envelope) = state.queue.pop_front() {
                    state.in_flight = true;
                    drop(state);
                    self.space.notify_one();
                    return Some(envelope);
                }
                if state.closed {
                    return None;
                }
            }

            items.await;
        }
    }

    pub async fn try_pop(&self) -> Option<Envelope> {
        let envelope = self.state.lock().await.queue.pop_front();
        if envelope.is_some() {
            self.space.notify_one();
        }
        envelope
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn done(&self) {
        self.state.lock().await.in_flight = false;
    }

    /// Nothing queued and nothing in flight. Checked under one lock so a
    /// just-popped envelope is never missed.
    pub async fn is_settled(&self) -> bool {
        let state = self.state.lock().await;
        state.queue.is_empty() && !state.in_flight
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    /// Refuse further pushes and wake everyone waiting.
    /// Already queued envelopes can still be popped.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.items.notify_waiters();
        self.space.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Action, EnvelopeId, Payload};
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;
    use ulid::Ulid;

    fn envelope(tag: u64) -> Envelope {
        let mut payload = Payload::new();
        payload.insert("seq".to_string(), tag.into());
        Envelope::new(
            EnvelopeId::new(WorkerId::new("test"), Ulid::from_parts(tag, 0)),
            WorkerId::new("owner"),
            Action::new("tick"),
            payload,
            Utc::now(),
        )
    }

    fn seq(env: &Envelope) -> u64 {
        env.payload()["seq"].as_u64().unwrap()
    }

    #[tokio::test]
    async fn pops_in_fifo_order() {
        let mailbox = Mailbox::new(WorkerId::new("owner"), MailboxConfig::unbounded());
        for i in 0..5 {
            mailbox.push(envelope(i)).await.unwrap();
        }
        let mut got = Vec::new();
        while let Some(env) = mailbox.try_pop().await {
            got.push(seq(&env));
        }
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn push_wakes_waiting_pop() {
        let mailbox = Arc::new(Mailbox::new(WorkerId::new("owner"), MailboxConfig::unbounded()));

        let waiter = tokio::spawn({
            let mailbox = mailbox.clone();
            async move { mailbox.pop().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        mailbox.push(envelope(7)).await.unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(seq(&got), 7);
    }

    #[tokio::test]
    async fn popped_envelope_is_in_flight_until_done() {
        let mailbox = Mailbox::new(WorkerId::new("owner"), MailboxConfig::unbounded());
        assert!(mailbox.is_settled().await);

        mailbox.push(envelope(1)).await.unwrap();
        mailbox.pop().await.unwrap();
        assert!(mailbox.is_empty().await);
        assert!(!mailbox.is_settled().await);

        mailbox.done().await;
        assert!(mailbox.is_settled().await);
    }

    #[tokio::test]
    async fn drop_newest_rejects_when_full() {
        let mailbox = Mailbox::new(
            WorkerId::new("owner"),
            MailboxConfig::bounded(2, OverflowPolicy::DropNewest),
        );
        assert_eq!(mailbox.push(envelope(1)).await.unwrap(), PushOutcome::Enqueued);
        assert_eq!(mailbox.push(envelope(2)).await.unwrap(), PushOutcome::Enqueued);
        assert_eq!(mailbox.push(envelope(3)).await.unwrap(), PushOutcome::Rejected);

        assert_eq!(mailbox.len().await, 2);
        assert_eq!(seq(&mailbox.try_pop().await.unwrap()), 1);
        assert_eq!(seq(&mailbox.try_pop().await.unwrap()), 2);
    }

    #[tokio::test]
    async fn drop_oldest_evicts_head() {
        let mailbox = Mailbox::new(
            WorkerId::new("owner"),
            MailboxConfig::bounded(2, OverflowPolicy::DropOldest),
        );
        let first = envelope(1);
        let first_id = first.id().clone();
        mailbox.push(first).await.unwrap();
        mailbox.push(envelope(2)).await.unwrap();

        let outcome = mailbox.push(envelope(3)).await.unwrap();
        assert_eq!(outcome, PushOutcome::Evicted(first_id));

        assert_eq!(seq(&mailbox.try_pop().await.unwrap()), 2);
        assert_eq!(seq(&mailbox.try_pop().await.unwrap()), 3);
    }

    #[tokio::test]
    async fn block_waits_for_room() {
        let mailbox = Arc::new(Mailbox::new(
            WorkerId::new("owner"),
            MailboxConfig::bounded(1, OverflowPolicy::Block),
        ));
        mailbox.push(envelope(1)).await.unwrap();

        let producer = tokio::spawn({
            let mailbox = mailbox.clone();
            async move { mailbox.push(envelope(2)).await }
        });

        // 満杯なので producer は待っているはず
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());

        assert_eq!(seq(&mailbox.pop().await.unwrap()), 1);
        let outcome = tokio::time::timeout(Duration::from_secs(1), producer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(outcome, PushOutcome::Enqueued);
        assert_eq!(seq(&mailbox.pop().await.unwrap()), 2);
    }

    #[tokio::test]
    async fn close_rejects_push_and_ends_pop_after_drain() {
        let mailbox = Mailbox::new(WorkerId::new("owner"), MailboxConfig::unbounded());
        mailbox.push(envelope(1)).await.unwrap();
        assert!(!mailbox.is_closed().await);
        mailbox.close().await;
        assert!(mailbox.is_closed().await);

        assert!(matches!(
            mailbox.push(envelope(2)).await,
            Err(ForgeError::MailboxClosed(_))
        ));
        assert_eq!(seq(&mailbox.pop().await.unwrap()), 1);
        assert!(mailbox.pop().await.is_none());
    }

    #[tokio::test]
    async fn close_wakes_blocked_consumer() {
        let mailbox = Arc::new(Mailbox::new(WorkerId::new("owner"), MailboxConfig::unbounded()));
        let waiter = tokio::spawn({
            let mailbox = mailbox.clone();
            async move { mailbox.pop().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        mailbox.close().await;

        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(got.is_none());
    }
}
