//! forge-core
//!
//! Actor-style message passing for the idea pipeline.
//!
//! # モジュール構成
//! - **domain**: ids, envelope, activity record, metrics, stage ids
//! - **mailbox**: worker ごとの FIFO キュー（bound と overflow policy つき）
//! - **worker**: mailbox を消費するループと `StageHandler` hook
//! - **app**: Directory（ルーティング）, ForgeBuilder（ワイヤリング）, Runtime
//! - **ports**: Clock, IdGenerator, ActivitySink の抽象化
//! - **impls**: ActivitySink の実装
//! - **stages**: capture → classify → expand → visualize → propose → review
//! - **config**: forge.toml

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod mailbox;
pub mod ports;
pub mod stages;
pub mod worker;

#[cfg(test)]
mod testkit;

pub use app::{BuildError, Directory, DropReason, ForgeBuilder, RouteOutcome, Runtime};
pub use config::{ConfigError, ForgeConfig};
pub use error::ForgeError;
pub use worker::{HandlerError, StageHandler, Worker, WorkerContext, WorkerSpec};
