//! App - worker を組み合わせて 1 つのプロセスにする層
//!
//! # 主要コンポーネント
//! - **Directory**: worker の登録と envelope のルーティング
//! - **ForgeBuilder**: 登録とワイヤリングの検証（Fail-fast）
//! - **Runtime**: worker loop の起動・停止・drain 待ち

pub mod builder;
pub mod directory;
pub mod runtime;

pub use self::builder::{BuildError, ForgeBuilder};
pub use self::directory::{Directory, DropReason, RouteOutcome};
pub use self::runtime::Runtime;
