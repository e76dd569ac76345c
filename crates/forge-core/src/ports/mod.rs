//! Ports - 外部との境界
//!
//! 時刻・ID 生成・activity log を trait にしておき、テストで差し替えられるようにする。

pub mod activity_sink;
pub mod clock;
pub mod id_generator;

pub use self::activity_sink::ActivitySink;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
