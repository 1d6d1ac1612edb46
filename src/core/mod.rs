/// Protocol cores, independent of any runtime
///
/// Everything here is driven by explicit events (received lines, fired timer ids) and
/// returns the notifications it produced. The `api` layer owns the tokio side.
pub mod addressing;
pub mod block;
pub mod bus;
pub mod clock;
pub mod dispatcher;
pub mod logs;
pub mod master;
pub mod registers;
pub mod scheduler;
pub mod slave;
pub mod task_manager;

pub use bus::{EventBus, EventKind, ItemEvent, Notification};
pub use clock::{Clock, ManualClock, TimerId, TokioClock};
pub use registers::Quality;
