pub mod dispatcher;
pub mod notify;
pub mod registry;
pub mod timer;

#[cfg(test)]
pub mod testing;

pub use dispatcher::TriggerDispatcher;
pub use notify::NotificationBoard;
pub use registry::{AlarmRegistry, ScheduleEntry};
pub use timer::{TimerError, TokioTimer};
