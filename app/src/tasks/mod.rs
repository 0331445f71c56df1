pub mod console;
pub mod dispatch;
pub mod notify;
pub mod task;
