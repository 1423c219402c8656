//! Task repository service
//!
//! The only component that writes to the task store on behalf of users;
//! everything reaches it as `task.action.requested` events.

mod service;

pub use service::TaskService;
