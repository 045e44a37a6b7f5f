//! Finds running processes that match a watch list.
//!
//! [`match_processes`] performs a single scan; [`RunningProcessService`]
//! rescans on an interval and publishes [`ProcessesToCloseChanged`] whenever
//! the set of applications a user would have to close changes.

mod definition;
mod error;
mod info;
mod matcher;
mod service;
mod table;
mod to_close;
#[cfg(windows)]
mod windows;

#[cfg(test)]
mod testing;

pub use definition::ProcessDefinition;
pub use definition::ProcessFilter;
pub use error::MatchError;
pub use error::ProcessToCloseError;
pub use error::ServiceError;
pub use info::RunningProcessInfo;
pub use matcher::match_processes;
pub use service::DEFAULT_POLL_INTERVAL;
pub use service::ProcessesToCloseChanged;
pub use service::RunningProcessService;
pub use table::ProcessSnapshot;
pub use table::ProcessTable;
pub use table::SysinfoProcessTable;
pub use to_close::ProcessToClose;
pub use to_close::processes_to_close;
