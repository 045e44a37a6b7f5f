#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("at least one process definition is required")]
    NoDefinitions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("the polling task is already running")]
    AlreadyRunning,

    #[error("the polling task is not running")]
    NotRunning,

    #[error("at least one process definition is required")]
    NoDefinitions,

    #[error("the running process service has stopped")]
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessToCloseError {
    #[error("the process {field} must not be blank")]
    BlankField { field: &'static str },
}
