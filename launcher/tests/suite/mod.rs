// Aggregates all former standalone integration tests as modules.
#[cfg(unix)]
mod launch;
