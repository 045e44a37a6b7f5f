#[cfg(unix)]
mod host_table;
