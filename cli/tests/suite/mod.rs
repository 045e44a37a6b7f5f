mod codec;
#[cfg(unix)]
mod launch;
