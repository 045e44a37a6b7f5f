//! Small Win32 helpers shared by the identity and launcher crates.

#[cfg(windows)]
mod handle;
#[cfg(windows)]
mod text;

#[cfg(windows)]
pub use handle::borrowed_raw;
#[cfg(windows)]
pub use handle::owned_from_raw;
#[cfg(windows)]
pub use handle::owned_raw;
#[cfg(windows)]
pub use text::from_wide_ptr;
#[cfg(windows)]
pub use text::string_from_sid;
#[cfg(windows)]
pub use text::to_wide;
