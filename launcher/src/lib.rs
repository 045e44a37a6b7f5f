//! Starts processes under a chosen identity and reports how they finished.
//!
//! [`launch`] validates a [`LaunchRequest`], picks a [`LaunchStrategy`] for
//! it, creates the process and hands back a [`LaunchHandle`] whose
//! [`LaunchHandle::wait`] resolves once the process (and optionally its
//! children) exit, the deadline passes, or the launch is cancelled.

mod env;
mod error;
mod handle;
pub mod identity_switch;
mod output;
mod pe;
mod request;
mod resolve;
mod result;
mod strategy;
mod wait;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub use error::LaunchError;
pub use handle::LaunchHandle;
pub use request::LaunchRequest;
pub use request::PriorityClass;
pub use request::RunAsActiveUser;
pub use request::WindowStyle;
pub use result::LaunchResult;
pub use result::TIMEOUT_EXIT_CODE;
pub use strategy::ConsoleMode;
pub use strategy::IdentitySwitch;
pub use strategy::ImageKind;
pub use strategy::LaunchStrategy;
pub use strategy::select_strategy;

#[cfg(unix)]
use unix as platform;
#[cfg(windows)]
use windows as platform;

/// Starts `request`.
///
/// Returns `Ok(None)` when a shell verb completed without producing a
/// process. Failures after the process exists are delivered through
/// [`LaunchHandle::wait`].
pub fn launch(request: LaunchRequest) -> Result<Option<LaunchHandle>, LaunchError> {
    launch_with_cancellation(request, CancellationToken::new())
}

/// Like [`launch`]; cancelling `cancel` has the same effect as the deadline
/// passing.
pub fn launch_with_cancellation(
    request: LaunchRequest,
    cancel: CancellationToken,
) -> Result<Option<LaunchHandle>, LaunchError> {
    request.validate()?;
    let caller = depkit_identity::caller_identity()?;
    let image = pe::detect_image_kind(
        Path::new(request.normalized_file_path()),
        request.create_no_window,
        request.use_shell_execute,
    );
    let strategy = select_strategy(&request, image, &caller);
    tracing::debug!(
        file_path = request.normalized_file_path(),
        ?image,
        ?strategy,
        "selected launch strategy"
    );
    platform::launch(Arc::new(request), strategy, &caller, cancel)
}
