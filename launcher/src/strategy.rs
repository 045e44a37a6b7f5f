use depkit_identity::CallerIdentity;
use depkit_identity::TokenRequest;

use crate::LaunchRequest;
use crate::WindowStyle;

/// Subsystem of the image being launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Console,
    Gui,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySwitch {
    CurrentUser,
    ActiveUser(TokenRequest),
    Unelevated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleMode {
    /// GUI images: no console, no pipes.
    Inherit,
    /// Visible console applications get a console of their own.
    NewConsole,
    /// Quiet console applications: `CREATE_NO_WINDOW` with redirected output.
    Hidden,
}

impl ConsoleMode {
    /// `wShowWindow` for the new process, if any. Only the requested window
    /// style sets it; hidden consoles rely on `CREATE_NO_WINDOW` instead.
    pub fn show_command(self, style: Option<WindowStyle>) -> Option<u16> {
        match self {
            ConsoleMode::Hidden => None,
            ConsoleMode::Inherit | ConsoleMode::NewConsole => style.map(WindowStyle::show_command),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchStrategy {
    Direct {
        identity: IdentitySwitch,
        console: ConsoleMode,
        capture_output: bool,
    },
    ShellVerb {
        verb: Option<String>,
    },
}

/// Decides how a request is started.
///
/// Shell execution only handles requests that neither run as another user
/// nor want a hidden console; everything else is created directly.
pub fn select_strategy(
    request: &LaunchRequest,
    image: ImageKind,
    caller: &CallerIdentity,
) -> LaunchStrategy {
    let console_image = image == ImageKind::Console;
    let direct = (console_image && request.create_no_window)
        || !request.use_shell_execute
        || request.run_as_active_user.is_some();
    if !direct {
        return LaunchStrategy::ShellVerb {
            verb: request
                .verb
                .as_deref()
                .map(str::trim)
                .filter(|verb| !verb.is_empty())
                .map(str::to_string),
        };
    }

    let console = match (console_image, request.create_no_window) {
        (false, _) => ConsoleMode::Inherit,
        (true, true) => ConsoleMode::Hidden,
        (true, false) => ConsoleMode::NewConsole,
    };
    LaunchStrategy::Direct {
        identity: select_identity(request, caller),
        console,
        capture_output: console == ConsoleMode::Hidden,
    }
}

fn select_identity(request: &LaunchRequest, caller: &CallerIdentity) -> IdentitySwitch {
    if let Some(user) = request
        .run_as_active_user
        .as_ref()
        .filter(|user| caller.is_other_account(&user.sid))
    {
        return IdentitySwitch::ActiveUser(TokenRequest {
            account: user.account.clone(),
            sid: user.sid.clone(),
            session_id: user.session_id,
            prefer_linked: request.wants_elevated_token(),
            allow_fallback_to_highest: request.use_highest_available_token,
        });
    }
    if request.use_unelevated_token && caller.is_admin && !caller.is_local_system {
        return IdentitySwitch::Unelevated;
    }
    IdentitySwitch::CurrentUser
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RunAsActiveUser;
    use pretty_assertions::assert_eq;

    fn caller(is_admin: bool, is_local_system: bool) -> CallerIdentity {
        CallerIdentity {
            username: "CONTOSO\\admin".to_string(),
            sid: "S-1-5-21-1-2-3-500".to_string(),
            is_admin,
            is_local_system,
        }
    }

    fn other_user() -> RunAsActiveUser {
        RunAsActiveUser {
            account: "CONTOSO\\user".to_string(),
            sid: "S-1-5-21-1-2-3-1001".to_string(),
            session_id: 2,
        }
    }

    fn request(use_shell_execute: bool, create_no_window: bool) -> LaunchRequest {
        LaunchRequest {
            use_shell_execute,
            create_no_window,
            ..LaunchRequest::new("C:\\app.exe")
        }
    }

    #[test]
    fn direct_versus_shell_table() {
        let admin = caller(true, false);
        let cases = [
            (ImageKind::Console, false, false, true),
            (ImageKind::Console, true, true, true),
            (ImageKind::Console, true, false, false),
            (ImageKind::Gui, true, true, false),
            (ImageKind::Gui, true, false, false),
            (ImageKind::Gui, false, true, true),
        ];
        for (image, shell, no_window, expect_direct) in cases {
            let strategy = select_strategy(&request(shell, no_window), image, &admin);
            assert_eq!(
                matches!(strategy, LaunchStrategy::Direct { .. }),
                expect_direct,
                "{image:?} shell={shell} no_window={no_window}"
            );
        }
    }

    #[test]
    fn run_as_forces_direct_creation() {
        let req = LaunchRequest {
            run_as_active_user: Some(other_user()),
            ..request(true, false)
        };
        let strategy = select_strategy(&req, ImageKind::Gui, &caller(false, true));
        assert!(matches!(
            strategy,
            LaunchStrategy::Direct {
                identity: IdentitySwitch::ActiveUser(_),
                ..
            }
        ));
    }

    #[test]
    fn console_modes_follow_window_visibility() {
        let admin = caller(true, false);
        let cases = [
            (ImageKind::Console, true, ConsoleMode::Hidden, true),
            (ImageKind::Console, false, ConsoleMode::NewConsole, false),
            (ImageKind::Gui, true, ConsoleMode::Inherit, false),
            (ImageKind::Gui, false, ConsoleMode::Inherit, false),
        ];
        for (image, no_window, expected_console, expected_capture) in cases {
            let strategy = select_strategy(&request(false, no_window), image, &admin);
            assert_eq!(
                strategy,
                LaunchStrategy::Direct {
                    identity: IdentitySwitch::CurrentUser,
                    console: expected_console,
                    capture_output: expected_capture,
                }
            );
        }
    }

    #[test]
    fn token_request_flags() {
        let cases = [
            (false, false, false, false),
            (true, false, true, false),
            (false, true, true, true),
            (true, true, true, true),
        ];
        for (linked, highest, prefer_linked, fallback) in cases {
            let req = LaunchRequest {
                run_as_active_user: Some(other_user()),
                use_linked_admin_token: linked,
                use_highest_available_token: highest,
                ..request(false, false)
            };
            let LaunchStrategy::Direct {
                identity: IdentitySwitch::ActiveUser(token),
                ..
            } = select_strategy(&req, ImageKind::Console, &caller(false, true))
            else {
                panic!("expected an active-user launch");
            };
            assert_eq!(token.session_id, 2);
            assert_eq!(token.prefer_linked, prefer_linked);
            assert_eq!(token.allow_fallback_to_highest, fallback);
        }
    }

    #[test]
    fn run_as_self_stays_on_the_current_token() {
        let admin = caller(true, false);
        let req = LaunchRequest {
            run_as_active_user: Some(RunAsActiveUser {
                account: admin.username.clone(),
                sid: admin.sid.to_lowercase(),
                session_id: 1,
            }),
            ..request(false, false)
        };
        let strategy = select_strategy(&req, ImageKind::Gui, &admin);
        assert!(matches!(
            strategy,
            LaunchStrategy::Direct {
                identity: IdentitySwitch::CurrentUser,
                ..
            }
        ));
    }

    #[test]
    fn unelevated_only_for_elevated_non_system_callers() {
        let req = LaunchRequest {
            use_unelevated_token: true,
            ..request(false, false)
        };
        let cases = [
            (caller(true, false), IdentitySwitch::Unelevated),
            (caller(false, false), IdentitySwitch::CurrentUser),
            (caller(true, true), IdentitySwitch::CurrentUser),
        ];
        for (caller, expected) in cases {
            let LaunchStrategy::Direct { identity, .. } =
                select_strategy(&req, ImageKind::Gui, &caller)
            else {
                panic!("expected a direct launch");
            };
            assert_eq!(identity, expected, "{caller:?}");
        }
    }

    #[test]
    fn gui_images_keep_their_window_style_without_a_console() {
        let req = LaunchRequest {
            window_style: Some(WindowStyle::Normal),
            ..request(false, true)
        };
        let LaunchStrategy::Direct { console, .. } =
            select_strategy(&req, ImageKind::Gui, &caller(false, false))
        else {
            panic!("expected a direct launch");
        };
        assert_eq!(console, ConsoleMode::Inherit);
        assert_eq!(console.show_command(req.window_style), Some(1));
        assert_eq!(console.show_command(None), None);
    }

    #[test]
    fn hidden_consoles_leave_show_window_unset() {
        let cases = [
            (ConsoleMode::Hidden, Some(WindowStyle::Maximized), None),
            (ConsoleMode::Hidden, None, None),
            (ConsoleMode::NewConsole, None, None),
            (ConsoleMode::NewConsole, Some(WindowStyle::Minimized), Some(2)),
        ];
        for (console, style, expected) in cases {
            assert_eq!(console.show_command(style), expected, "{console:?} {style:?}");
        }
    }

    #[test]
    fn blank_verbs_are_dropped() {
        let req = LaunchRequest {
            verb: Some("  ".to_string()),
            ..request(true, false)
        };
        assert_eq!(
            select_strategy(&req, ImageKind::Gui, &caller(false, false)),
            LaunchStrategy::ShellVerb { verb: None }
        );
    }
}
