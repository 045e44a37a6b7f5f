use std::borrow::Cow;

use crate::CommandLine;
use crate::ParseMode;
use crate::path::is_path_start;
use crate::path::is_whitespace;
use crate::path::looks_like_path;
use crate::path::needs_quotes;

/// Renders an argument vector as a single command line that
/// [`crate::command_line_to_argv`] splits back into the same arguments.
///
/// Empty arguments render as `""`. Returns `None` when every argument is
/// empty or the rendered line is blank.
pub fn argv_to_command_line<S: AsRef<str>>(argv: &[S]) -> Option<CommandLine> {
    argv_to_command_line_with_mode(argv, ParseMode::Compatible)
}

pub fn argv_to_command_line_with_mode<S: AsRef<str>>(
    argv: &[S],
    mode: ParseMode,
) -> Option<CommandLine> {
    if argv.iter().all(|arg| arg.as_ref().is_empty()) {
        return None;
    }
    let rendered = argv
        .iter()
        .map(|arg| match mode {
            ParseMode::Compatible => quote_argument(arg.as_ref()),
            ParseMode::Strict => quote_argument_strict(arg.as_ref()),
        })
        .collect::<Vec<_>>()
        .join(" ");
    let trimmed = rendered.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(CommandLine::new(trimmed))
    }
}

/// Quotes a single argument for a [`ParseMode::Compatible`] command line.
pub fn quote_argument(arg: &str) -> Cow<'_, str> {
    if arg.is_empty() {
        return Cow::Borrowed("\"\"");
    }
    if let Some(interior) = wrapped_interior(arg) {
        let mut quoted = String::with_capacity(arg.len() + 4);
        quoted.push_str("\\\"");
        push_doubling_trailing_backslashes(&mut quoted, interior);
        quoted.push_str("\\\"");
        return Cow::Owned(quoted);
    }

    if let Some(quoted) = quote_key_value(arg) {
        return Cow::Owned(quoted);
    }
    if let Some(quoted) = quote_flag_with_path(arg) {
        return Cow::Owned(quoted);
    }

    if arg.chars().any(is_whitespace) || arg.starts_with('"') || looks_like_path(arg) {
        return Cow::Owned(quote_fully(arg));
    }
    if arg.contains('"') {
        return Cow::Owned(escape_quotes(arg));
    }
    Cow::Borrowed(arg)
}

fn quote_argument_strict(arg: &str) -> Cow<'_, str> {
    if arg.is_empty() || arg.chars().any(|ch| is_whitespace(ch) || ch == '"') {
        Cow::Owned(quote_fully(arg))
    } else {
        Cow::Borrowed(arg)
    }
}

/// `"interior"` where the interior holds no quotes and does not start with
/// whitespace.
fn wrapped_interior(arg: &str) -> Option<&str> {
    let interior = arg.strip_prefix('"')?.strip_suffix('"')?;
    if interior.contains('"') || interior.starts_with(is_whitespace) {
        return None;
    }
    Some(interior)
}

/// `KEY=value` where the value is quoted or needs quoting of its own. An
/// already quoted value is kept as is when it needs the quotes.
fn quote_key_value(arg: &str) -> Option<String> {
    let (key, value) = arg.split_once('=')?;
    if key.is_empty() || value.is_empty() || key.chars().any(|ch| is_whitespace(ch) || ch == '"')
    {
        return None;
    }
    if let Some(interior) = value
        .strip_prefix('"')
        .and_then(|value| value.strip_suffix('"'))
    {
        return Some(if needs_quotes(interior) {
            arg.to_string()
        } else {
            format!("{key}={interior}")
        });
    }
    if value.contains('"') {
        return None;
    }
    if value.chars().any(is_whitespace) || looks_like_path(value) {
        Some(format!("{key}={}", quote_fully(value)))
    } else {
        None
    }
}

/// `-flag<path>` with the attached path quoted on its own, as in
/// `-sfx_o"C:\Program Files\Out"`.
fn quote_flag_with_path(arg: &str) -> Option<String> {
    if !arg.starts_with(['-', '/']) {
        return None;
    }
    let chars: Vec<char> = arg.chars().collect();
    let mut value_start = None;
    for (at, ch) in chars.iter().enumerate().skip(1) {
        if *ch == '=' {
            return None;
        }
        if is_path_start(&chars, at) {
            value_start = Some(at);
            break;
        }
    }
    let value_start = value_start.filter(|at| *at > 1)?;
    let flag: String = chars[..value_start].iter().collect();
    let value: String = chars[value_start..].iter().collect();

    if let (Some(flag), Some(path)) = (flag.strip_suffix('"'), value.strip_suffix('"')) {
        return Some(if needs_quotes(path) {
            format!("{flag}\"{path}\"")
        } else {
            format!("{flag}{path}")
        });
    }
    if !needs_quotes(&value) {
        return None;
    }
    Some(format!("{flag}{}", quote_fully(&value)))
}

fn push_doubling_trailing_backslashes(out: &mut String, text: &str) {
    let body = text.trim_end_matches('\\');
    let trailing = text.len() - body.len();
    out.push_str(body);
    out.push_str(&"\\".repeat(trailing * 2));
}

fn quote_fully(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    let mut backslashes = 0;
    for ch in arg.chars() {
        match ch {
            '\\' => backslashes += 1,
            '"' => {
                quoted.push_str(&"\\".repeat(backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            _ => {
                quoted.push_str(&"\\".repeat(backslashes));
                backslashes = 0;
                quoted.push(ch);
            }
        }
    }
    quoted.push_str(&"\\".repeat(backslashes * 2));
    quoted.push('"');
    quoted
}

fn escape_quotes(arg: &str) -> String {
    let mut escaped = String::with_capacity(arg.len() + 2);
    let mut backslashes = 0;
    for ch in arg.chars() {
        match ch {
            '\\' => backslashes += 1,
            '"' => {
                escaped.push_str(&"\\".repeat(backslashes * 2 + 1));
                escaped.push('"');
                backslashes = 0;
            }
            _ => {
                escaped.push_str(&"\\".repeat(backslashes));
                backslashes = 0;
                escaped.push(ch);
            }
        }
    }
    escaped.push_str(&"\\".repeat(backslashes));
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_line_to_argv;
    use crate::command_line_to_argv_with_mode;
    use pretty_assertions::assert_eq;

    fn render(argv: &[&str]) -> String {
        argv_to_command_line(argv)
            .map(CommandLine::into_string)
            .unwrap_or_default()
    }

    #[test]
    fn quoting_rules_in_order() {
        let cases = [
            ("plain", "plain"),
            ("\"quoted\"", "\\\"quoted\\\""),
            ("\"C:\\dir\\\"", "\\\"C:\\dir\\\\\\\""),
            ("\" padded\"", "\"\\\" padded\\\"\""),
            (
                "INSTALLDIR=C:\\Program Files\\App",
                "INSTALLDIR=\"C:\\Program Files\\App\"",
            ),
            ("KEY=two words", "KEY=\"two words\""),
            ("KEY=value", "KEY=value"),
            ("a b", "\"a b\""),
            ("C:\\dir\\", "\"C:\\dir\\\\\""),
            ("say \"hi\"", "\"say \\\"hi\\\"\""),
            ("a\"b", "a\\\"b"),
            ("a\\\"b", "a\\\\\\\"b"),
            ("trailing\\", "trailing\\"),
            ("", "\"\""),
            ("KEY=\"two words\"", "KEY=\"two words\""),
            ("KEY=\"word\"", "KEY=word"),
            (
                "-sfx_oC:\\Program Files\\Out",
                "-sfx_o\"C:\\Program Files\\Out\"",
            ),
            (
                "-sfx_o\"C:\\Program Files\\Out\"",
                "-sfx_o\"C:\\Program Files\\Out\"",
            ),
            ("-o\"C:\\Out\"", "-oC:\\Out"),
            ("-oC:\\Out", "-oC:\\Out"),
            ("/D=C:\\My App", "/D=\"C:\\My App\""),
        ];
        for (arg, expected) in cases {
            assert_eq!(quote_argument(arg), expected, "quoting {arg:?}");
        }
    }

    #[test]
    fn joins_with_single_spaces() {
        assert_eq!(
            render(&["C:\\Program Files\\x\\y.exe", "-x", "val"]),
            "\"C:\\Program Files\\x\\y.exe\" -x val"
        );
    }

    #[test]
    fn blank_renderings_are_none() {
        assert_eq!(argv_to_command_line::<&str>(&[]), None);
        assert_eq!(argv_to_command_line(&[""]), None);
        assert_eq!(argv_to_command_line(&["", ""]), None);
    }

    #[test]
    fn empty_arguments_between_others_are_kept() {
        assert_eq!(render(&["a", "", "b"]), "a \"\" b");
        assert_eq!(render(&["", "x"]), "\"\" x");
    }

    #[test]
    fn round_trips_through_the_parser() {
        let cases: &[&[&str]] = &[
            &["a b", "c"],
            &["C:\\Program Files\\x\\y.exe", "-x", "val"],
            &["say \"hi\""],
            &["\"quoted\""],
            &["\"a b\""],
            &["C:\\dir\\"],
            &["a\\\"b"],
            &["\"\""],
            &["INSTALLDIR=\"C:\\Program Files\\App\"", "/qn"],
            &["KEY=\"value with space\"", "KEY=plain"],
            &["a", "", "b"],
            &["", "x"],
            &["archive.exe", "-sfx_o\"C:\\Program Files\\Out\"", "-y"],
            &["\\\\server\\share\\x y"],
            &["tab\there"],
            &["trailing\\", "next"],
            &["\""],
            &["C:\\dir", "D:\\other dir"],
        ];
        for argv in cases {
            let line = render(argv);
            let parsed = command_line_to_argv(&line).expect("rendered line is not blank");
            assert_eq!(parsed, argv.to_vec(), "round trip through {line:?}");
        }
    }

    #[test]
    fn strict_rendering_round_trips_through_strict_parser() {
        let cases: &[&[&str]] = &[
            &["a b", ""],
            &["\"quoted\"", "x"],
            &["C:\\Program Files\\x.exe", "C:\\dir\\"],
            &["a\\\\b", "say \"hi\""],
        ];
        for argv in cases {
            let line = argv_to_command_line_with_mode(argv, ParseMode::Strict)
                .expect("non-blank rendering");
            let parsed = command_line_to_argv_with_mode(line.as_str(), ParseMode::Strict)
                .expect("rendered line is not blank");
            assert_eq!(parsed, argv.to_vec(), "round trip through {line}");
        }
    }
}
