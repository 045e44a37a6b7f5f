//! Shape checks used by the unquoted-path heuristic.

const EXECUTABLE_EXTENSIONS: [&str; 6] = [".exe", ".msi", ".bat", ".cmd", ".com", ".scr"];

pub(crate) fn is_whitespace(ch: char) -> bool {
    ch == ' ' || ch == '\t'
}

/// `X:\`, `X:/`, or `\\` followed by an alphanumeric character.
pub(crate) fn is_path_start(chars: &[char], at: usize) -> bool {
    let rest = chars.get(at..).unwrap_or_default();
    match rest {
        [drive, ':', sep, ..] => drive.is_ascii_alphabetic() && matches!(*sep, '\\' | '/'),
        ['\\', '\\', host, ..] => host.is_alphanumeric(),
        _ => false,
    }
}

pub(crate) fn looks_like_path(text: &str) -> bool {
    let chars: Vec<char> = text.chars().take(3).collect();
    is_path_start(&chars, 0)
}

/// Whether an argument has to be wrapped in quotes to survive splitting.
pub(crate) fn needs_quotes(text: &str) -> bool {
    text.chars().any(|ch| is_whitespace(ch) || ch == '"')
}

fn is_command_separator(ch: char) -> bool {
    matches!(ch, ';' | '|' | '&' | '<' | '>' | '^')
}

pub(crate) fn ends_with_executable_extension(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    EXECUTABLE_EXTENSIONS
        .iter()
        .any(|extension| lower.ends_with(extension))
}

/// Whether the text at `at` reads like the beginning of another argument
/// rather than the continuation of a path containing a space.
pub(crate) fn starts_new_argument(chars: &[char], at: usize) -> bool {
    let Some(first) = chars.get(at) else {
        return false;
    };
    if matches!(*first, '/' | '-' | '"' | '{') {
        return true;
    }
    let has_key_value = chars[at..]
        .iter()
        .take_while(|ch| !is_whitespace(**ch))
        .any(|ch| *ch == '=');
    has_key_value || is_path_start(chars, at)
}

/// How many of the whitespace-separated `tokens` of an unquoted path belong
/// to the path.
///
/// The path ends at the first token naming an executable, then at the first
/// token closing with a command separator. UNC paths also end at a token
/// closing with a backslash, and long UNC runs drop their last token.
pub(crate) fn path_token_count(tokens: &[&str]) -> usize {
    if tokens.len() <= 1 {
        return tokens.len();
    }
    if let Some(index) = tokens
        .iter()
        .position(|token| ends_with_executable_extension(token))
    {
        return index + 1;
    }
    if let Some(index) = tokens
        .iter()
        .position(|token| token.ends_with(is_command_separator))
    {
        return index + 1;
    }
    if tokens[0].starts_with("\\\\") {
        let last = tokens.len() - 1;
        if let Some(index) = tokens[..last]
            .iter()
            .position(|token| token.ends_with('\\'))
        {
            return index + 1;
        }
        if tokens.len() > 4 {
            // `\\server\share\folder` is allowed before separators count.
            if let Some(index) = tokens[3..]
                .iter()
                .position(|token| token.contains(is_command_separator))
            {
                return index + 3;
            }
            return last;
        }
    }
    tokens.len()
}
