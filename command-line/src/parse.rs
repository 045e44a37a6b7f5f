use crate::CommandLineError;
use crate::ParseMode;
use crate::path::is_path_start;
use crate::path::is_whitespace;
use crate::path::needs_quotes;
use crate::path::path_token_count;
use crate::path::starts_new_argument;

/// Splits a command line into arguments using [`ParseMode::Compatible`].
pub fn command_line_to_argv(line: &str) -> Result<Vec<String>, CommandLineError> {
    command_line_to_argv_with_mode(line, ParseMode::Compatible)
}

/// Splits a command line into arguments.
///
/// The input is trimmed and stripped of NUL characters first; blank input is
/// rejected with [`CommandLineError::EmptyInput`].
pub fn command_line_to_argv_with_mode(
    line: &str,
    mode: ParseMode,
) -> Result<Vec<String>, CommandLineError> {
    let cleaned: Vec<char> = line.chars().filter(|ch| *ch != '\0').collect();
    let Some(start) = cleaned.iter().position(|ch| !ch.is_whitespace()) else {
        return Err(CommandLineError::EmptyInput);
    };
    let end = cleaned
        .iter()
        .rposition(|ch| !ch.is_whitespace())
        .map_or(cleaned.len(), |last| last + 1);
    Ok(Tokenizer::new(&cleaned[start..end], mode).run())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteStyle {
    /// Opened by a bare `"`.
    Plain,
    /// Opened by `\"`; the quotes are part of the argument.
    Slash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Plain,
    Quoted(QuoteStyle),
}

struct Tokenizer<'a> {
    chars: &'a [char],
    pos: usize,
    heuristics: bool,
    state: State,
    buf: String,
    /// Set once the current token has consumed anything, including an empty
    /// quoted span.
    started: bool,
    /// No quote has been seen in the current token yet.
    bare: bool,
    argv: Vec<String>,
}

impl<'a> Tokenizer<'a> {
    fn new(chars: &'a [char], mode: ParseMode) -> Self {
        Self {
            chars,
            pos: 0,
            heuristics: mode == ParseMode::Compatible,
            state: State::Plain,
            buf: String::new(),
            started: false,
            bare: true,
            argv: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<String> {
        while self.pos < self.chars.len() {
            match self.state {
                State::Plain => self.step_plain(),
                State::Quoted(style) => self.step_quoted(style),
            }
        }
        if self.started {
            self.emit();
        }
        self.argv
    }

    fn emit(&mut self) {
        self.argv.push(std::mem::take(&mut self.buf));
        self.started = false;
        self.bare = true;
        self.state = State::Plain;
    }

    fn push(&mut self, ch: char) {
        self.buf.push(ch);
        self.started = true;
    }

    fn push_backslashes(&mut self, count: usize) {
        for _ in 0..count {
            self.buf.push('\\');
        }
        self.started = true;
    }

    fn backslash_run(&self) -> usize {
        self.chars[self.pos..]
            .iter()
            .take_while(|ch| **ch == '\\')
            .count()
    }

    /// True when nothing follows `at` or the next character is whitespace.
    fn ends_token_after(&self, at: usize) -> bool {
        self.chars.get(at + 1).is_none_or(|ch| is_whitespace(*ch))
    }

    fn step_plain(&mut self) {
        let ch = self.chars[self.pos];
        if is_whitespace(ch) {
            if self.started {
                self.emit();
            }
            self.pos += 1;
            return;
        }
        if self.heuristics && !self.started {
            if is_path_start(self.chars, self.pos) {
                let end = path_end(self.chars, self.pos);
                self.buf.extend(&self.chars[self.pos..end]);
                self.pos = end;
                self.emit();
                return;
            }
            if self.flag_with_quoted_path() {
                return;
            }
        }
        match ch {
            '\\' => self.plain_backslashes(),
            '"' => self.plain_quote(),
            '=' => {
                let key_is_bare = self.bare && !self.buf.is_empty() && !self.buf.contains('=');
                self.push('=');
                self.pos += 1;
                if self.heuristics && key_is_bare {
                    self.key_value();
                }
            }
            _ => {
                self.push(ch);
                self.pos += 1;
            }
        }
    }

    /// Reads a `KEY=value` value that is an unquoted path or a quoted span.
    /// The value keeps its quotes when it needs them and loses them otherwise.
    fn key_value(&mut self) {
        let chars = self.chars;
        let start = self.pos;
        if is_path_start(chars, start) {
            let end = path_end(chars, start);
            let value: String = chars[start..end].iter().collect();
            if value.chars().any(is_whitespace) {
                self.buf.push('"');
                self.buf.push_str(&value);
                self.buf.push('"');
            } else {
                self.buf.push_str(&value);
            }
            self.pos = end;
        } else if chars.get(start) == Some(&'"') {
            let (value, end) = msvcrt_argument(chars, start);
            if needs_quotes(&value) {
                self.buf.extend(&chars[start..end]);
            } else {
                self.buf.push_str(&value);
            }
            self.pos = end;
        } else {
            return;
        }
        self.emit();
    }

    /// `-flag"C:\path"` or `/flag"\\server\share"` at the current position.
    /// The flag and its attached path form one argument that keeps the quotes
    /// when the path needs them.
    fn flag_with_quoted_path(&mut self) -> bool {
        let chars = self.chars;
        let start = self.pos;
        if !matches!(chars.get(start), Some('-' | '/')) {
            return false;
        }
        let name_len = chars[start + 1..]
            .iter()
            .take_while(|ch| ch.is_alphanumeric() || matches!(**ch, '_' | '-'))
            .count();
        let quote_at = start + 1 + name_len;
        if name_len == 0 || chars.get(quote_at) != Some(&'"') {
            return false;
        }
        let is_path = match chars.get(quote_at + 1..) {
            Some([drive, ':', ..]) => drive.is_alphabetic(),
            Some(['\\', '\\', ..]) => true,
            _ => false,
        };
        if !is_path {
            return false;
        }

        let mut path = String::new();
        let mut pos = quote_at + 1;
        while let Some(&ch) = chars.get(pos) {
            pos += 1;
            if ch == '"' {
                if chars.get(pos) == Some(&'"') {
                    path.push('"');
                    pos += 1;
                    continue;
                }
                break;
            }
            path.push(ch);
        }

        self.buf.extend(&chars[start..quote_at]);
        if needs_quotes(&path) {
            self.buf.push('"');
            self.buf.push_str(&path);
            self.buf.push('"');
        } else {
            self.buf.push_str(&path);
        }
        self.started = true;
        self.pos = pos;
        self.emit();
        true
    }

    fn plain_backslashes(&mut self) {
        let count = self.backslash_run();
        let quote_at = self.pos + count;
        if self.chars.get(quote_at) != Some(&'"') {
            self.push_backslashes(count);
            self.pos = quote_at;
            return;
        }

        self.bare = false;
        self.pos = quote_at + 1;
        if count % 2 == 0 {
            self.push_backslashes(count / 2);
            self.state = State::Quoted(QuoteStyle::Plain);
            return;
        }
        if self.heuristics && count == 1 && !self.started {
            self.push('"');
            if self.ends_token_after(quote_at) {
                self.emit();
            } else {
                self.state = State::Quoted(QuoteStyle::Slash);
            }
            return;
        }
        self.push_backslashes(count / 2);
        self.push('"');
    }

    fn plain_quote(&mut self) {
        let quote_at = self.pos;
        self.pos += 1;
        if self.heuristics
            && !self.started
            && self.ends_token_after(quote_at)
            && !self.chars[self.pos..].contains(&'"')
        {
            self.push('"');
            self.emit();
            return;
        }
        self.started = true;
        self.bare = false;
        self.state = State::Quoted(QuoteStyle::Plain);
    }

    fn step_quoted(&mut self, style: QuoteStyle) {
        let ch = self.chars[self.pos];
        match (ch, style) {
            ('\\', _) => self.quoted_backslashes(style),
            ('"', QuoteStyle::Plain) => {
                self.state = State::Plain;
                self.pos += 1;
            }
            ('"', QuoteStyle::Slash) => {
                // A bare quote cannot close a `\"` span.
                self.push('"');
                self.pos += 1;
            }
            _ => {
                self.push(ch);
                self.pos += 1;
            }
        }
    }

    fn quoted_backslashes(&mut self, style: QuoteStyle) {
        let count = self.backslash_run();
        let quote_at = self.pos + count;
        if self.chars.get(quote_at) != Some(&'"') {
            self.push_backslashes(count);
            self.pos = quote_at;
            return;
        }

        match style {
            QuoteStyle::Plain if count % 2 == 1 => {
                self.push_backslashes(count / 2);
                self.push('"');
                self.pos = quote_at + 1;
            }
            QuoteStyle::Plain if self.heuristics && !self.ends_token_after(quote_at) => {
                // Even run before a quote that does not end the argument.
                self.push_backslashes(count);
                self.pos = quote_at;
            }
            QuoteStyle::Plain => {
                self.push_backslashes(count / 2);
                self.state = State::Plain;
                self.pos = quote_at + 1;
            }
            QuoteStyle::Slash => {
                self.push_backslashes(count / 2);
                self.push('"');
                if count % 2 == 1 {
                    self.state = State::Plain;
                }
                self.pos = quote_at + 1;
            }
        }
    }
}

/// End of the unquoted path starting at `start`. Whitespace stays inside the
/// path until the text after it reads like another argument.
fn path_end(chars: &[char], start: usize) -> usize {
    let mut tokens: Vec<(usize, usize)> = Vec::new();
    let mut pos = start;
    loop {
        let end = pos
            + chars[pos..]
                .iter()
                .take_while(|ch| !is_whitespace(**ch))
                .count();
        tokens.push((pos, end));
        let next = end
            + chars[end..]
                .iter()
                .take_while(|ch| is_whitespace(**ch))
                .count();
        if next == chars.len() || starts_new_argument(chars, next) {
            break;
        }
        pos = next;
    }
    let words: Vec<String> = tokens
        .iter()
        .map(|(from, to)| chars[*from..*to].iter().collect())
        .collect();
    let words: Vec<&str> = words.iter().map(String::as_str).collect();
    let count = path_token_count(&words);
    tokens
        .get(count.saturating_sub(1))
        .map_or(start, |(_, end)| *end)
}

/// One argument under plain msvcrt rules, where `""` inside quotes is a
/// literal quote. Returns the argument and the position after it.
fn msvcrt_argument(chars: &[char], start: usize) -> (String, usize) {
    let mut argument = String::new();
    let mut in_quote = false;
    let mut pos = start;
    while let Some(&ch) = chars.get(pos) {
        if is_whitespace(ch) && !in_quote {
            break;
        }
        match ch {
            '\\' => {
                let count = chars[pos..].iter().take_while(|ch| **ch == '\\').count();
                pos += count;
                if chars.get(pos) == Some(&'"') {
                    argument.extend(std::iter::repeat_n('\\', count / 2));
                    if count % 2 == 1 {
                        argument.push('"');
                    } else {
                        in_quote = !in_quote;
                    }
                    pos += 1;
                } else {
                    argument.extend(std::iter::repeat_n('\\', count));
                }
            }
            '"' if in_quote && chars.get(pos + 1) == Some(&'"') => {
                argument.push('"');
                pos += 2;
            }
            '"' => {
                in_quote = !in_quote;
                pos += 1;
            }
            _ => {
                argument.push(ch);
                pos += 1;
            }
        }
    }
    (argument, pos)
}
