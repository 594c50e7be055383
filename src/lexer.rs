//! Lexical analysis (tokenization) of one input line.
//!
//! The only separator is whitespace: any character for which [`char::is_whitespace`]
//! holds ends the current word. There is no quoting and no escaping. Bytes that are not
//! valid UTF-8 are never whitespace and are kept in the word as they are.

use crate::command::ArgVector;
use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    BetweenWords,
    ReadingWord,
}

struct LexingFSM<'a> {
    input: &'a [u8],
    state: LexingState,
    buffer: Vec<u8>,
}

impl<'a> LexingFSM<'a> {
    fn new(line: &'a [u8]) -> Self {
        LexingFSM {
            input: line,
            state: LexingState::BetweenWords,
            buffer: Vec::new(),
        }
    }

    /// Runs the machine over the whole line.
    ///
    /// Words are counted and extracted in the same pass, so the count is simply the
    /// length of the result.
    fn make_words(mut self) -> ArgVector {
        let mut out = ArgVector::default();

        for chunk in self.input.utf8_chunks() {
            for ch in chunk.valid().chars() {
                match self.state {
                    LexingState::BetweenWords => self.handle_between(ch),
                    LexingState::ReadingWord => self.handle_word(ch, &mut out),
                }
            }
            self.handle_raw(chunk.invalid());
        }

        // A trailing word without whitespace after it still counts.
        if self.state == LexingState::ReadingWord {
            self.finish_word(&mut out);
        }

        out
    }

    fn handle_between(&mut self, ch: char) {
        if !ch.is_whitespace() {
            self.push_char(ch);
            self.state = LexingState::ReadingWord;
        }
    }

    fn handle_word(&mut self, ch: char, out: &mut ArgVector) {
        if ch.is_whitespace() {
            self.finish_word(out);
            self.state = LexingState::BetweenWords;
        } else {
            self.push_char(ch);
        }
    }

    fn handle_raw(&mut self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.buffer.extend_from_slice(bytes);
            self.state = LexingState::ReadingWord;
        }
    }

    fn push_char(&mut self, ch: char) {
        let mut encoded = [0; 4];
        self.buffer
            .extend_from_slice(ch.encode_utf8(&mut encoded).as_bytes());
    }

    fn finish_word(&mut self, out: &mut ArgVector) {
        out.push(OsString::from_vec(std::mem::take(&mut self.buffer)));
    }
}

/// Splits `line` into its maximal runs of non-whitespace characters.
///
/// Never yields empty words. A line made only of whitespace (or nothing at all)
/// yields an empty [`ArgVector`].
pub fn tokenize(line: impl AsRef<[u8]>) -> ArgVector {
    LexingFSM::new(line.as_ref()).make_words()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::ffi::OsStrExt;

    fn words(line: &str) -> Vec<String> {
        tokenize(line)
            .iter()
            .map(|w| w.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_surrounding_and_repeated_spaces() {
        let argv = tokenize("  ls   -l  ");
        assert_eq!(argv.len(), 2);
        assert_eq!(words("  ls   -l  "), vec!["ls", "-l"]);
    }

    #[test]
    fn test_blank_lines_have_no_words() {
        for line in ["", " ", "\t\t", " \t \x0b\x0c \r"] {
            assert!(tokenize(line).is_empty(), "expected no words in {:?}", line);
        }
    }

    #[test]
    fn test_trailing_word_without_separator() {
        assert_eq!(words("echo hello"), vec!["echo", "hello"]);
        assert_eq!(tokenize("x").len(), 1);
    }

    #[test]
    fn test_tabs_and_other_whitespace_separate() {
        assert_eq!(words("cp\ta.txt\u{a0}b.txt"), vec!["cp", "a.txt", "b.txt"]);
        assert_eq!(words("a\r\nb"), vec!["a", "b"]);
    }

    #[test]
    fn test_no_quoting_rules() {
        assert_eq!(words("echo \"a b\""), vec!["echo", "\"a", "b\""]);
        assert_eq!(words("echo a\\ b"), vec!["echo", "a\\", "b"]);
    }

    #[test]
    fn test_non_ascii_words_kept_intact() {
        assert_eq!(words("touch файл.txt"), vec!["touch", "файл.txt"]);
    }

    #[test]
    fn test_invalid_utf8_stays_inside_words() {
        let argv = tokenize(b"cat \xff\xfeok  tail\x80");

        assert_eq!(argv.len(), 3);
        assert_eq!(argv[0].as_bytes(), b"cat");
        assert_eq!(argv[1].as_bytes(), b"\xff\xfeok");
        assert_eq!(argv[2].as_bytes(), b"tail\x80");
    }
}
