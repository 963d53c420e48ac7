use crate::error::FoxResult;
use rustyline::{error::ReadlineError, Editor};
use std::{fmt::Display, str::FromStr};

/// Outcome of one prompted entry. Ctrl-C and Ctrl-D surface as `FoxError::Readline`.
pub enum UserEntry<T> {
    Value(T),
    Empty,
    Invalid { entry: String, reason: String },
}

pub fn read_line(prompt: &str) -> FoxResult<String> {
    let mut editor = Editor::<()>::new();
    Ok(editor.readline(prompt)?)
}

pub fn read_and_parse_user_entry<T>(msg: &str) -> FoxResult<UserEntry<T>>
where
    T: FromStr,
    <T as FromStr>::Err: Display,
{
    let entry = read_line(&format!("{}: ", msg))?;
    Ok(parse_user_entry(&entry))
}

pub fn parse_user_entry<T>(entry: &str) -> UserEntry<T>
where
    T: FromStr,
    <T as FromStr>::Err: Display,
{
    let entry = entry.trim();
    if entry.is_empty() {
        return UserEntry::Empty;
    }
    match entry.parse::<T>() {
        Ok(value) => UserEntry::Value(value),
        Err(e) => UserEntry::Invalid {
            entry: entry.to_string(),
            reason: e.to_string(),
        },
    }
}

/// True when the readline error means the user asked to leave (Ctrl-C / Ctrl-D).
pub fn is_user_exit(e: &ReadlineError) -> bool {
    matches!(e, ReadlineError::Interrupted | ReadlineError::Eof)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numbers_and_flags_garbage() {
        assert!(matches!(parse_user_entry::<u8>(" 7 "), UserEntry::Value(7)));
        assert!(matches!(parse_user_entry::<u8>("   "), UserEntry::Empty));
        match parse_user_entry::<u8>("seven") {
            UserEntry::Invalid { entry, .. } => assert_eq!(entry, "seven"),
            _ => panic!("expected invalid entry"),
        }
    }
}
