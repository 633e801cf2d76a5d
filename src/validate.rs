//! Username validation and case-insensitive deduplication.

use std::collections::HashSet;

use thiserror::Error;

/// Minimum username length accepted by Hytale.
pub const MIN_LENGTH: usize = 3;
/// Maximum username length accepted by Hytale.
pub const MAX_LENGTH: usize = 16;

/// Why a raw input string is not a legal username.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum InvalidUsername {
    /// The input was empty after trimming.
    #[error("username cannot be empty")]
    Empty,
    /// Fewer than [`MIN_LENGTH`] characters.
    #[error("username `{name}` is too short (min {MIN_LENGTH} characters)")]
    TooShort {
        /// The rejected input.
        name: String,
    },
    /// More than [`MAX_LENGTH`] characters.
    #[error("username `{name}` is too long (max {MAX_LENGTH} characters)")]
    TooLong {
        /// The rejected input.
        name: String,
    },
    /// A character outside `[A-Za-z0-9_]`.
    #[error(
        "invalid character `{ch}` in username `{name}`, \
         characters must be ASCII alphanumeric or `_`"
    )]
    Char {
        /// The offending character.
        ch: char,
        /// The rejected input.
        name: String,
    },
}

/// Check a raw string against the Hytale username rules:
/// 3 to 16 characters, ASCII letters, digits, and underscore.
///
/// Total over all inputs: every string maps to `Ok(())` or exactly one
/// rejection reason. The caller is expected to trim whitespace first
/// (see [`collect_candidates`]).
///
/// ```
/// use hytale_avail::validate::{validate_username, InvalidUsername};
///
/// assert!(validate_username("valid_Name1").is_ok());
/// assert!(matches!(
///     validate_username("ab"),
///     Err(InvalidUsername::TooShort { .. })
/// ));
/// ```
pub fn validate_username(name: &str) -> Result<(), InvalidUsername> {
    if name.is_empty() {
        return Err(InvalidUsername::Empty);
    }

    let count = name.chars().count();
    if count < MIN_LENGTH {
        return Err(InvalidUsername::TooShort { name: name.into() });
    }
    if count > MAX_LENGTH {
        return Err(InvalidUsername::TooLong { name: name.into() });
    }

    for ch in name.chars() {
        if !(ch.is_ascii_alphanumeric() || ch == '_') {
            return Err(InvalidUsername::Char {
                ch,
                name: name.into(),
            });
        }
    }

    Ok(())
}

/// A validated username queued for checking.
///
/// `index` is the position in the deduplicated input sequence; the output
/// files are written in ascending `index` order so results come back in the
/// same order the names went in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// The username with its original casing.
    pub name: String,
    /// Position in the deduplicated input sequence.
    pub index: usize,
}

/// Outcome of reducing raw input lines to a checkable candidate list.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CandidateSet {
    /// Validated, deduplicated candidates in first-seen order.
    pub candidates: Vec<Candidate>,
    /// Case-insensitive duplicates dropped.
    pub duplicates: usize,
    /// Lines rejected by validation.
    pub invalid: usize,
}

/// Reduce raw input lines to validated, deduplicated candidates.
///
/// Lines are trimmed; empty lines and `#` comments are skipped entirely
/// (they count as neither duplicates nor invalid). Validation happens
/// before the duplicate check, so an invalid repeat counts as invalid.
/// Deduplication is case-insensitive on the lowercased form, keeping the
/// first-seen casing, with a set-membership check per line.
pub fn collect_candidates<I, S>(lines: I) -> CandidateSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut set = CandidateSet::default();

    for line in lines {
        let name = line.as_ref().trim();
        if name.is_empty() || name.starts_with('#') {
            continue;
        }

        if validate_username(name).is_err() {
            set.invalid += 1;
            continue;
        }

        if !seen.insert(name.to_lowercase()) {
            set.duplicates += 1;
            continue;
        }

        set.candidates.push(Candidate {
            name: name.to_string(),
            index: set.candidates.len(),
        });
    }

    set
}
