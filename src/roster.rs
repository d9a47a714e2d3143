//! The student roster: an immutable sequence shared by every worker.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::Index;
use std::path::Path;

use crate::error::RosterError;
use crate::StudentId;

/// Sentinel used by generated rosters.
pub const DEFAULT_SENTINEL: StudentId = 9999;

/// A fixed, read-only sequence of student numbers.
///
/// Only cursors over a roster mutate during a run; the entries never change
/// once the roster is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    entries: Box<[StudentId]>,
}

impl Roster {
    /// Builds a roster of `1..=students`.
    ///
    /// # Errors
    ///
    /// Returns [`RosterError::Empty`] if `students` is zero.
    pub fn sequential(students: usize) -> Result<Self, RosterError> {
        Self::from_entries(Self::ids(students))
    }

    /// Builds a roster of `1..=students` terminated by `sentinel`.
    ///
    /// # Errors
    ///
    /// Returns [`RosterError::Empty`] if `students` is zero.
    pub fn generate(students: usize, sentinel: StudentId) -> Result<Self, RosterError> {
        if students == 0 {
            return Err(RosterError::Empty);
        }
        Self::from_entries(Self::ids(students).chain(std::iter::once(sentinel)))
    }

    // ids past StudentId::MAX are not generated
    fn ids(students: usize) -> impl Iterator<Item = StudentId> {
        (1..=StudentId::MAX).take(students)
    }

    /// Wraps an explicit list of entries.
    pub fn from_entries<I: IntoIterator<Item = StudentId>>(entries: I) -> Result<Self, RosterError> {
        let entries: Box<[StudentId]> = entries.into_iter().collect();
        if entries.is_empty() {
            return Err(RosterError::Empty);
        }
        Ok(Roster { entries })
    }

    /// Parses whitespace-separated student numbers.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, RosterError> {
        let mut entries = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| RosterError::Io { path: None, source })?;
            for token in line.split_whitespace() {
                let id = token.parse().map_err(|_| RosterError::Parse {
                    line: index + 1,
                    token: token.to_owned(),
                })?;
                entries.push(id);
            }
        }
        Self::from_entries(entries)
    }

    /// Loads a roster file such as `students.txt`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RosterError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| RosterError::Io {
            path: Some(path.to_owned()),
            source,
        })?;
        Self::from_reader(BufReader::new(file)).map_err(|err| match err {
            RosterError::Io { path: None, source } => RosterError::Io {
                path: Some(path.to_owned()),
                source,
            },
            other => other,
        })
    }

    /// Fails unless `sentinel` appears somewhere in the roster.
    pub fn require_sentinel(&self, sentinel: StudentId) -> Result<(), RosterError> {
        if self.entries.contains(&sentinel) {
            Ok(())
        } else {
            Err(RosterError::MissingSentinel(sentinel))
        }
    }

    /// Returns the number of entries, sentinel included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the roster has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entries in order.
    pub fn entries(&self) -> &[StudentId] {
        &self.entries
    }
}

impl Index<usize> for Roster {
    type Output = StudentId;

    fn index(&self, index: usize) -> &StudentId {
        &self.entries[index]
    }
}

#[cfg(test)]
mod tests {
    use super::{Roster, DEFAULT_SENTINEL};
    use crate::error::RosterError;
    use std::io::Cursor;

    #[test]
    fn generated_roster_ends_with_sentinel() {
        let roster = Roster::generate(20, DEFAULT_SENTINEL).unwrap();
        assert_eq!(roster.len(), 21);
        assert_eq!(roster[0], 1);
        assert_eq!(roster[19], 20);
        assert_eq!(roster[20], DEFAULT_SENTINEL);
        assert!(roster.require_sentinel(DEFAULT_SENTINEL).is_ok());
    }

    #[test]
    fn sequential_roster_has_no_sentinel() {
        let roster = Roster::sequential(3).unwrap();
        assert_eq!(roster.entries(), &[1, 2, 3]);
        assert!(matches!(
            roster.require_sentinel(DEFAULT_SENTINEL),
            Err(RosterError::MissingSentinel(DEFAULT_SENTINEL))
        ));
    }

    #[test]
    fn parses_whitespace_separated_numbers() {
        let roster = Roster::from_reader(Cursor::new("1001 1002\n1003\n\n  1004 \n")).unwrap();
        assert_eq!(roster.entries(), &[1001, 1002, 1003, 1004]);
    }

    #[test]
    fn reports_line_of_bad_token() {
        let err = Roster::from_reader(Cursor::new("1 2\n3 x4\n")).unwrap_err();
        match err {
            RosterError::Parse { line, token } => {
                assert_eq!(line, 2);
                assert_eq!(token, "x4");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            Roster::from_reader(Cursor::new(" \n")),
            Err(RosterError::Empty)
        ));
    }

    #[test]
    fn zero_students_is_rejected() {
        assert!(matches!(Roster::sequential(0), Err(RosterError::Empty)));
        assert!(matches!(
            Roster::generate(0, DEFAULT_SENTINEL),
            Err(RosterError::Empty)
        ));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = Roster::load("/definitely/not/here/students.txt").unwrap_err();
        assert!(matches!(err, RosterError::Io { path: Some(_), .. }));
    }
}
