use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// One sort key: which field to compare and in which direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub key: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("field spec {0:?} has an empty key")]
    EmptyKey(String),

    #[error("no sort fields given")]
    NoFields,
}

impl FieldSpec {
    pub fn asc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            direction: Direction::Ascending,
        }
    }

    pub fn desc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            direction: Direction::Descending,
        }
    }

    /// Parses `name`, `+name` or `-name` (descending).
    pub fn parse(s: &str) -> Result<Self, SpecError> {
        let trimmed = s.trim();
        let (direction, key) = match trimmed.strip_prefix('-') {
            Some(rest) => (Direction::Descending, rest),
            None => (
                Direction::Ascending,
                trimmed.strip_prefix('+').unwrap_or(trimmed),
            ),
        };
        if key.is_empty() {
            return Err(SpecError::EmptyKey(s.to_string()));
        }
        Ok(Self {
            key: key.to_string(),
            direction,
        })
    }

    /// Parses a comma and/or whitespace separated list such as
    /// `"-age, name"`. At least one field is required.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, SpecError> {
        let specs = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(Self::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if specs.is_empty() {
            return Err(SpecError::NoFields);
        }
        Ok(specs)
    }
}

impl fmt::Display for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Ascending => f.write_str(&self.key),
            Direction::Descending => write!(f, "-{}", self.key),
        }
    }
}
