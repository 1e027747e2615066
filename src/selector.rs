//! The `title[,chapter[-chapter2][,angle]]` selector.
use crate::error::{DvdError, IndexKind, Result};
use crate::types::{Catalog, CellRange};
use std::str::FromStr;

/// What to extract from a disc. All numbers are 1-based, as typed by a user.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Selector {
    pub title: u16,
    /// Inclusive chapter range. `None` selects every chapter of the title.
    pub chapters: Option<(u16, u16)>,
    pub angle: u8,
}

/// A selector checked against a catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub title: u16,
    /// Cell runs to play in order, one per program chain crossed.
    pub ranges: Vec<CellRange>,
    /// 0-based angle.
    pub angle: u8,
}

impl Selector {
    /// Selects all chapters of `title` at angle 1.
    pub fn title(title: u16) -> Self {
        Selector {
            title,
            chapters: None,
            angle: 1,
        }
    }

    pub fn chapters(mut self, first: u16, last: u16) -> Self {
        self.chapters = Some((first, last));
        self
    }

    pub fn angle(mut self, angle: u8) -> Self {
        self.angle = angle;
        self
    }

    /// Validates every index against `catalog` and resolves the chapter range
    /// to cell runs. Nothing is read from the disc.
    pub fn resolve(&self, catalog: &Catalog) -> Result<Resolved> {
        let chapters = catalog.chapter_count(self.title)?;
        let (first, last) = self.chapters.unwrap_or((1, chapters));
        let angle = self.angle.checked_sub(1).ok_or(DvdError::IndexOutOfRange {
            kind: IndexKind::Angle,
            value: 0,
            max: u32::from(catalog.title(self.title)?.angles()),
        })?;
        catalog.check_angle(self.title, angle)?;
        let ranges = catalog.chapter_ranges(self.title, first, last)?;
        Ok(Resolved {
            title: self.title,
            ranges,
            angle,
        })
    }
}

fn number<T: FromStr>(input: &str, field: &str, reason: &'static str) -> Result<T> {
    field.trim().parse().map_err(|_| DvdError::Selector {
        input: input.to_string(),
        reason,
    })
}

impl FromStr for Selector {
    type Err = DvdError;

    fn from_str(s: &str) -> Result<Selector> {
        let mut parts = s.split(',');
        let title = match parts.next() {
            Some(t) if !t.trim().is_empty() => number(s, t, "title is not a number")?,
            _ => {
                return Err(DvdError::Selector {
                    input: s.to_string(),
                    reason: "missing title",
                })
            }
        };

        let chapters = match parts.next() {
            None => None,
            Some(c) => {
                let (first, last) = match c.find('-') {
                    Some(i) => (&c[..i], Some(&c[i + 1..])),
                    None => (c, None),
                };
                let first: u16 = number(s, first, "chapter is not a number")?;
                let last = match last {
                    Some(l) => number(s, l, "last chapter is not a number")?,
                    None => first,
                };
                Some((first, last))
            }
        };

        let angle = match parts.next() {
            None => 1,
            Some(a) => number(s, a, "angle is not a number")?,
        };

        if parts.next().is_some() {
            return Err(DvdError::Selector {
                input: s.to_string(),
                reason: "too many fields",
            });
        }

        Ok(Selector {
            title,
            chapters,
            angle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_only() {
        assert_eq!("3".parse::<Selector>().unwrap(), Selector::title(3));
    }

    #[test]
    fn single_chapter() {
        let s: Selector = "1,4".parse().unwrap();
        assert_eq!(s.chapters, Some((4, 4)));
        assert_eq!(s.angle, 1);
    }

    #[test]
    fn chapter_range_and_angle() {
        let s: Selector = "2,3-7,2".parse().unwrap();
        assert_eq!(s, Selector::title(2).chapters(3, 7).angle(2));
    }

    #[test]
    fn rejects_garbage() {
        for input in &["", "x", "1,a", "1,2-", "1,2,z", "1,2,1,4", "1,-3"] {
            match input.parse::<Selector>() {
                Err(DvdError::Selector { .. }) => {}
                other => panic!("{:?} gave {:?}", input, other),
            }
        }
    }
}
