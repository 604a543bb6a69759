//! Conversion of SQL `LIKE` patterns.
//!
//! A pattern is scanned once by a small state machine into literal runs and
//! wildcards. From that form we can render an anchored regular expression for
//! stores that evaluate regexes (`%` becomes `.*`, `_` becomes `.`, literal
//! runs are quoted with `\Q...\E`) or match text directly in memory.

use std::fmt;

/// One element of a parsed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikeSegment {
    /// Text matched verbatim.
    Literal(String),
    /// `_`: exactly one character.
    AnyChar,
    /// `%`: any run of characters, possibly empty.
    AnyString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    Pattern,
    Escape,
    WildcardCharacter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Atom {
    Char(char),
    Any,
    Star,
}

/// A parsed `LIKE` pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikePattern {
    source: String,
    escape: Option<char>,
    segments: Vec<LikeSegment>,
    atoms: Vec<Atom>,
}

impl LikePattern {
    /// Parses `pattern` without an escape character.
    pub fn new(pattern: &str) -> Self {
        Self::with_escape(pattern, None)
    }

    /// Parses `pattern`, treating `escape` as the escape character.
    ///
    /// An escaped character is always literal. A trailing escape character
    /// with nothing after it is kept as a literal.
    pub fn with_escape(pattern: &str, escape: Option<char>) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut state = State::Initial;

        for c in pattern.chars() {
            state = match state {
                State::Escape => {
                    literal.push(c);
                    State::Pattern
                }
                _ if Some(c) == escape => State::Escape,
                _ if c == '%' || c == '_' => {
                    if !literal.is_empty() {
                        segments.push(LikeSegment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(if c == '%' {
                        LikeSegment::AnyString
                    } else {
                        LikeSegment::AnyChar
                    });
                    State::WildcardCharacter
                }
                State::Initial | State::Pattern | State::WildcardCharacter => {
                    literal.push(c);
                    State::Pattern
                }
            };
        }

        if state == State::Escape {
            if let Some(e) = escape {
                literal.push(e);
            }
        }
        if !literal.is_empty() {
            segments.push(LikeSegment::Literal(literal));
        }

        let atoms = segments
            .iter()
            .flat_map(|segment| -> Vec<Atom> {
                match segment {
                    LikeSegment::Literal(text) => text.chars().map(Atom::Char).collect(),
                    LikeSegment::AnyChar => vec![Atom::Any],
                    LikeSegment::AnyString => vec![Atom::Star],
                }
            })
            .collect();

        Self {
            source: pattern.to_string(),
            escape,
            segments,
            atoms,
        }
    }

    /// Returns the pattern as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the escape character, if any.
    pub fn escape(&self) -> Option<char> {
        self.escape
    }

    /// Returns the parsed segments.
    pub fn segments(&self) -> &[LikeSegment] {
        &self.segments
    }

    /// Renders the anchored regular expression.
    ///
    /// The expression must be evaluated with dot-matches-all enabled.
    pub fn to_regex(&self) -> String {
        let mut regex = String::with_capacity(self.source.len() + 8);
        regex.push('^');
        for segment in &self.segments {
            match segment {
                LikeSegment::Literal(text) => {
                    regex.push_str("\\Q");
                    // A literal "\E" would end the quote early.
                    regex.push_str(&text.replace("\\E", "\\E\\\\E\\Q"));
                    regex.push_str("\\E");
                }
                LikeSegment::AnyChar => regex.push('.'),
                LikeSegment::AnyString => regex.push_str(".*"),
            }
        }
        regex.push('$');
        regex
    }

    /// Whether `text` matches the pattern as a whole.
    pub fn matches(&self, text: &str) -> bool {
        let text: Vec<char> = text.chars().collect();
        let atoms = &self.atoms;
        let (mut p, mut t) = (0, 0);
        let mut backtrack: Option<(usize, usize)> = None;

        while t < text.len() {
            match atoms.get(p) {
                Some(Atom::Char(c)) if *c == text[t] => {
                    p += 1;
                    t += 1;
                }
                Some(Atom::Any) => {
                    p += 1;
                    t += 1;
                }
                Some(Atom::Star) => {
                    backtrack = Some((p, t));
                    p += 1;
                }
                _ => match backtrack {
                    Some((star, mark)) => {
                        p = star + 1;
                        t = mark + 1;
                        backtrack = Some((star, mark + 1));
                    }
                    None => return false,
                },
            }
        }

        atoms[p..].iter().all(|a| *a == Atom::Star)
    }
}

impl fmt::Display for LikePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
