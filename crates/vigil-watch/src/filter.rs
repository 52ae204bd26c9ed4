//! Path filter compilation and matching.
//!
//! A monitor holds an ordered chain of compiled filters. Candidate paths are
//! checked against the chain in order and the first matching filter decides:
//! its verdict (include or exclude) is final. A path matching no filter is
//! accepted, so the chain is a sequence of overrides rather than a
//! deny-by-default firewall.

use crate::error::{Error, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Verdict a filter applies to paths matching its pattern.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FilterType {
    /// Paths matching the pattern are reported.
    Include,
    /// Paths matching the pattern are discarded.
    Exclude,
}

/// A user-supplied path filter, declared before the monitor starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathFilter {
    /// The pattern to match candidate paths against.
    pub pattern: String,

    /// Whether matching paths are included or excluded.
    pub filter_type: FilterType,

    /// Whether matching is case sensitive.
    pub case_sensitive: bool,

    /// Selects the extended pattern grammar. When false the pattern is read
    /// with basic syntax, where `+ ? | ( ) { }` are literal characters and
    /// their backslash-escaped forms are the operators.
    pub extended: bool,
}

impl PathFilter {
    /// Create a filter with the given verdict. Matching defaults to case
    /// sensitive, basic syntax.
    pub fn new(pattern: impl Into<String>, filter_type: FilterType) -> Self {
        Self {
            pattern: pattern.into(),
            filter_type,
            case_sensitive: true,
            extended: false,
        }
    }

    /// Create an including filter.
    pub fn include(pattern: impl Into<String>) -> Self {
        Self::new(pattern, FilterType::Include)
    }

    /// Create an excluding filter.
    pub fn exclude(pattern: impl Into<String>) -> Self {
        Self::new(pattern, FilterType::Exclude)
    }

    /// Make matching case insensitive.
    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    /// Read the pattern with the extended grammar.
    pub fn extended(mut self) -> Self {
        self.extended = true;
        self
    }
}

/// A compiled matcher plus its verdict, derived once from a [`PathFilter`].
///
/// Compilation is deterministic and pure; matching a compiled filter has no
/// side effects, so repeated calls against the same path always agree.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    regex: Regex,
    filter_type: FilterType,
}

impl CompiledFilter {
    /// Compile a user-supplied filter.
    ///
    /// A malformed pattern under the selected grammar fails with
    /// [`Error::Pattern`] naming the offending pattern.
    pub fn compile(filter: &PathFilter) -> Result<Self> {
        let pattern = if filter.extended {
            filter.pattern.clone()
        } else {
            basic_to_extended(&filter.pattern)
        };

        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(!filter.case_sensitive)
            .build()
            .map_err(|source| Error::Pattern {
                pattern: filter.pattern.clone(),
                source,
            })?;

        Ok(Self {
            regex,
            filter_type: filter.filter_type,
        })
    }

    /// Check whether a candidate path matches this filter's pattern.
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// The verdict this filter applies to matching paths.
    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }
}

/// Rewrite a basic-syntax pattern into the extended grammar.
///
/// Basic syntax treats `+ ? | ( ) { }` as literals and their escaped forms as
/// operators; the extended grammar is the other way around, so the escaping
/// is swapped. All other characters pass through untouched, including a
/// trailing lone backslash, which the compiler then rejects.
fn basic_to_extended(pattern: &str) -> String {
    const SWAPPED: [char; 7] = ['+', '?', '|', '(', ')', '{', '}'];

    let mut out = String::with_capacity(pattern.len() + 4);
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next) if SWAPPED.contains(&next) => out.push(next),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            },
            _ if SWAPPED.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(filter: PathFilter) -> CompiledFilter {
        CompiledFilter::compile(&filter).unwrap()
    }

    #[test]
    fn extended_pattern_matches_anchored_prefix() {
        let f = compile(PathFilter::include("^/var/log/").extended());
        assert!(f.is_match("/var/log/syslog"));
        assert!(!f.is_match("/etc/hosts"));
    }

    #[test]
    fn matching_is_pure() {
        let f = compile(PathFilter::include("^/var/log/").extended());
        for _ in 0..10 {
            assert!(f.is_match("/var/log/syslog"));
            assert!(!f.is_match("/etc/hosts"));
        }
    }

    #[test]
    fn basic_syntax_treats_plus_as_literal() {
        let f = compile(PathFilter::include("a+b"));
        assert!(f.is_match("a+b"));
        assert!(!f.is_match("aab"));
    }

    #[test]
    fn extended_syntax_treats_plus_as_operator() {
        let f = compile(PathFilter::include("a+b").extended());
        assert!(f.is_match("aab"));
        assert!(!f.is_match("a+b"));
    }

    #[test]
    fn basic_syntax_escaped_group_is_an_operator() {
        let f = compile(PathFilter::include(r"^\(ab\)*$"));
        assert!(f.is_match("abab"));
        assert!(!f.is_match("(ab)"));
    }

    #[test]
    fn common_patterns_mean_the_same_in_both_grammars() {
        for extended in [false, true] {
            let mut filter = PathFilter::exclude(r"\.tmp$");
            filter.extended = extended;
            let f = compile(filter);
            assert!(f.is_match("build/scratch.tmp"), "extended={}", extended);
            assert!(!f.is_match("notes.txt"), "extended={}", extended);
        }
    }

    #[test]
    fn case_insensitive_matching() {
        let f = compile(PathFilter::exclude(r"\.log$").case_insensitive());
        assert!(f.is_match("/srv/app.LOG"));
        assert!(f.is_match("/srv/app.log"));

        let sensitive = compile(PathFilter::exclude(r"\.log$"));
        assert!(!sensitive.is_match("/srv/app.LOG"));
    }

    #[test]
    fn invalid_extended_pattern_fails_with_pattern_error() {
        let err = CompiledFilter::compile(&PathFilter::include("(").extended()).unwrap_err();
        match err {
            Error::Pattern { pattern, .. } => assert_eq!(pattern, "("),
            other => panic!("expected pattern error, got {:?}", other),
        }
    }

    #[test]
    fn invalid_basic_pattern_fails_with_pattern_error() {
        // An unclosed bracket expression is malformed in either grammar.
        let err = CompiledFilter::compile(&PathFilter::include("[ab")).unwrap_err();
        assert!(matches!(err, Error::Pattern { .. }));
    }

    #[test]
    fn trailing_backslash_is_rejected() {
        assert!(CompiledFilter::compile(&PathFilter::include("oops\\")).is_err());
    }

    #[test]
    fn verdict_is_preserved_through_compilation() {
        let inc = compile(PathFilter::include(".*"));
        let exc = compile(PathFilter::exclude(".*"));
        assert_eq!(inc.filter_type(), FilterType::Include);
        assert_eq!(exc.filter_type(), FilterType::Exclude);
    }
}
