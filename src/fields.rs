//! Field splitting, rewriting and selection: the transform behind the `xcut` binary.
//!
//! Each line is split on a delimiter into 1-based fields. A sed-like
//! substitution (`s/SEARCH/REPLACE/`) is applied to every field, to a listed
//! subset, or to every field *not* listed. The requested fields are then
//! joined back with the same delimiter.
//!
//! ```
//! use xcut::fields::FieldOptions;
//! use xcut::transform::Transform;
//!
//! let t = FieldOptions {
//!     delimiter: ",".into(),
//!     fields: "3,1".into(),
//!     pattern: Some(r"s/\d/#/".into()),
//!     ..FieldOptions::default()
//! }
//! .build()?;
//! assert_eq!(t.apply("a1,b2,c3")?, "c#,a#");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{Error, Result, TransformError};
use crate::transform::Transform;
use regex::Regex;
use std::borrow::Cow;

/// Parse a comma separated list of 1-based field numbers.
///
/// An empty string yields an empty list (meaning "all fields"). Anything
/// other than `N[,N...]` with every `N >= 1` is rejected.
///
/// # Errors
///
/// Returns [`Error::InvalidFieldList`] naming `option` on malformed input.
pub fn parse_field_list(option: &'static str, value: &str) -> Result<Vec<usize>> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    let invalid = || Error::InvalidFieldList { option, value: value.to_string() };
    value
        .split(',')
        .map(|part| {
            let well_formed = !part.is_empty()
                && part.bytes().all(|b| b.is_ascii_digit())
                && !part.starts_with('0');
            if !well_formed {
                return Err(invalid());
            }
            part.parse::<usize>().map_err(|_| invalid())
        })
        .collect()
}

/// A compiled `s/SEARCH/REPLACE/` substitution.
#[derive(Clone, Debug)]
pub struct Substitution {
    search: Regex,
    replace: String,
}

impl Substitution {
    /// Compile a substitution from its parts.
    ///
    /// `$&` in `replace` stands for the whole match, like `$0`. A group
    /// reference `$N` ends at the last digit that still names an existing
    /// group, so `$1x` is group 1 followed by `x`.
    ///
    /// # Errors
    ///
    /// Fails if `search` is empty or not a valid regular expression.
    pub fn new(search: &str, replace: &str) -> Result<Self> {
        if search.is_empty() {
            return Err(Error::InvalidOptions("search pattern cannot be empty".to_string()));
        }
        let search = Regex::new(search)?;
        let replace = brace_group_refs(replace, search.captures_len());
        Ok(Self { search, replace })
    }

    /// Parse sed-like `s/SEARCH/REPLACE/`. A `/` inside either part is written `\/`.
    ///
    /// # Errors
    ///
    /// Fails on a malformed expression, an empty search, or an invalid regex.
    pub fn parse(expr: &str) -> Result<Self> {
        let malformed = || Error::InvalidSubstitution(expr.to_string());
        let body = expr.strip_prefix("s/").ok_or_else(malformed)?;
        let (search, rest) = split_unescaped_slash(body).ok_or_else(malformed)?;
        let (replace, tail) = split_unescaped_slash(rest).ok_or_else(malformed)?;
        if !tail.is_empty() {
            return Err(malformed());
        }
        Self::new(&search, &replace)
    }

    pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        self.search.replace_all(text, self.replace.as_str())
    }
}

/// Rewrite `$&` and numbered `$N` references to the `${N}` form. At most two
/// digits are taken, and the second only if it still names one of `groups`.
/// `$$` and `${..}` pass through untouched.
fn brace_group_refs(replace: &str, groups: usize) -> String {
    let mut out = String::with_capacity(replace.len() + 8);
    let mut chars = replace.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('$') => {
                chars.next();
                out.push_str("$$");
            }
            Some('&') => {
                chars.next();
                out.push_str("${0}");
            }
            Some(d) if d.is_ascii_digit() => {
                chars.next();
                let mut index = d.to_digit(10).map_or(0, |v| v as usize);
                if let Some(next) = chars.peek().and_then(|n| n.to_digit(10)) {
                    let wider = index * 10 + next as usize;
                    if wider < groups {
                        chars.next();
                        index = wider;
                    }
                }
                out.push_str(&format!("${{{index}}}"));
            }
            _ => out.push('$'),
        }
    }
    out
}

/// Split at the first `/` not preceded by a backslash, unescaping `\/`.
fn split_unescaped_slash(s: &str) -> Option<(String, &str)> {
    let mut out = String::new();
    let mut chars = s.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, '/')) => out.push('/'),
                Some((_, other)) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            },
            '/' => return Some((out, &s[i + 1..])),
            _ => out.push(c),
        }
    }
    None
}

/// Unvalidated field options, as given on the command line.
#[derive(Clone, Debug)]
pub struct FieldOptions {
    pub delimiter: String,
    /// Fields to output, e.g. `"1,3"`; empty for all.
    pub fields: String,
    /// Fields the pattern applies to; empty for all.
    pub pattern_fields: String,
    /// `s/SEARCH/REPLACE/`.
    pub pattern: Option<String>,
    /// Apply the pattern to the fields *not* in `pattern_fields`.
    pub inverse: bool,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            delimiter: " ".to_string(),
            fields: String::new(),
            pattern_fields: String::new(),
            pattern: None,
            inverse: false,
        }
    }
}

impl FieldOptions {
    /// Validate and compile into a [`FieldTransform`].
    ///
    /// # Errors
    ///
    /// Fails on an empty delimiter, a malformed field list or pattern, `inverse`
    /// without pattern fields, or pattern fields without a pattern.
    pub fn build(&self) -> Result<FieldTransform> {
        if self.delimiter.is_empty() {
            return Err(Error::InvalidOptions("delimiter cannot be empty".to_string()));
        }
        let fields = parse_field_list("-f", &self.fields)?;
        let pattern_fields = parse_field_list("-p", &self.pattern_fields)?;
        if self.inverse && pattern_fields.is_empty() {
            return Err(Error::InvalidOptions(
                "option -i requires option -p with a non-empty value".to_string(),
            ));
        }
        let substitution = match self.pattern.as_deref() {
            Some(expr) => Some(Substitution::parse(expr)?),
            None if !pattern_fields.is_empty() => {
                return Err(Error::InvalidOptions(
                    "option -p requires option -x with a non-empty value".to_string(),
                ));
            }
            None => None,
        };
        Ok(FieldTransform {
            delimiter: self.delimiter.clone(),
            fields,
            pattern_fields,
            inverse: self.inverse,
            substitution,
        })
    }
}

/// Split, rewrite and select the fields of one line.
#[derive(Clone, Debug)]
pub struct FieldTransform {
    delimiter: String,
    fields: Vec<usize>,
    pattern_fields: Vec<usize>,
    inverse: bool,
    substitution: Option<Substitution>,
}

impl FieldTransform {
    /// Whether the substitution applies to 1-based field `n`.
    fn rewrites(&self, n: usize) -> bool {
        self.pattern_fields.is_empty() || (self.pattern_fields.contains(&n) != self.inverse)
    }

    /// Transform one line. Infallible: every input yields some output.
    pub fn cut(&self, line: &str) -> String {
        let mut parts: Vec<Cow<'_, str>> =
            line.split(self.delimiter.as_str()).map(Cow::Borrowed).collect();

        if let Some(sub) = &self.substitution {
            for (i, part) in parts.iter_mut().enumerate() {
                if self.rewrites(i + 1) {
                    if let Cow::Owned(s) = sub.apply(part) {
                        *part = Cow::Owned(s);
                    }
                }
            }
        }

        if self.fields.is_empty() {
            return parts.join(&self.delimiter);
        }
        let selected: Vec<&str> =
            self.fields.iter().filter_map(|&n| parts.get(n - 1)).map(|p| p.as_ref()).collect();
        selected.join(&self.delimiter)
    }
}

impl Transform for FieldTransform {
    fn apply(&self, payload: &str) -> Result<String, TransformError> {
        Ok(self.cut(payload))
    }

    fn name(&self) -> &str {
        "fields"
    }
}
