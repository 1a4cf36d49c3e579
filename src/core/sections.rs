//! Static registry of provisioning sections and the glob predicate selecting them.

use glob::Pattern;

use crate::error::{Error, Result};

pub const DEFAULT_SECTION_PATTERN: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub name: &'static str,
    pub description: &'static str,
}

pub const IAM: Section = Section {
    name: "iam",
    description: "Runtime service account and its project role bindings",
};
pub const SECRETS: Section = Section {
    name: "secrets",
    description: "Secret Manager secrets holding database and SMTP passwords",
};
pub const PSQL: Section = Section {
    name: "psql",
    description: "Cloud SQL PostgreSQL instance, databases and users",
};
pub const BIGQUERY: Section = Section {
    name: "bigquery",
    description: "BigQuery archive datasets",
};
pub const ARTIFACTS: Section = Section {
    name: "artifacts",
    description: "Artifact Registry repository for function and service images",
};
pub const RUN: Section = Section {
    name: "run",
    description: "Cloud Run dashboard service",
};
pub const PUBSUB: Section = Section {
    name: "pubsub",
    description: "Pub/Sub topics and subscriptions",
};
pub const STORAGE: Section = Section {
    name: "storage",
    description: "Cloud Storage cache bucket",
};
pub const CLOUD_FUNCTIONS: Section = Section {
    name: "cloud_functions",
    description: "Cloud Functions processing submissions and notifications",
};
pub const SCHEDULER: Section = Section {
    name: "scheduler",
    description: "Cloud Scheduler jobs triggering periodic functions",
};
pub const SUBMITTERS: Section = Section {
    name: "submitters",
    description: "Submitter permissions to publish to the new-items topic",
};

/// Every section, in deployment order.
pub const SECTIONS: [Section; 11] = [
    IAM,
    SECRETS,
    PSQL,
    BIGQUERY,
    ARTIFACTS,
    RUN,
    PUBSUB,
    STORAGE,
    CLOUD_FUNCTIONS,
    SCHEDULER,
    SUBMITTERS,
];

/// Sections accepted by `filter`, sorted by name.
pub fn list(filter: &SectionFilter) -> Vec<Section> {
    let mut sections: Vec<Section> = SECTIONS
        .iter()
        .copied()
        .filter(|section| filter.is_selected(section.name))
        .collect();
    sections.sort_by_key(|section| section.name);
    sections
}

/// Section-name predicate compiled once from a shell glob.
///
/// Besides `*`, `?` and `[...]`, the extended-glob groups `@(a|b)`, `?(a|b)`,
/// `*(a|b)`, `+(a|b)` and `!(a|b)` are accepted, nested or not. The text between
/// groups is matched with [`glob::Pattern`].
#[derive(Debug, Clone)]
pub struct SectionFilter {
    source: String,
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    Any,
    Sequence(Vec<Segment>),
}

#[derive(Debug, Clone)]
enum Segment {
    Glob(Pattern),
    Group {
        op: GroupOp,
        alternatives: Vec<Vec<Segment>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupOp {
    /// `@(...)`: exactly one alternative.
    One,
    /// `?(...)`: zero or one.
    Optional,
    /// `*(...)`: zero or more.
    ZeroOrMore,
    /// `+(...)`: one or more.
    OneOrMore,
    /// `!(...)`: anything no alternative matches.
    Not,
}

impl GroupOp {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'@' => Some(GroupOp::One),
            b'?' => Some(GroupOp::Optional),
            b'*' => Some(GroupOp::ZeroOrMore),
            b'+' => Some(GroupOp::OneOrMore),
            b'!' => Some(GroupOp::Not),
            _ => None,
        }
    }
}

impl SectionFilter {
    pub fn compile(pattern: &str) -> Result<Self> {
        let segments = parse(pattern).map_err(|message| Error::InvalidSectionPattern {
            pattern: pattern.to_string(),
            message,
        })?;
        Ok(Self {
            source: pattern.to_string(),
            matcher: Matcher::Sequence(segments),
        })
    }

    pub fn all() -> Self {
        Self {
            source: DEFAULT_SECTION_PATTERN.to_string(),
            matcher: Matcher::Any,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.source
    }

    pub fn is_selected(&self, name: &str) -> bool {
        match &self.matcher {
            Matcher::Any => true,
            Matcher::Sequence(segments) => matches_sequence(segments, name),
        }
    }
}

impl Default for SectionFilter {
    fn default() -> Self {
        Self::all()
    }
}

type ParseResult<T> = std::result::Result<T, String>;

/// Split `pattern` into plain glob runs and extended-glob groups.
fn parse(pattern: &str) -> ParseResult<Vec<Segment>> {
    let bytes = pattern.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'[' {
            index = class_end(pattern, index);
            continue;
        }
        let op = match GroupOp::from_byte(bytes[index]) {
            Some(op) if bytes.get(index + 1) == Some(&b'(') => op,
            _ => {
                index += 1;
                continue;
            }
        };
        push_glob(&mut segments, &pattern[literal_start..index])?;
        let body_start = index + 2;
        let close = group_end(pattern, body_start).ok_or_else(|| {
            format!("unterminated `{}(` group", char::from(bytes[index]))
        })?;
        let alternatives = split_top_level(&pattern[body_start..close])
            .into_iter()
            .map(parse)
            .collect::<ParseResult<Vec<_>>>()?;
        segments.push(Segment::Group { op, alternatives });
        index = close + 1;
        literal_start = index;
    }
    push_glob(&mut segments, &pattern[literal_start..])?;
    Ok(segments)
}

fn push_glob(segments: &mut Vec<Segment>, text: &str) -> ParseResult<()> {
    if !text.is_empty() {
        let pattern = Pattern::new(text).map_err(|err| err.to_string())?;
        segments.push(Segment::Glob(pattern));
    }
    Ok(())
}

/// Index just past the `]` closing the class opened at `start`, or the end of the
/// pattern when unterminated (left for [`Pattern::new`] to reject).
fn class_end(pattern: &str, start: usize) -> usize {
    let bytes = pattern.as_bytes();
    let mut index = start + 1;
    if bytes.get(index) == Some(&b'!') {
        index += 1;
    }
    if bytes.get(index) == Some(&b']') {
        index += 1;
    }
    match pattern.get(index..).and_then(|rest| rest.find(']')) {
        Some(offset) => index + offset + 1,
        None => bytes.len(),
    }
}

/// Index of the `)` closing a group whose body starts at `body_start`.
fn group_end(pattern: &str, body_start: usize) -> Option<usize> {
    let bytes = pattern.as_bytes();
    let mut depth = 1usize;
    let mut index = body_start;
    while index < bytes.len() {
        match bytes[index] {
            b'[' => {
                index = class_end(pattern, index);
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
        index += 1;
    }
    None
}

fn split_top_level(body: &str) -> Vec<&str> {
    let bytes = body.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut last = 0;
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'[' => {
                index = class_end(body, index);
                continue;
            }
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b'|' if depth == 0 => {
                parts.push(&body[last..index]);
                last = index + 1;
            }
            _ => {}
        }
        index += 1;
    }
    parts.push(&body[last..]);
    parts
}

/// Byte offsets at which `text` may be split, shortest head first.
fn split_points(text: &str) -> impl Iterator<Item = usize> + '_ {
    text.char_indices()
        .map(|(index, _)| index)
        .chain(std::iter::once(text.len()))
}

fn matches_sequence(segments: &[Segment], text: &str) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return text.is_empty();
    };
    split_points(text).any(|split| {
        let (head, tail) = text.split_at(split);
        matches_segment(first, head) && matches_sequence(rest, tail)
    })
}

fn matches_segment(segment: &Segment, text: &str) -> bool {
    match segment {
        Segment::Glob(pattern) => pattern.matches(text),
        Segment::Group { op, alternatives } => {
            let any = |text: &str| {
                alternatives
                    .iter()
                    .any(|alternative| matches_sequence(alternative, text))
            };
            match op {
                GroupOp::One => any(text),
                GroupOp::Optional => text.is_empty() || any(text),
                GroupOp::ZeroOrMore => matches_repeated(alternatives, text),
                GroupOp::OneOrMore if text.is_empty() => any(text),
                GroupOp::OneOrMore => matches_repeated(alternatives, text),
                GroupOp::Not => !any(text),
            }
        }
    }
}

/// Whether `text` is a concatenation of non-empty matches of the alternatives.
fn matches_repeated(alternatives: &[Vec<Segment>], text: &str) -> bool {
    if text.is_empty() {
        return true;
    }
    split_points(text).skip(1).any(|split| {
        let (head, tail) = text.split_at(split);
        alternatives
            .iter()
            .any(|alternative| matches_sequence(alternative, head))
            && matches_repeated(alternatives, tail)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(filter: &SectionFilter) -> Vec<&'static str> {
        list(filter).into_iter().map(|section| section.name).collect()
    }

    #[test]
    fn listing_is_sorted_by_name() {
        let listed = names(&SectionFilter::all());
        let mut sorted = listed.clone();
        sorted.sort();
        assert_eq!(listed, sorted);
        assert_eq!(listed.len(), SECTIONS.len());
    }

    #[test]
    fn exact_name_selects_one_section() {
        let filter = SectionFilter::compile("storage").unwrap();
        assert_eq!(names(&filter), vec!["storage"]);
        assert!(!filter.is_selected("pubsub"));
    }

    #[test]
    fn unmatched_pattern_selects_nothing() {
        let filter = SectionFilter::compile("redhat_*").unwrap();
        assert!(names(&filter).is_empty());
    }

    #[test]
    fn wildcards_and_classes_match() {
        let filter = SectionFilter::compile("s*").unwrap();
        assert_eq!(
            names(&filter),
            vec!["scheduler", "secrets", "storage", "submitters"]
        );
        let filter = SectionFilter::compile("[bp]*").unwrap();
        assert_eq!(names(&filter), vec!["bigquery", "psql", "pubsub"]);
    }

    #[test]
    fn extended_alternation_expands() {
        let filter = SectionFilter::compile("@(psql|big*)").unwrap();
        assert_eq!(names(&filter), vec!["bigquery", "psql"]);
        let filter = SectionFilter::compile("cloud_@(functions|run)").unwrap();
        assert_eq!(names(&filter), vec!["cloud_functions"]);
    }

    #[test]
    fn negated_group_excludes_its_alternatives() {
        let filter = SectionFilter::compile("!(psql)").unwrap();
        assert_eq!(names(&filter).len(), SECTIONS.len() - 1);
        assert!(!filter.is_selected("psql"));
        let filter = SectionFilter::compile("!(*s)").unwrap();
        assert_eq!(
            names(&filter),
            vec!["bigquery", "iam", "psql", "pubsub", "run", "scheduler", "storage"]
        );
        let filter = SectionFilter::compile("!(s*|p*)").unwrap();
        assert!(names(&filter).iter().all(|name| !name.starts_with(['s', 'p'])));
    }

    #[test]
    fn counted_groups_repeat_their_alternatives() {
        let filter = SectionFilter::compile("+(psql|pubsub)").unwrap();
        assert_eq!(names(&filter), vec!["psql", "pubsub"]);
        assert!(filter.is_selected("psqlpubsub"));
        assert!(!filter.is_selected(""));

        let filter = SectionFilter::compile("?(cloud_)functions").unwrap();
        assert_eq!(names(&filter), vec!["cloud_functions"]);
        assert!(filter.is_selected("functions"));

        let filter = SectionFilter::compile("*(s|e|c|r|t)").unwrap();
        assert_eq!(names(&filter), vec!["secrets"]);
        assert!(filter.is_selected(""));
    }

    #[test]
    fn groups_nest() {
        let filter = SectionFilter::compile("@(p@(sql|ubsub)|iam)").unwrap();
        assert_eq!(names(&filter), vec!["iam", "psql", "pubsub"]);
        let filter = SectionFilter::compile("s!(ecrets|torage)").unwrap();
        assert_eq!(names(&filter), vec!["scheduler", "submitters"]);
    }

    #[test]
    fn brackets_hide_group_syntax() {
        let filter = SectionFilter::compile("[!@(]sql").unwrap();
        assert_eq!(names(&filter), vec!["psql"]);
    }

    #[test]
    fn malformed_patterns_are_usage_errors() {
        for pattern in ["@(psql", "!(psql", "+(a|@(b)", "[abc"] {
            assert!(
                matches!(
                    SectionFilter::compile(pattern),
                    Err(Error::InvalidSectionPattern { .. })
                ),
                "{pattern}"
            );
        }
    }

    #[test]
    fn section_names_are_unique() {
        let mut seen: Vec<&str> = SECTIONS.iter().map(|section| section.name).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), SECTIONS.len());
    }
}
