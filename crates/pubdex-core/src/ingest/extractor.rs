use std::collections::HashMap;

use chrono::NaiveDate;
use thiserror::Error;

use super::normalizer::normalize;
use super::parser::{Element, XmlDocument, XmlPath};
use crate::article::{Author, ContributorRole};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Malformed document: {0}")]
    MalformedDocument(String),
    #[error("Invalid calendar date: {year}-{month}-{day}")]
    InvalidCalendarDate {
        year: String,
        month: String,
        day: String,
    },
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Problems that are recovered from during extraction and only reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionWarning {
    IncompleteDate {
        year: Option<String>,
        month: Option<String>,
        day: Option<String>,
    },
    EmptyAuthorRecord {
        role: ContributorRole,
        position: usize,
    },
}

impl std::fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IncompleteDate { year, month, day } => write!(
                f,
                "incomplete publication date (year={year:?} month={month:?} day={day:?})"
            ),
            Self::EmptyAuthorRecord { role, position } => {
                write!(f, "{role} #{position} has no surname or given names")
            }
        }
    }
}

const ARTICLE_META: &str = "article/front/article-meta";

/// Where a rule's path is evaluated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// The document itself; the path starts with the root element name.
    Document,
    /// The `article-meta` element.
    ArticleMeta,
}

/// How many matches a rule consumes and how they become a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Text of the first match only. Later matches are ignored.
    First,
    /// One normalized value per match.
    Each,
    /// Text of every match, joined into one value.
    Joined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Journal,
    Title,
    Abstract,
    Keywords,
    Body,
    FigureCaptions,
    Acknowledgments,
    Volume,
    Issue,
    FirstPage,
    Pmid,
    Pmc,
    Doi,
}

impl Field {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Journal => "journal",
            Self::Title => "title",
            Self::Abstract => "abstract",
            Self::Keywords => "keywords",
            Self::Body => "body",
            Self::FigureCaptions => "figure_captions",
            Self::Acknowledgments => "acknowledgments",
            Self::Volume => "volume",
            Self::Issue => "issue",
            Self::FirstPage => "fpage",
            Self::Pmid => "pmid",
            Self::Pmc => "pmc",
            Self::Doi => "doi",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Scalar(Option<String>),
    List(Vec<String>),
}

/// One structural query: a field, where to look, and how to read it.
#[derive(Debug, Clone, Copy)]
pub struct TextRule {
    pub field: Field,
    pub anchor: Anchor,
    pub path: &'static str,
    pub arity: Arity,
}

impl TextRule {
    const fn new(field: Field, anchor: Anchor, path: &'static str, arity: Arity) -> Self {
        Self {
            field,
            anchor,
            path,
            arity,
        }
    }

    #[must_use]
    pub fn extract(&self, source: &ArticleSource<'_>) -> FieldValue {
        let matches = source.select(self.anchor, &XmlPath::new(self.path));

        match self.arity {
            Arity::First => FieldValue::Scalar(
                matches.first().and_then(|e| normalize(owned_text(e))),
            ),
            Arity::Each => FieldValue::List(
                matches
                    .iter()
                    .filter_map(|e| normalize(owned_text(e)))
                    .collect(),
            ),
            Arity::Joined => FieldValue::Scalar(normalize(
                matches.iter().flat_map(|e| owned_text(e)).collect::<Vec<_>>(),
            )),
        }
    }
}

/// Every text-valued field of an article record.
///
/// Singleton rules take the first match. Source files are inconsistent about
/// type attributes (several `pub-date`s, several titles), so later matches are
/// silently dropped; this is a simplification, not a proven tie-break.
pub const TEXT_RULES: &[TextRule] = &[
    TextRule::new(
        Field::Journal,
        Anchor::Document,
        "article/front/journal-meta/journal-title-group/journal-title",
        Arity::First,
    ),
    TextRule::new(Field::Title, Anchor::ArticleMeta, "title-group/article-title", Arity::First),
    TextRule::new(Field::Abstract, Anchor::ArticleMeta, "abstract", Arity::Each),
    TextRule::new(Field::Keywords, Anchor::ArticleMeta, "kwd-group/kwd", Arity::Each),
    TextRule::new(Field::Body, Anchor::Document, "article/body", Arity::Joined),
    // Figures can sit anywhere: body, floats-group, appendices.
    TextRule::new(Field::FigureCaptions, Anchor::Document, "//fig/caption", Arity::Each),
    TextRule::new(Field::Acknowledgments, Anchor::Document, "article/back/ack/p", Arity::Joined),
    TextRule::new(Field::Volume, Anchor::ArticleMeta, "volume", Arity::First),
    TextRule::new(Field::Issue, Anchor::ArticleMeta, "issue", Arity::First),
    TextRule::new(Field::FirstPage, Anchor::ArticleMeta, "fpage", Arity::First),
    TextRule::new(
        Field::Pmid,
        Anchor::ArticleMeta,
        r#"article-id[@pub-id-type="pmid"]"#,
        Arity::First,
    ),
    TextRule::new(
        Field::Pmc,
        Anchor::ArticleMeta,
        r#"article-id[@pub-id-type="pmc"]"#,
        Arity::First,
    ),
    TextRule::new(
        Field::Doi,
        Anchor::ArticleMeta,
        r#"article-id[@pub-id-type="doi"]"#,
        Arity::First,
    ),
];

fn owned_text(element: &Element) -> Vec<String> {
    element
        .descendant_text()
        .into_iter()
        .map(String::from)
        .collect()
}

/// A parsed document together with its located `article-meta` anchor.
#[derive(Debug, Clone, Copy)]
pub struct ArticleSource<'a> {
    document: &'a XmlDocument,
    meta: &'a Element,
}

impl<'a> ArticleSource<'a> {
    /// Locate the anchor. A document without one is not an article.
    pub fn locate(document: &'a XmlDocument) -> ExtractionResult<Self> {
        let meta = document
            .select_first(&XmlPath::new(ARTICLE_META))
            .ok_or_else(|| {
                ExtractionError::MalformedDocument(format!(
                    "no /{ARTICLE_META} element (root is <{}>)",
                    document.root().name
                ))
            })?;

        Ok(Self { document, meta })
    }

    #[must_use]
    pub fn document(&self) -> &'a XmlDocument {
        self.document
    }

    #[must_use]
    pub fn meta(&self) -> &'a Element {
        self.meta
    }

    fn select(&self, anchor: Anchor, path: &XmlPath) -> Vec<&'a Element> {
        match anchor {
            Anchor::Document => self.document.select(path),
            Anchor::ArticleMeta => self.meta.select(path),
        }
    }
}

/// Results of every text rule, keyed by field.
#[derive(Debug, Clone, Default)]
pub struct ExtractedFields {
    values: HashMap<Field, FieldValue>,
}

impl ExtractedFields {
    #[must_use]
    pub fn extract(source: &ArticleSource<'_>) -> Self {
        let values = TEXT_RULES
            .iter()
            .map(|rule| (rule.field, rule.extract(source)))
            .collect();
        Self { values }
    }

    /// Take a scalar field. List values collapse to their first entry.
    pub fn take_scalar(&mut self, field: Field) -> Option<String> {
        match self.values.remove(&field)? {
            FieldValue::Scalar(value) => value,
            FieldValue::List(values) => values.into_iter().next(),
        }
    }

    pub fn take_list(&mut self, field: Field) -> Vec<String> {
        match self.values.remove(&field) {
            Some(FieldValue::List(values)) => values,
            Some(FieldValue::Scalar(value)) => value.into_iter().collect(),
            None => Vec::new(),
        }
    }
}

/// Contributors with the given role, in document order.
///
/// Names are read from the `surname` and `given-names` elements of the
/// contributor's own `name` block (or its first `name-alternatives` entry),
/// never from contributors nested inside it. Contributors with neither
/// (collaborations, anonymous entries) are dropped with a warning.
#[must_use]
pub fn contributors(source: &ArticleSource<'_>, role: ContributorRole) -> Vec<Author> {
    let path = XmlPath::new(&format!(
        r#"contrib-group/contrib[@contrib-type="{}"]"#,
        role.as_str()
    ));
    let names = [
        XmlPath::new("name"),
        XmlPath::new("name-alternatives/name"),
    ];
    let surname = XmlPath::new("surname");
    let given_names = XmlPath::new("given-names");

    source
        .meta
        .select(&path)
        .into_iter()
        .enumerate()
        .filter_map(|(position, contrib)| {
            let name = names.iter().find_map(|p| contrib.select_first(p));
            let name_part = |p: &XmlPath| {
                name.and_then(|n| n.select_first(p))
                    .and_then(|e| normalize(owned_text(e)))
            };
            let author = Author::new(name_part(&surname), name_part(&given_names));

            if author.is_none() {
                let warning = ExtractionWarning::EmptyAuthorRecord { role, position };
                tracing::warn!("Skipping contributor: {}", warning);
            }
            author
        })
        .collect()
}

/// Publication date from the first `pub-date` block.
///
/// Missing or zero components give `Ok(None)` and a warning. Components that
/// are all present but do not form a real date are an error for the whole
/// document; nothing is rolled over or clamped.
pub fn publication_date(source: &ArticleSource<'_>) -> ExtractionResult<Option<NaiveDate>> {
    let Some(pub_date) = source.meta.select_first(&XmlPath::new("pub-date")) else {
        return Ok(None);
    };

    let part = |name: &str| {
        pub_date
            .select_first(&XmlPath::new(name))
            .and_then(|e| normalize(owned_text(e)))
    };

    date_from_parts(part("year"), part("month"), part("day"))
}

/// Highest year the index's `strict_date` format can hold.
const MAX_YEAR: u32 = 9999;

enum DatePart {
    Missing,
    Value(u32),
    Overflow,
}

fn date_part(value: Option<&str>) -> DatePart {
    let Some(digits) = value
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
    else {
        return DatePart::Missing;
    };

    match digits.parse::<u32>() {
        Ok(0) => DatePart::Missing,
        Ok(n) => DatePart::Value(n),
        Err(_) if digits.bytes().all(|b| b == b'0') => DatePart::Missing,
        Err(_) => DatePart::Overflow,
    }
}

/// A date component as shown in errors: two-digit padded when numeric.
fn date_label(value: Option<&str>) -> String {
    let value = value.map_or("", str::trim);
    value
        .parse::<u32>()
        .map_or_else(|_| value.to_string(), |n| format!("{n:02}"))
}

pub fn date_from_parts(
    year: Option<String>,
    month: Option<String>,
    day: Option<String>,
) -> ExtractionResult<Option<NaiveDate>> {
    let parts = (
        date_part(year.as_deref()),
        date_part(month.as_deref()),
        date_part(day.as_deref()),
    );

    if matches!(
        parts,
        (DatePart::Missing, _, _) | (_, DatePart::Missing, _) | (_, _, DatePart::Missing)
    ) {
        let warning = ExtractionWarning::IncompleteDate { year, month, day };
        tracing::warn!("Dropping date: {}", warning);
        return Ok(None);
    }

    let date = match parts {
        (DatePart::Value(y), DatePart::Value(m), DatePart::Value(d)) if y <= MAX_YEAR => {
            i32::try_from(y).ok().and_then(|y| NaiveDate::from_ymd_opt(y, m, d))
        }
        _ => None,
    };

    date.map(Some).ok_or_else(|| ExtractionError::InvalidCalendarDate {
        year: date_label(year.as_deref()),
        month: date_label(month.as_deref()),
        day: date_label(day.as_deref()),
    })
}
