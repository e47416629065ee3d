use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A contributor name as stored in the index.
///
/// `full-name` is derived and only present when both parts are. Construct
/// through [`Author::new`], which refuses to build an entry with no name data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub surname: Option<String>,
    #[serde(rename = "given-names")]
    pub given_names: Option<String>,
    #[serde(rename = "full-name")]
    pub full_name: Option<String>,
}

impl Author {
    #[must_use]
    pub fn new(surname: Option<String>, given_names: Option<String>) -> Option<Self> {
        if surname.is_none() && given_names.is_none() {
            return None;
        }

        let full_name = match (&surname, &given_names) {
            (Some(surname), Some(given)) => Some(format!("{surname}, {given}")),
            _ => None,
        };

        Some(Self {
            surname,
            given_names,
            full_name,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributorRole {
    Author,
    Editor,
}

impl ContributorRole {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::Editor => "editor",
        }
    }
}

impl std::fmt::Display for ContributorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The normalized record produced for one source article.
///
/// Scalars are `None` when the source has nothing for them and lists are
/// empty; no field ever holds an empty string. `date` serializes as
/// `YYYY-MM-DD`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub journal: Option<String>,
    pub title: Option<String>,
    pub authors: Vec<Author>,
    pub editors: Vec<Author>,
    #[serde(rename = "abstract")]
    pub abstracts: Vec<String>,
    pub keywords: Vec<String>,
    pub body: Option<String>,
    pub figure_captions: Vec<String>,
    pub acknowledgments: Option<String>,
    pub date: Option<NaiveDate>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub fpage: Option<String>,
    pub pmid: Option<String>,
    pub pmc: Option<String>,
    pub doi: Option<String>,
}

impl ArticleRecord {
    /// Short identification used in logs and bulk error reports.
    #[must_use]
    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            pmid: self.pmid.clone(),
            pmc: self.pmc.clone(),
            doi: self.doi.clone(),
            title: self.title.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl std::fmt::Display for RecordSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids = [("pmid", &self.pmid), ("pmc", &self.pmc), ("doi", &self.doi)];
        let mut wrote = false;

        for (label, value) in ids {
            if let Some(value) = value {
                if wrote {
                    f.write_str(" ")?;
                }
                write!(f, "{label}={value}")?;
                wrote = true;
            }
        }

        if !wrote {
            match &self.title {
                Some(title) => write!(f, "title={title:?}")?,
                None => f.write_str("<unidentified>")?,
            }
        }

        Ok(())
    }
}
