use super::extractor::{
    contributors, publication_date, ArticleSource, ExtractedFields, ExtractionResult, Field,
};
use super::parser::XmlDocument;
use crate::article::{ArticleRecord, ContributorRole};

/// Build the record for one parsed document.
///
/// Either every field is extracted or the document is rejected: a missing
/// `article-meta` or an impossible publication date fails the whole record.
pub fn assemble(document: &XmlDocument) -> ExtractionResult<ArticleRecord> {
    let source = ArticleSource::locate(document)?;

    let date = publication_date(&source)?;
    let authors = contributors(&source, ContributorRole::Author);
    let editors = contributors(&source, ContributorRole::Editor);
    let mut fields = ExtractedFields::extract(&source);

    Ok(ArticleRecord {
        journal: fields.take_scalar(Field::Journal),
        title: fields.take_scalar(Field::Title),
        authors,
        editors,
        abstracts: fields.take_list(Field::Abstract),
        keywords: fields.take_list(Field::Keywords),
        body: fields.take_scalar(Field::Body),
        figure_captions: fields.take_list(Field::FigureCaptions),
        acknowledgments: fields.take_scalar(Field::Acknowledgments),
        date,
        volume: fields.take_scalar(Field::Volume),
        issue: fields.take_scalar(Field::Issue),
        fpage: fields.take_scalar(Field::FirstPage),
        pmid: fields.take_scalar(Field::Pmid),
        pmc: fields.take_scalar(Field::Pmc),
        doi: fields.take_scalar(Field::Doi),
    })
}
