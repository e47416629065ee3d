mod assembler;
mod extractor;
mod normalizer;
mod parser;
mod pipeline;

pub use assembler::assemble;
pub use extractor::{
    contributors, date_from_parts, publication_date, Anchor, ArticleSource, Arity,
    ExtractedFields, ExtractionError, ExtractionResult, ExtractionWarning, Field, FieldValue,
    TextRule, TEXT_RULES,
};
pub use normalizer::{decode_entities, normalize, RawText};
pub use parser::{
    parse_bytes, parse_file, Element, Node, ParseError, ParseResult, XmlDocument, XmlPath,
};
pub use pipeline::{
    discover_files, extract_file, ExtractionFailure, IngestError, IngestPipeline, IngestReport,
    IngestResult, Source,
};
