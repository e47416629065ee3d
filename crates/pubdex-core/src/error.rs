use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] crate::index::ConfigError),

    #[error(transparent)]
    Ingest(#[from] crate::ingest::IngestError),

    #[error(transparent)]
    Store(#[from] crate::index::StoreError),

    #[error(transparent)]
    Schema(#[from] crate::index::SchemaError),

    #[error(transparent)]
    Load(#[from] crate::index::LoadError),
}

pub type Result<T> = std::result::Result<T, Error>;
