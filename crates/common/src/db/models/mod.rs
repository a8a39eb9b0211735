//! SeaORM entity models
//!
//! Database entities touched by the generation pipeline

mod chapter;
mod citation;
mod generated_document;
mod project;

pub use project::{
    Entity as ProjectEntity,
    Model as Project,
    ActiveModel as ProjectActiveModel,
    Column as ProjectColumn,
};

pub use chapter::{
    Entity as ChapterEntity,
    Model as Chapter,
    ActiveModel as ChapterActiveModel,
    Column as ChapterColumn,
    ChapterStatus,
    ChapterType,
};

pub use citation::{
    Entity as CitationEntity,
    Model as Citation,
    ActiveModel as CitationActiveModel,
    Column as CitationColumn,
    NewCitation,
};

pub use generated_document::{
    Entity as GeneratedDocumentEntity,
    Model as GeneratedDocument,
    ActiveModel as GeneratedDocumentActiveModel,
    Column as GeneratedDocumentColumn,
    DocumentStatus,
};
