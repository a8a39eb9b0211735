//! Citation entity: a persisted bibliography entry scoped to one project
//!
//! (project_id, doi) and (project_id, external_id) are unique when present.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "citations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub project_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    /// Author names joined with "; "
    #[sea_orm(column_type = "Text")]
    pub authors: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub journal: Option<String>,

    pub publication_year: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub doi: Option<String>,

    /// Identifier assigned by the search service the paper came from
    #[sea_orm(column_type = "Text", nullable)]
    pub external_id: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub abstract_text: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub url: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub source_api: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub citation_apa: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub citation_mla: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Citations without a formatted string are left out of rendered documents
    pub fn has_formatted_citation(&self) -> bool {
        self.citation_apa
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }
}

/// Insert payload produced by the citation reconciler
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCitation {
    pub project_id: Uuid,
    pub title: String,
    pub authors: String,
    pub journal: Option<String>,
    pub publication_year: Option<i32>,
    pub doi: Option<String>,
    pub external_id: Option<String>,
    pub abstract_text: Option<String>,
    pub url: Option<String>,
    pub source_api: String,
    pub citation_apa: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id",
        on_delete = "Cascade"
    )]
    Project,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
