//! Chapter entity
//!
//! One row per (project, chapter type). The pipeline replaces `content` and
//! moves the status to `generated`; approval happens elsewhere.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of thesis chapter types, declared in document order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterType {
    Introduction,
    LiteratureReview,
    Methodology,
    Results,
    Conclusion,
}

impl ChapterType {
    pub const ALL: [ChapterType; 5] = [
        ChapterType::Introduction,
        ChapterType::LiteratureReview,
        ChapterType::Methodology,
        ChapterType::Results,
        ChapterType::Conclusion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChapterType::Introduction => "introduction",
            ChapterType::LiteratureReview => "literature_review",
            ChapterType::Methodology => "methodology",
            ChapterType::Results => "results",
            ChapterType::Conclusion => "conclusion",
        }
    }

    /// Parse a stored type string; unknown values yield `None`
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }

    /// Position of this chapter in the rendered document
    pub fn ordinal(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ChapterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chapter lifecycle status
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    Draft,
    Generated,
    Approved,
    Rejected,
}

impl From<String> for ChapterStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "draft" => ChapterStatus::Draft,
            "generated" => ChapterStatus::Generated,
            "approved" => ChapterStatus::Approved,
            "rejected" => ChapterStatus::Rejected,
            _ => ChapterStatus::Draft,
        }
    }
}

impl From<ChapterStatus> for String {
    fn from(status: ChapterStatus) -> Self {
        match status {
            ChapterStatus::Draft => "draft".to_string(),
            ChapterStatus::Generated => "generated".to_string(),
            ChapterStatus::Approved => "approved".to_string(),
            ChapterStatus::Rejected => "rejected".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "chapters")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub project_id: Uuid,

    /// One of the [`ChapterType`] strings
    #[sea_orm(column_name = "type", column_type = "Text")]
    pub chapter_type: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub word_count: i32,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the chapter type, `None` for values outside the closed set
    pub fn kind(&self) -> Option<ChapterType> {
        ChapterType::parse(&self.chapter_type)
    }

    /// Get the chapter status as an enum
    pub fn chapter_status(&self) -> ChapterStatus {
        ChapterStatus::from(self.status.clone())
    }

    /// Approved and generated chapters are eligible for rendering; drafts are not
    pub fn is_renderable(&self) -> bool {
        matches!(
            self.chapter_status(),
            ChapterStatus::Approved | ChapterStatus::Generated
        )
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chapter_type_round_trip_and_order() {
        assert_eq!(ChapterType::parse("literature_review"), Some(ChapterType::LiteratureReview));
        assert_eq!(ChapterType::parse("appendix"), None);
        assert!(ChapterType::Introduction.ordinal() < ChapterType::LiteratureReview.ordinal());
        assert!(ChapterType::Methodology.ordinal() < ChapterType::Conclusion.ordinal());
    }

    #[test]
    fn test_unknown_status_reads_as_draft() {
        assert_eq!(ChapterStatus::from("archived".to_string()), ChapterStatus::Draft);
        assert_eq!(String::from(ChapterStatus::Generated), "generated");
    }
}
