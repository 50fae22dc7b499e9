use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order header as seen by the picking workflow.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "picking_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_number: String,
    pub status: String,
    pub picking_in_progress: bool,
    pub is_picked: bool,
    pub batch_number: Option<String>,
    /// JSON array of batch numbers
    pub batch_numbers: String,
    pub next_box_number: i32,
    pub revision: i32,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::picking_order_line::Entity")]
    Lines,
    #[sea_orm(has_many = "super::shipping_box::Entity")]
    Boxes,
    #[sea_orm(has_many = "super::missing_item::Entity")]
    MissingItems,
}

impl Related<super::picking_order_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
    }
}

impl Related<super::shipping_box::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Boxes.def()
    }
}

impl Related<super::missing_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MissingItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
