use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "picking_order_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    /// Display order within the order
    pub position: i32,
    pub product_id: Uuid,
    pub product_name: String,
    pub ordered_quantity: i32,
    pub picked_quantity: i32,
    pub original_quantity: Option<i32>,
    pub checked: bool,
    pub batch_number: Option<String>,
    /// Grams
    pub picked_weight: Option<i64>,
    /// Grams
    pub manual_weight: Option<i64>,
    pub box_number: Option<i32>,
    pub requires_weight_input: bool,
    /// Grams per unit
    pub unit_weight: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::picking_order::Entity",
        from = "Column::OrderId",
        to = "super::picking_order::Column::Id"
    )]
    Order,
}

impl Related<super::picking_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
