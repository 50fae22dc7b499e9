use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shipping_box_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub box_id: Uuid,
    pub order_id: Uuid,
    pub position: i32,
    pub product_id: Uuid,
    pub quantity: i32,
    /// Grams
    pub weight: i64,
    pub batch_number: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::shipping_box::Entity",
        from = "Column::BoxId",
        to = "super::shipping_box::Column::Id"
    )]
    ShippingBox,
}

impl Related<super::shipping_box::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShippingBox.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
