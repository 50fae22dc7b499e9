use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveValue, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{BaseRepository, BatchUsageStore, OrderStore, Repository};
use crate::{
    entities::{
        batch_usage, batch_usage_contribution, missing_item, order_batch_summary, picking_order,
        picking_order_line, shipping_box, shipping_box_item,
    },
    errors::ServiceError,
    models::{
        BatchSummary, BatchUsage, BatchUsageContribution, BoxItem, Grams, InventoryLine,
        MissingItem, MissingItemStatus, OrderSnapshot, OrderStatus, ShippingBox,
    },
};

/// sea-orm backed order storage
#[derive(Debug, Clone)]
pub struct OrderRepository {
    base: BaseRepository,
}

impl OrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    async fn insert_children(
        txn: &DatabaseTransaction,
        order: &OrderSnapshot,
    ) -> Result<(), ServiceError> {
        let lines: Vec<picking_order_line::ActiveModel> = order
            .lines
            .iter()
            .enumerate()
            .map(|(position, line)| line_to_active(line, position as i32))
            .collect();
        if !lines.is_empty() {
            picking_order_line::Entity::insert_many(lines)
                .exec_without_returning(txn)
                .await?;
        }

        for shipping_box in &order.boxes {
            Self::insert_box(txn, order.order_id, Uuid::new_v4(), shipping_box).await?;
        }

        let missing: Vec<missing_item::ActiveModel> =
            order.missing_items.iter().map(missing_to_active).collect();
        if !missing.is_empty() {
            missing_item::Entity::insert_many(missing)
                .exec_without_returning(txn)
                .await?;
        }

        if let Some(summary) = &order.batch_summary {
            let rows: Vec<order_batch_summary::ActiveModel> = summary
                .iter()
                .map(|s| order_batch_summary::ActiveModel {
                    order_id: Set(order.order_id),
                    batch_number: Set(s.batch_number.clone()),
                    total_weight: Set(s.total_weight.value()),
                })
                .collect();
            if !rows.is_empty() {
                order_batch_summary::Entity::insert_many(rows)
                    .exec_without_returning(txn)
                    .await?;
            }
        }
        Ok(())
    }

    async fn insert_box(
        txn: &DatabaseTransaction,
        order_id: Uuid,
        box_id: Uuid,
        shipping_box: &ShippingBox,
    ) -> Result<(), ServiceError> {
        shipping_box::Entity::insert(shipping_box::ActiveModel {
            id: Set(box_id),
            order_id: Set(order_id),
            box_number: Set(shipping_box.box_number),
            completed: Set(shipping_box.completed),
            saved: Set(shipping_box.saved),
            batch_number: Set(shipping_box.batch_number.clone()),
        })
        .exec_without_returning(txn)
        .await?;

        let items: Vec<shipping_box_item::ActiveModel> = shipping_box
            .items
            .iter()
            .enumerate()
            .map(|(position, item)| shipping_box_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                box_id: Set(box_id),
                order_id: Set(order_id),
                position: Set(position as i32),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                weight: Set(item.weight.value()),
                batch_number: Set(item.batch_number.clone()),
            })
            .collect();
        if !items.is_empty() {
            shipping_box_item::Entity::insert_many(items)
                .exec_without_returning(txn)
                .await?;
        }
        Ok(())
    }

    async fn delete_children(txn: &DatabaseTransaction, order_id: Uuid) -> Result<(), ServiceError> {
        shipping_box_item::Entity::delete_many()
            .filter(shipping_box_item::Column::OrderId.eq(order_id))
            .exec(txn)
            .await?;
        shipping_box::Entity::delete_many()
            .filter(shipping_box::Column::OrderId.eq(order_id))
            .exec(txn)
            .await?;
        picking_order_line::Entity::delete_many()
            .filter(picking_order_line::Column::OrderId.eq(order_id))
            .exec(txn)
            .await?;
        missing_item::Entity::delete_many()
            .filter(missing_item::Column::OrderId.eq(order_id))
            .exec(txn)
            .await?;
        order_batch_summary::Entity::delete_many()
            .filter(order_batch_summary::Column::OrderId.eq(order_id))
            .exec(txn)
            .await?;
        Ok(())
    }
}

impl Repository for OrderRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    #[instrument(skip(self))]
    async fn load_order(&self, order_id: Uuid) -> Result<OrderSnapshot, ServiceError> {
        let db = self.get_db();
        let header = picking_order::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let lines = picking_order_line::Entity::find()
            .filter(picking_order_line::Column::OrderId.eq(order_id))
            .order_by_asc(picking_order_line::Column::Position)
            .all(db)
            .await?;
        let boxes = shipping_box::Entity::find()
            .filter(shipping_box::Column::OrderId.eq(order_id))
            .order_by_asc(shipping_box::Column::BoxNumber)
            .all(db)
            .await?;
        let items = shipping_box_item::Entity::find()
            .filter(shipping_box_item::Column::OrderId.eq(order_id))
            .order_by_asc(shipping_box_item::Column::Position)
            .all(db)
            .await?;
        let missing = missing_item::Entity::find()
            .filter(missing_item::Column::OrderId.eq(order_id))
            .order_by_asc(missing_item::Column::Date)
            .all(db)
            .await?;
        let summaries = order_batch_summary::Entity::find()
            .filter(order_batch_summary::Column::OrderId.eq(order_id))
            .order_by_asc(order_batch_summary::Column::BatchNumber)
            .all(db)
            .await?;

        let status = OrderStatus::from_str(&header.status).map_err(|_| {
            ServiceError::InternalError(format!("Unknown order status '{}'", header.status))
        })?;
        let batch_numbers: Vec<String> = serde_json::from_str(&header.batch_numbers)?;

        let boxes = boxes
            .into_iter()
            .map(|b| ShippingBox {
                box_number: b.box_number,
                items: items
                    .iter()
                    .filter(|i| i.box_id == b.id)
                    .map(|i| BoxItem {
                        product_id: i.product_id,
                        quantity: i.quantity,
                        weight: Grams::new(i.weight),
                        batch_number: i.batch_number.clone(),
                    })
                    .collect(),
                completed: b.completed,
                saved: b.saved,
                batch_number: b.batch_number,
            })
            .collect();

        let missing_items = missing
            .into_iter()
            .map(missing_from_model)
            .collect::<Result<Vec<_>, _>>()?;

        let batch_summary = (status == OrderStatus::Completed).then(|| {
            summaries
                .into_iter()
                .map(|s| BatchSummary {
                    batch_number: s.batch_number,
                    total_weight: Grams::new(s.total_weight),
                })
                .collect()
        });

        Ok(OrderSnapshot {
            order_id,
            order_number: header.order_number,
            status,
            picking_in_progress: header.picking_in_progress,
            is_picked: header.is_picked,
            batch_number: header.batch_number,
            batch_numbers,
            batch_summary,
            lines: lines.into_iter().map(line_from_model).collect(),
            boxes,
            missing_items,
            next_box_number: header.next_box_number,
            revision: header.revision,
            updated_at: header.updated_at,
        })
    }

    #[instrument(skip(self, order), fields(order_id = %order.order_id))]
    async fn save_order(
        &self,
        order: &OrderSnapshot,
        expected_revision: i32,
    ) -> Result<i32, ServiceError> {
        let db = self.get_db();
        let txn = db.begin().await?;
        let new_revision = expected_revision + 1;
        let header = picking_order::ActiveModel {
            id: Set(order.order_id),
            order_number: Set(order.order_number.clone()),
            status: Set(order.status.to_string()),
            picking_in_progress: Set(order.picking_in_progress),
            is_picked: Set(order.is_picked),
            batch_number: Set(order.batch_number.clone()),
            batch_numbers: Set(serde_json::to_string(&order.batch_numbers)?),
            next_box_number: Set(order.next_box_number),
            revision: Set(new_revision),
            updated_at: Set(Some(Utc::now())),
        };

        let updated = picking_order::Entity::update_many()
            .set(header.clone())
            .filter(picking_order::Column::Id.eq(order.order_id))
            .filter(picking_order::Column::Revision.eq(expected_revision))
            .exec(&txn)
            .await?;

        if updated.rows_affected == 0 {
            let exists = picking_order::Entity::find_by_id(order.order_id)
                .one(&txn)
                .await?
                .is_some();
            if exists {
                warn!(expected_revision, "Stale order revision");
                return Err(ServiceError::ConcurrentModification(order.order_id));
            }
            if expected_revision != 0 {
                return Err(ServiceError::NotFound(format!(
                    "Order {} not found",
                    order.order_id
                )));
            }
            picking_order::Entity::insert(header)
                .exec_without_returning(&txn)
                .await?;
        }

        Self::delete_children(&txn, order.order_id).await?;
        Self::insert_children(&txn, order).await?;
        txn.commit().await?;

        debug!(revision = new_revision, "Order saved");
        Ok(new_revision)
    }

    #[instrument(skip(self, shipping_box), fields(box_number = shipping_box.box_number))]
    async fn save_box(
        &self,
        order_id: Uuid,
        shipping_box: &ShippingBox,
        next_box_number: i32,
    ) -> Result<(), ServiceError> {
        let db = self.get_db();
        let txn = db.begin().await?;

        let header = picking_order::Entity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let existing = shipping_box::Entity::find()
            .filter(shipping_box::Column::OrderId.eq(order_id))
            .filter(shipping_box::Column::BoxNumber.eq(shipping_box.box_number))
            .one(&txn)
            .await?;
        if let Some(existing) = existing {
            shipping_box_item::Entity::delete_many()
                .filter(shipping_box_item::Column::BoxId.eq(existing.id))
                .exec(&txn)
                .await?;
            shipping_box::Entity::delete_by_id(existing.id)
                .exec(&txn)
                .await?;
        }
        Self::insert_box(&txn, order_id, Uuid::new_v4(), shipping_box).await?;

        if header.next_box_number < next_box_number {
            picking_order::Entity::update_many()
                .col_expr(picking_order::Column::NextBoxNumber, Expr::value(next_box_number))
                .filter(picking_order::Column::Id.eq(order_id))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(())
    }
}

/// sea-orm backed batch ledger storage
#[derive(Debug, Clone)]
pub struct BatchUsageRepository {
    base: BaseRepository,
}

impl BatchUsageRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

impl Repository for BatchUsageRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[async_trait]
impl BatchUsageStore for BatchUsageRepository {
    async fn find_usage(
        &self,
        batch_number: &str,
        product_id: Uuid,
    ) -> Result<Option<BatchUsage>, ServiceError> {
        Ok(
            batch_usage::Entity::find_by_id((batch_number.to_string(), product_id))
                .one(self.get_db())
                .await?
                .map(usage_from_model),
        )
    }

    async fn find_contribution(
        &self,
        order_id: Uuid,
        batch_number: &str,
        product_id: Uuid,
    ) -> Result<Option<BatchUsageContribution>, ServiceError> {
        Ok(batch_usage_contribution::Entity::find_by_id((
            order_id,
            batch_number.to_string(),
            product_id,
        ))
        .one(self.get_db())
        .await?
        .map(|c| BatchUsageContribution {
            order_id: c.order_id,
            batch_number: c.batch_number,
            product_id: c.product_id,
            quantity: c.quantity,
            weight: Grams::new(c.weight),
            recorded_at: c.recorded_at,
        }))
    }

    #[instrument(skip(self, usage, contribution), fields(batch_number = %usage.batch_number))]
    async fn apply_usage(
        &self,
        usage: &BatchUsage,
        contribution: &BatchUsageContribution,
    ) -> Result<(), ServiceError> {
        let txn = self.get_db().begin().await?;

        batch_usage::Entity::insert(batch_usage::ActiveModel {
            batch_number: Set(usage.batch_number.clone()),
            product_id: Set(usage.product_id),
            total_weight: Set(usage.total_weight.value()),
            used_weight: Set(usage.used_weight.value()),
            orders_count: Set(usage.orders_count),
            first_used: Set(usage.first_used),
            last_used: Set(usage.last_used),
        })
        .on_conflict(
            OnConflict::columns([
                batch_usage::Column::BatchNumber,
                batch_usage::Column::ProductId,
            ])
            .update_columns([
                batch_usage::Column::UsedWeight,
                batch_usage::Column::OrdersCount,
                batch_usage::Column::LastUsed,
            ])
            .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;

        batch_usage_contribution::Entity::insert(batch_usage_contribution::ActiveModel {
            order_id: Set(contribution.order_id),
            batch_number: Set(contribution.batch_number.clone()),
            product_id: Set(contribution.product_id),
            quantity: Set(contribution.quantity),
            weight: Set(contribution.weight.value()),
            recorded_at: Set(contribution.recorded_at),
        })
        .on_conflict(
            OnConflict::columns([
                batch_usage_contribution::Column::OrderId,
                batch_usage_contribution::Column::BatchNumber,
                batch_usage_contribution::Column::ProductId,
            ])
            .update_columns([
                batch_usage_contribution::Column::Quantity,
                batch_usage_contribution::Column::Weight,
                batch_usage_contribution::Column::RecordedAt,
            ])
            .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;

        txn.commit().await?;
        Ok(())
    }

    async fn usages_for_batch(&self, batch_number: &str) -> Result<Vec<BatchUsage>, ServiceError> {
        Ok(batch_usage::Entity::find()
            .filter(batch_usage::Column::BatchNumber.eq(batch_number))
            .order_by_asc(batch_usage::Column::ProductId)
            .all(self.get_db())
            .await?
            .into_iter()
            .map(usage_from_model)
            .collect())
    }
}

fn line_to_active(line: &InventoryLine, position: i32) -> picking_order_line::ActiveModel {
    picking_order_line::ActiveModel {
        id: Set(line.line_id),
        order_id: Set(line.order_id),
        position: Set(position),
        product_id: Set(line.product_id),
        product_name: Set(line.product_name.clone()),
        ordered_quantity: Set(line.ordered_quantity),
        picked_quantity: Set(line.picked_quantity),
        original_quantity: Set(line.original_quantity),
        checked: Set(line.checked),
        batch_number: Set(line.batch_number.clone()),
        picked_weight: Set(line.picked_weight.map(Grams::value)),
        manual_weight: Set(line.manual_weight.map(Grams::value)),
        box_number: Set(line.box_number),
        requires_weight_input: Set(line.requires_weight_input),
        unit_weight: Set(line.unit_weight.map(Grams::value)),
    }
}

fn line_from_model(m: picking_order_line::Model) -> InventoryLine {
    InventoryLine {
        line_id: m.id,
        order_id: m.order_id,
        product_id: m.product_id,
        product_name: m.product_name,
        ordered_quantity: m.ordered_quantity,
        picked_quantity: m.picked_quantity,
        original_quantity: m.original_quantity,
        checked: m.checked,
        batch_number: m.batch_number,
        picked_weight: m.picked_weight.map(Grams::new),
        manual_weight: m.manual_weight.map(Grams::new),
        box_number: m.box_number,
        requires_weight_input: m.requires_weight_input,
        unit_weight: m.unit_weight.map(Grams::new),
    }
}

fn missing_to_active(item: &MissingItem) -> missing_item::ActiveModel {
    missing_item::ActiveModel {
        id: Set(item.id),
        order_id: Set(item.order_id),
        product_id: Set(item.product_id),
        quantity: Set(item.quantity),
        date: Set(item.date),
        status: ActiveValue::Set(item.status.to_string()),
    }
}

fn missing_from_model(m: missing_item::Model) -> Result<MissingItem, ServiceError> {
    let status = MissingItemStatus::from_str(&m.status).map_err(|_| {
        ServiceError::InternalError(format!("Unknown missing item status '{}'", m.status))
    })?;
    Ok(MissingItem {
        id: m.id,
        order_id: m.order_id,
        product_id: m.product_id,
        quantity: m.quantity,
        date: m.date,
        status,
    })
}

fn usage_from_model(m: batch_usage::Model) -> BatchUsage {
    BatchUsage {
        batch_number: m.batch_number,
        product_id: m.product_id,
        total_weight: Grams::new(m.total_weight),
        used_weight: Grams::new(m.used_weight),
        orders_count: m.orders_count,
        first_used: m.first_used,
        last_used: m.last_used,
    }
}
