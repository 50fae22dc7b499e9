#![allow(dead_code)]

use std::sync::Arc;

use order_picking::{
    config::PickingConfig,
    db::{self, DbConfig, DbPool},
    events::{Event, EventSender},
    models::{Grams, InventoryLine, OrderSnapshot},
    repositories::{
        BatchUsageRepository, InMemoryBatchUsageStore, InMemoryOrderStore, OrderRepository,
    },
    services::{BatchUsageLedger, PickingService},
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Builder for order fixtures.
pub struct OrderBuilder {
    order: OrderSnapshot,
}

impl OrderBuilder {
    pub fn new(order_number: &str) -> Self {
        Self {
            order: OrderSnapshot::new(Uuid::new_v4(), order_number, Vec::new()),
        }
    }

    pub fn line(mut self, name: &str, quantity: i32) -> Self {
        let line = InventoryLine::new(self.order.order_id, Uuid::new_v4(), name, quantity);
        self.order.lines.push(line);
        self
    }

    pub fn weighed_line(mut self, name: &str, quantity: i32) -> Self {
        let line = InventoryLine::new(self.order.order_id, Uuid::new_v4(), name, quantity).weighed();
        self.order.lines.push(line);
        self
    }

    pub fn unit_weight_line(mut self, name: &str, quantity: i32, grams: i64) -> Self {
        let line = InventoryLine::new(self.order.order_id, Uuid::new_v4(), name, quantity)
            .with_unit_weight(Grams::new(grams));
        self.order.lines.push(line);
        self
    }

    pub fn batch_number(mut self, batch: &str) -> Self {
        self.order.batch_number = Some(batch.to_string());
        self
    }

    pub fn build(self) -> OrderSnapshot {
        self.order
    }
}

/// Picking service over in-memory stores, with every event captured.
pub struct MemoryHarness {
    pub store: Arc<InMemoryOrderStore>,
    pub service: PickingService,
    pub events: mpsc::Receiver<Event>,
}

impl MemoryHarness {
    pub fn new(settings: PickingConfig) -> Self {
        let store = Arc::new(InMemoryOrderStore::new());
        let (sender, events) = EventSender::channel(1024);
        let sender = Arc::new(sender);
        let ledger = BatchUsageLedger::new(
            Arc::new(InMemoryBatchUsageStore::new()),
            settings.idempotent_batch_usage,
        )
        .with_event_sender(sender.clone());
        let service = PickingService::new(store.clone(), Arc::new(ledger), settings)
            .with_event_sender(sender);
        Self {
            store,
            service,
            events,
        }
    }

    pub fn seed(&self, order: OrderSnapshot) -> Uuid {
        let id = order.order_id;
        self.store.insert(order);
        id
    }

    /// Events emitted so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Migrated SQLite database in a temporary directory.
pub struct SqliteHarness {
    pub db: Arc<DbPool>,
    pub orders: OrderRepository,
    pub usages: BatchUsageRepository,
    _dir: TempDir,
}

impl SqliteHarness {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("picking_test.db");
        let config = DbConfig {
            url: format!("sqlite://{}?mode=rwc", path.display()),
            max_connections: 1,
            ..Default::default()
        };
        let pool = db::establish_connection_with_config(&config)
            .await
            .expect("connect sqlite");
        db::run_migrations(&pool).await.expect("migrate");
        let db = Arc::new(pool);
        Self {
            orders: OrderRepository::new(db.clone()),
            usages: BatchUsageRepository::new(db.clone()),
            db,
            _dir: dir,
        }
    }

    pub fn service(&self, settings: PickingConfig) -> PickingService {
        let ledger = BatchUsageLedger::new(
            Arc::new(self.usages.clone()),
            settings.idempotent_batch_usage,
        );
        PickingService::new(Arc::new(self.orders.clone()), Arc::new(ledger), settings)
    }
}
