mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use common::{MemoryHarness, OrderBuilder};
use order_picking::{
    config::PickingConfig,
    errors::{BoxRejection, ServiceError},
    events::Event,
    models::{BoxState, Grams, MissingItemDelta, OrderSnapshot, OrderStatus, ShippingBox},
    repositories::{InMemoryBatchUsageStore, InMemoryOrderStore, OrderStore},
    services::{BatchUsageLedger, BoxSaveOutcome, PickingService},
};
use rstest::rstest;
use sea_orm::DbErr;
use uuid::Uuid;

#[tokio::test]
async fn single_line_order_completes_without_boxes() {
    let mut h = MemoryHarness::new(PickingConfig::default());
    let order_id = h.seed(OrderBuilder::new("SO-A").line("Tomme", 10).build());

    let mut session = h.service.open_session(order_id).await.unwrap();
    let line_id = session.lines()[0].line_id;
    session
        .check_line(line_id, 10, Some("T-1".into()), None)
        .unwrap();

    let status = h.service.save_order(&mut session).await.unwrap();
    assert_eq!(status, OrderStatus::Completed);
    assert!(session.missing_items().is_empty());

    let stored = h.store.get(order_id).unwrap();
    assert_eq!(stored.status, OrderStatus::Completed);
    assert!(stored.is_picked);
    assert!(!stored.picking_in_progress);

    let events = h.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::OrderCompleted { order_id: id, .. } if *id == order_id)));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::BatchUsageUpdated(u) if u.batch_number == "T-1")));
}

#[tokio::test]
async fn auto_split_into_three_boxes_gives_four_three_three() {
    let h = MemoryHarness::new(PickingConfig::default());
    let order_id = h.seed(OrderBuilder::new("SO-B").line("Tomme", 10).build());

    let mut session = h.service.open_session(order_id).await.unwrap();
    let product = session.lines()[0].product_id;
    session.auto_split(product, 3).unwrap();

    let quantities: Vec<i32> = session
        .boxes()
        .iter()
        .map(|b| b.quantity_of(product))
        .collect();
    assert_eq!(quantities, vec![4, 3, 3]);
    assert!(session.unassigned().is_empty());
}

#[tokio::test]
async fn box_with_unbatched_item_is_not_saved() {
    let h = MemoryHarness::new(PickingConfig::default());
    let order_id = h.seed(
        OrderBuilder::new("SO-C")
            .line("Comté", 2)
            .line("Morbier", 1)
            .build(),
    );

    let mut session = h.service.open_session(order_id).await.unwrap();
    let lines = session.lines().to_vec();
    for line in &lines {
        session
            .check_line(line.line_id, line.ordered_quantity, None, None)
            .unwrap();
    }
    let b = session.add_box().unwrap();
    session.assign_whole(lines[0].product_id, b, 2).unwrap();
    session.assign_whole(lines[1].product_id, b, 1).unwrap();
    session
        .set_item_batch(b, lines[0].product_id, Some("C-9".into()))
        .unwrap();

    let err = h.service.save_box(&mut session, b).await.unwrap_err();
    assert_eq!(
        err.box_rejections().to_vec(),
        vec![BoxRejection::MissingBatchNumbers]
    );
    assert!(err.to_string().contains("missing batch numbers"));
    assert!(!session.order().shipping_box(b).unwrap().saved);
    assert!(h.store.get(order_id).unwrap().boxes.is_empty());
}

#[tokio::test]
async fn shortage_corrected_to_zero_removes_the_record() {
    let mut h = MemoryHarness::new(PickingConfig::default());
    let order_id = h.seed(OrderBuilder::new("SO-D").line("Reblochon", 5).build());

    let mut session = h.service.open_session(order_id).await.unwrap();
    let product = session.lines()[0].product_id;
    session.missing_ledger().unwrap().report(product, 2).unwrap();
    assert_eq!(session.missing_items().len(), 1);

    session.missing_ledger().unwrap().report(product, 0).unwrap();
    assert!(session.missing_items().is_empty());

    h.service.save_order(&mut session).await.unwrap();
    assert!(h.store.get(order_id).unwrap().missing_items.is_empty());

    let deltas: Vec<MissingItemDelta> = h
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            Event::MissingItemChanged(d) => Some(d),
            _ => None,
        })
        .collect();
    assert_matches!(deltas.as_slice(), [MissingItemDelta::Reported(_), MissingItemDelta::Resolved { .. }]);
}

#[rstest]
#[case(&[true, true, false], 1, OrderStatus::PartiallyPicked)]
#[case(&[true, true, true], 1, OrderStatus::MissingItems)]
#[case(&[true, true, true], 0, OrderStatus::Completed)]
#[case(&[false, false, false], 0, OrderStatus::Picking)]
#[tokio::test]
async fn saved_status_follows_lines_and_shortages(
    #[case] checked: &[bool],
    #[case] short: i32,
    #[case] expected: OrderStatus,
) {
    let h = MemoryHarness::new(PickingConfig::default());
    let order_id = h.seed(
        OrderBuilder::new("SO-S")
            .line("A", 4)
            .line("B", 4)
            .line("C", 4)
            .batch_number("ORD-1")
            .build(),
    );
    let mut session = h.service.open_session(order_id).await.unwrap();
    let lines = session.lines().to_vec();
    for (idx, (line, checked)) in lines.iter().zip(checked).enumerate() {
        if *checked {
            let picked = if idx == 0 { 4 - short } else { 4 };
            session.check_line(line.line_id, picked, None, None).unwrap();
        }
    }

    assert_eq!(h.service.save_order(&mut session).await.unwrap(), expected);
}

#[tokio::test]
async fn boxes_are_labelled_in_sequence() {
    let mut h = MemoryHarness::new(PickingConfig::default());
    let order_id = h.seed(OrderBuilder::new("SO-L").unit_weight_line("Gruyère", 4, 250).build());

    let mut session = h.service.open_session(order_id).await.unwrap();
    let line = session.lines()[0].clone();
    session
        .check_line(line.line_id, 4, Some("G-1".into()), None)
        .unwrap();
    session.auto_split(line.product_id, 2).unwrap();
    session.set_box_batch(1, Some("G-1".into())).unwrap();

    assert_matches!(
        h.service.print_box_label(&mut session, 2).await,
        Err(ServiceError::BoxNotReady { reasons, .. })
            if reasons.contains(&BoxRejection::Locked { waiting_on: 1 })
    );
    assert_matches!(
        session.set_box_batch(2, Some("G-1".into())),
        Err(ServiceError::BoxNotReady { reasons, .. })
            if reasons == vec![BoxRejection::Locked { waiting_on: 1 }]
    );

    assert_eq!(
        h.service.save_box(&mut session, 1).await.unwrap(),
        BoxSaveOutcome::Saved
    );
    let label = h.service.print_box_label(&mut session, 1).await.unwrap();
    assert_eq!(label.items.len(), 1);
    assert_eq!(label.items[0].quantity, 2);
    assert_eq!(label.total_weight, Grams::new(500));
    assert_eq!(label.next_box, Some(2));
    assert_eq!(session.box_state(1).unwrap(), BoxState::LabelPrinted);

    session.set_box_batch(2, Some("G-1".into())).unwrap();
    h.service.save_box(&mut session, 2).await.unwrap();
    h.service.print_box_label(&mut session, 2).await.unwrap();
    assert_eq!(session.next_focus_box(), None);

    // Printing folds cumulative totals, so the ledger holds the whole order once
    let usage = h
        .service
        .ledger()
        .usage("G-1", line.product_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(usage.used_weight, Grams::new(1_000));
    assert_eq!(usage.orders_count, 1);

    // Completion records the same totals again without double counting
    h.service.save_order(&mut session).await.unwrap();
    let usage = h
        .service
        .ledger()
        .usage("G-1", line.product_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(usage.used_weight, Grams::new(1_000));
    assert_eq!(usage.orders_count, 1);

    let printed = h
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, Event::BoxLabelPrinted(_)))
        .count();
    assert_eq!(printed, 2);
}

#[tokio::test]
async fn saving_an_unchanged_box_twice_is_a_no_op() {
    let mut h = MemoryHarness::new(PickingConfig::default());
    let order_id = h.seed(OrderBuilder::new("SO-I").line("Cantal", 1).build());
    let mut session = h.service.open_session(order_id).await.unwrap();
    let line = session.lines()[0].clone();
    session
        .check_line(line.line_id, 1, Some("K-1".into()), None)
        .unwrap();
    let b = session.add_box().unwrap();
    session.assign_whole(line.product_id, b, 1).unwrap();

    assert_eq!(
        h.service.save_box(&mut session, b).await.unwrap(),
        BoxSaveOutcome::Saved
    );
    h.drain_events();
    let stored = h.store.get(order_id).unwrap();

    assert_eq!(
        h.service.save_box(&mut session, b).await.unwrap(),
        BoxSaveOutcome::Unchanged
    );
    assert_eq!(h.store.get(order_id).unwrap(), stored);
    assert!(h.drain_events().is_empty());
}

#[tokio::test]
async fn completed_order_rejects_further_edits() {
    let h = MemoryHarness::new(PickingConfig::default());
    let order_id = h.seed(OrderBuilder::new("SO-F").line("Beaufort", 1).build());
    let mut session = h.service.open_session(order_id).await.unwrap();
    let line = session.lines()[0].clone();
    session.check_line(line.line_id, 1, None, None).unwrap();
    h.service.save_order(&mut session).await.unwrap();

    assert_matches!(session.add_box(), Err(ServiceError::InvalidOperation(_)));
    assert_matches!(
        session.uncheck_line(line.line_id),
        Err(ServiceError::InvalidOperation(_))
    );
    assert_matches!(
        session.missing_ledger().map(|_| ()),
        Err(ServiceError::InvalidOperation(_))
    );
    assert!(session.missing_items().is_empty());
    assert!(session.pending_missing_deltas().is_empty());
}

#[tokio::test]
async fn unchecked_line_blocks_resaving_its_box() {
    let h = MemoryHarness::new(PickingConfig::default());
    let order_id = h.seed(OrderBuilder::new("SO-U").line("Salers", 2).build());
    let mut session = h.service.open_session(order_id).await.unwrap();
    let line = session.lines()[0].clone();
    session.check_line(line.line_id, 2, None, None).unwrap();
    let b = session.add_box().unwrap();
    session.assign_whole(line.product_id, b, 2).unwrap();
    session.set_box_batch(b, Some("SA-1".into())).unwrap();
    assert_eq!(
        h.service.save_box(&mut session, b).await.unwrap(),
        BoxSaveOutcome::Saved
    );

    session.uncheck_line(line.line_id).unwrap();
    assert_eq!(session.box_state(b).unwrap(), BoxState::InProgress);
    let err = h.service.save_box(&mut session, b).await.unwrap_err();
    assert_eq!(
        err.box_rejections().to_vec(),
        vec![BoxRejection::UncheckedItems]
    );
    assert_matches!(
        h.service.print_box_label(&mut session, b).await,
        Err(ServiceError::BoxNotReady { .. })
    );
}

#[tokio::test]
async fn stale_session_cannot_overwrite_newer_save() {
    let h = MemoryHarness::new(PickingConfig::default());
    let order_id = h.seed(OrderBuilder::new("SO-R").line("Abondance", 3).build());

    let mut first = h.service.open_session(order_id).await.unwrap();
    let mut second = h.service.open_session(order_id).await.unwrap();
    let line_id = first.lines()[0].line_id;

    first.check_line(line_id, 3, None, None).unwrap();
    h.service.save_order(&mut first).await.unwrap();

    second.add_box().unwrap();
    let err = h.service.save_order(&mut second).await.unwrap_err();
    assert_matches!(err, ServiceError::ConcurrentModification(id) if id == order_id);
    assert!(!err.is_recoverable());
    assert_eq!(second.boxes().len(), 1);
}

/// Order store whose writes always fail.
struct FailingOrderStore {
    inner: InMemoryOrderStore,
}

#[async_trait]
impl OrderStore for FailingOrderStore {
    async fn load_order(&self, order_id: Uuid) -> Result<OrderSnapshot, ServiceError> {
        self.inner.load_order(order_id).await
    }

    async fn save_order(
        &self,
        _order: &OrderSnapshot,
        _expected_revision: i32,
    ) -> Result<i32, ServiceError> {
        Err(ServiceError::DatabaseError(DbErr::Custom("disk full".into())))
    }

    async fn save_box(
        &self,
        _order_id: Uuid,
        _shipping_box: &ShippingBox,
        _next_box_number: i32,
    ) -> Result<(), ServiceError> {
        Err(ServiceError::DatabaseError(DbErr::Custom("disk full".into())))
    }
}

#[tokio::test]
async fn persistence_failure_keeps_working_copy() {
    let inner = InMemoryOrderStore::new();
    let mut order = OrderBuilder::new("SO-P").line("Salers", 2).build();
    order.status = OrderStatus::Picking;
    let order_id = order.order_id;
    inner.insert(order);

    let ledger = BatchUsageLedger::new(Arc::new(InMemoryBatchUsageStore::new()), true);
    let service = PickingService::new(
        Arc::new(FailingOrderStore { inner }),
        Arc::new(ledger),
        PickingConfig::default(),
    );

    let mut session = service.open_session(order_id).await.unwrap();
    let line = session.lines()[0].clone();
    session
        .check_line(line.line_id, 1, Some("S-1".into()), None)
        .unwrap();
    let before = session.order().clone();

    assert_matches!(
        service.save_order(&mut session).await,
        Err(ServiceError::DatabaseError(_))
    );
    assert_eq!(session.order(), &before);
    assert_eq!(session.status(), OrderStatus::Picking);
    assert_eq!(session.pending_missing_deltas().len(), 1);

    let b = session.add_box().unwrap();
    session.assign_whole(line.product_id, b, 2).unwrap();
    session.set_box_batch(b, Some("S-1".into())).unwrap();
    assert_matches!(
        service.save_box(&mut session, b).await,
        Err(ServiceError::DatabaseError(_))
    );
    assert!(!session.order().shipping_box(b).unwrap().saved);
}

#[tokio::test]
async fn orders_are_processed_in_parallel_without_interference() {
    let store = Arc::new(InMemoryOrderStore::new());
    let ledger = BatchUsageLedger::new(Arc::new(InMemoryBatchUsageStore::new()), true);
    let service = Arc::new(PickingService::new(
        store.clone(),
        Arc::new(ledger),
        PickingConfig::default(),
    ));

    let mut ids = Vec::new();
    for n in 0..8 {
        let order = OrderBuilder::new(&format!("SO-{}", n))
            .unit_weight_line("Ossau", 2, 100)
            .batch_number("SHARED")
            .build();
        ids.push(order.order_id);
        store.insert(order);
    }

    let mut tasks = Vec::new();
    for order_id in ids {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            let mut session = service.open_session(order_id).await?;
            let line_id = session.lines()[0].line_id;
            session.check_line(line_id, 2, None, None)?;
            service.save_order(&mut session).await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), OrderStatus::Completed);
    }

    let usages = service.ledger().usages_for_batch("SHARED").await.unwrap();
    assert_eq!(usages.len(), 8);
    assert!(usages.iter().all(|u| u.used_weight == Grams::new(200)));
    // Per-order locks are released once no operation is in flight
    assert_eq!(service.locked_orders(), 0);
}
