//! Integration tests for the engine over the in-memory store.
//!
//! Tests: Engine → Workflow → StockLedger → MovementLog → Store
//!
//! Verifies:
//! - Purchase, reception and sale flows keep cached stock equal to the log
//! - Reversals are exact and idempotent
//! - Failed operations leave no trace
//! - Concurrent writers to one product never lose an update
//! - Purchases keep supplier price links current

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use stockbook_core::{
        DomainError, ProductId, SupplierId, TransactionalStore, run_in_transaction,
    };
    use stockbook_inventory::{
        InventoryStore, MovementReason, MovementReference, Product, Tracking,
    };
    use stockbook_purchasing::{
        NewPurchaseLine, PurchaseOrderStatus, ReceiveOptions, ReceptionHeader, ReceptionLineInput,
        Supplier,
    };
    use stockbook_sales::{Customer, NewSaleLine, SaleOrderStatus};

    use crate::config::EngineConfig;
    use crate::engine::InventoryEngine;
    use crate::memory::InMemoryStore;

    type Engine = InventoryEngine<InMemoryStore>;

    fn engine_with(config: EngineConfig) -> Engine {
        stockbook_observability::init();
        InventoryEngine::new(InMemoryStore::from_config(&config), &config)
    }

    fn engine() -> Engine {
        engine_with(EngineConfig::default())
    }

    fn product(engine: &Engine, sku: &str, opening: i64) -> Product {
        let product = engine.add_product(sku, sku).unwrap();
        if opening > 0 {
            engine
                .record_opening_balance(product.id(), opening, None)
                .unwrap();
        }
        product
    }

    fn supplier(engine: &Engine) -> Supplier {
        engine.add_supplier("S1").unwrap()
    }

    fn customer(engine: &Engine) -> Customer {
        engine.add_customer("C1").unwrap()
    }

    fn buy(product_id: ProductId, qty: i64) -> NewPurchaseLine {
        NewPurchaseLine {
            product_id,
            ordered_qty: qty,
            unit_cost: 50,
        }
    }

    fn sell(product_id: ProductId, qty: i64) -> NewSaleLine {
        NewSaleLine {
            product_id,
            quantity: qty,
            unit_price: 100,
        }
    }

    fn assert_consistent(engine: &Engine, product_id: ProductId) {
        let report = engine.reconcile(product_id).unwrap();
        assert!(report.is_consistent(), "drift on {product_id}: {report:?}");
    }

    #[test]
    fn partial_then_final_reception_completes_the_order() {
        let engine = engine();
        let a = product(&engine, "A", 0);
        let s1 = supplier(&engine);
        let po = engine
            .create_purchase_order(s1.id, vec![buy(a.id(), 10)], PurchaseOrderStatus::Pending, false)
            .unwrap();

        engine
            .receive(
                po.id(),
                ReceptionHeader::default(),
                vec![ReceptionLineInput::new(1, 6)],
                ReceiveOptions::default(),
            )
            .unwrap();
        assert_eq!(
            engine.purchase_order(po.id()).unwrap().status(),
            PurchaseOrderStatus::Incomplete
        );
        assert_eq!(engine.current_stock(a.id()).unwrap(), 6);

        engine
            .receive(
                po.id(),
                ReceptionHeader::default(),
                vec![ReceptionLineInput::new(1, 4)],
                ReceiveOptions::default(),
            )
            .unwrap();
        let po = engine.purchase_order(po.id()).unwrap();
        assert_eq!(po.status(), PurchaseOrderStatus::Completed);
        assert_eq!(po.lines()[0].received_qty, 10);
        assert_eq!(engine.current_stock(a.id()).unwrap(), 10);
        assert_eq!(engine.receptions_for(po.id()).unwrap().len(), 2);
        assert_consistent(&engine, a.id());
    }

    #[test]
    fn paid_sale_takes_stock_once_and_cancel_restores_it() {
        let engine = engine();
        let b = product(&engine, "B", 20);
        let c1 = customer(&engine);

        let so = engine
            .create_sale_order(c1.id, vec![sell(b.id(), 5)], SaleOrderStatus::Reservada, true)
            .unwrap();
        assert_eq!(so.total(), 500);
        assert_eq!(engine.current_stock(b.id()).unwrap(), 20);

        engine
            .update_sale_status(so.id(), SaleOrderStatus::Pagada)
            .unwrap();
        assert_eq!(engine.current_stock(b.id()).unwrap(), 15);
        engine
            .update_sale_status(so.id(), SaleOrderStatus::Pagada)
            .unwrap();
        assert_eq!(engine.current_stock(b.id()).unwrap(), 15);

        engine.cancel_sale_order(so.id(), true).unwrap();
        assert_eq!(engine.current_stock(b.id()).unwrap(), 20);
        let again = engine.cancel_sale_order(so.id(), true).unwrap();
        assert_eq!(again.status(), SaleOrderStatus::Cancelada);
        assert_eq!(engine.current_stock(b.id()).unwrap(), 20);
        assert_consistent(&engine, b.id());
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let engine = engine();
        let c = product(&engine, "C", 0);
        let err = engine.set_thresholds(c.id(), 5, 3).unwrap_err();
        assert!(matches!(err, DomainError::Threshold(_)));
        let current = engine.thresholds(c.id()).unwrap();
        assert_eq!((current.min_value, current.max_value), (0, 0));
    }

    #[test]
    fn lot_and_serial_together_reject_the_whole_reception() {
        let engine = engine();
        let a = product(&engine, "A", 0);
        let s1 = supplier(&engine);
        let po = engine
            .create_purchase_order(s1.id, vec![buy(a.id(), 10)], PurchaseOrderStatus::Pending, false)
            .unwrap();

        let mut line = ReceptionLineInput::new(1, 3);
        line.lot = Some("L1".to_string());
        line.serial = Some("S1".to_string());
        let err = engine
            .receive(po.id(), ReceptionHeader::default(), vec![line], ReceiveOptions::default())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        assert_eq!(engine.current_stock(a.id()).unwrap(), 0);
        let po = engine.purchase_order(po.id()).unwrap();
        assert_eq!(po.lines()[0].received_qty, 0);
        assert_eq!(po.status(), PurchaseOrderStatus::Pending);
        assert!(engine.receptions_for(po.id()).unwrap().is_empty());
    }

    #[test]
    fn over_receipt_names_the_line_and_changes_nothing() {
        let engine = engine();
        let a = product(&engine, "A", 0);
        let b = product(&engine, "B", 0);
        let s1 = supplier(&engine);
        let po = engine
            .create_purchase_order(
                s1.id,
                vec![buy(a.id(), 10), buy(b.id(), 2)],
                PurchaseOrderStatus::Pending,
                false,
            )
            .unwrap();
        let before = engine.store().movement_count();

        let err = engine
            .receive(
                po.id(),
                ReceptionHeader::default(),
                vec![ReceptionLineInput::new(1, 4), ReceptionLineInput::new(2, 3)],
                ReceiveOptions::default(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::OverReceipt {
                order_id: po.id(),
                line_no: 2,
                product_id: b.id(),
                requested: 3,
                remaining: 2,
            }
        );
        let po = engine.purchase_order(po.id()).unwrap();
        assert!(po.lines().iter().all(|l| l.received_qty == 0));
        assert_eq!(engine.current_stock(a.id()).unwrap(), 0);
        assert_eq!(engine.store().movement_count(), before);
    }

    #[test]
    fn resubmitting_a_full_line_is_rejected() {
        let engine = engine();
        let a = product(&engine, "A", 0);
        let b = product(&engine, "B", 0);
        let s1 = supplier(&engine);
        let po = engine
            .create_purchase_order(
                s1.id,
                vec![buy(a.id(), 4), buy(b.id(), 4)],
                PurchaseOrderStatus::Pending,
                false,
            )
            .unwrap();
        let payload = vec![ReceptionLineInput::new(1, 4)];
        engine
            .receive(po.id(), ReceptionHeader::default(), payload.clone(), ReceiveOptions::default())
            .unwrap();

        let err = engine
            .receive(po.id(), ReceptionHeader::default(), payload, ReceiveOptions::default())
            .unwrap_err();
        assert!(matches!(err, DomainError::OverReceipt { remaining: 0, .. }));
        assert_eq!(engine.current_stock(a.id()).unwrap(), 4);

        engine
            .receive(
                po.id(),
                ReceptionHeader::default(),
                vec![ReceptionLineInput::new(2, 4)],
                ReceiveOptions::default(),
            )
            .unwrap();
        let err = engine
            .receive(
                po.id(),
                ReceptionHeader::default(),
                vec![ReceptionLineInput::new(2, 4)],
                ReceiveOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState { .. }));
        assert_eq!(engine.current_stock(b.id()).unwrap(), 4);
    }

    #[test]
    fn cancelling_a_partly_received_order_reverses_exactly_what_arrived() {
        let engine = engine();
        let a = product(&engine, "A", 7);
        let s1 = supplier(&engine);
        let po = engine
            .create_purchase_order(s1.id, vec![buy(a.id(), 10)], PurchaseOrderStatus::Pending, false)
            .unwrap();
        engine
            .receive(
                po.id(),
                ReceptionHeader::default(),
                vec![ReceptionLineInput::new(1, 6)],
                ReceiveOptions::default(),
            )
            .unwrap();
        assert_eq!(engine.current_stock(a.id()).unwrap(), 13);

        engine.cancel_purchase_order(po.id(), true).unwrap();
        assert_eq!(engine.current_stock(a.id()).unwrap(), 7);
        engine.cancel_purchase_order(po.id(), true).unwrap();
        assert_eq!(engine.current_stock(a.id()).unwrap(), 7);

        let err = engine.delete_purchase_order(po.id(), true).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState { .. }));
        assert_consistent(&engine, a.id());
    }

    #[test]
    fn buy_now_order_can_be_cancelled_with_reversal() {
        let engine = engine();
        let a = product(&engine, "A", 0);
        let s1 = supplier(&engine);
        let po = engine
            .create_purchase_order(s1.id, vec![buy(a.id(), 10)], PurchaseOrderStatus::Completed, true)
            .unwrap();
        assert_eq!(po.lines()[0].received_qty, 10);
        assert_eq!(engine.current_stock(a.id()).unwrap(), 10);

        let history = engine.history(a.id()).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, MovementReason::PurchaseCreation);

        let cancelled = engine.cancel_purchase_order(po.id(), true).unwrap();
        assert_eq!(cancelled.status(), PurchaseOrderStatus::Cancelled);
        assert_eq!(engine.current_stock(a.id()).unwrap(), 0);
        assert_eq!(engine.history(a.id()).unwrap().len(), 2);
    }

    #[test]
    fn delete_without_revert_keeps_stock() {
        let engine = engine();
        let a = product(&engine, "A", 0);
        let s1 = supplier(&engine);
        let po = engine
            .create_purchase_order(s1.id, vec![buy(a.id(), 3)], PurchaseOrderStatus::Completed, true)
            .unwrap();
        let deleted = engine.delete_purchase_order(po.id(), false).unwrap();
        assert_eq!(deleted.status(), PurchaseOrderStatus::Eliminada);
        assert_eq!(engine.current_stock(a.id()).unwrap(), 3);
        assert_eq!(
            engine
                .purchase_orders(Some(PurchaseOrderStatus::Eliminada))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn failed_sale_leaves_no_trace() {
        let engine = engine();
        let a = product(&engine, "A", 10);
        let b = product(&engine, "B", 1);
        let c1 = customer(&engine);
        let before = engine.store().movement_count();

        let err = engine
            .create_sale_order(
                c1.id,
                vec![sell(a.id(), 4), sell(b.id(), 2)],
                SaleOrderStatus::Pagada,
                true,
            )
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                product_id: b.id(),
                available: 1,
                requested: 2,
            }
        );
        assert_eq!(engine.current_stock(a.id()).unwrap(), 10);
        assert_eq!(engine.current_stock(b.id()).unwrap(), 1);
        assert!(engine.sale_orders(None).unwrap().is_empty());
        assert_eq!(engine.store().movement_count(), before);
    }

    #[test]
    fn paid_back_to_reserved_releases_stock() {
        let engine = engine();
        let b = product(&engine, "B", 8);
        let c1 = customer(&engine);
        let so = engine
            .create_sale_order(c1.id, vec![sell(b.id(), 3)], SaleOrderStatus::Pagada, true)
            .unwrap();
        assert_eq!(engine.current_stock(b.id()).unwrap(), 5);

        engine
            .update_sale_status(so.id(), SaleOrderStatus::Reservada)
            .unwrap();
        assert_eq!(engine.current_stock(b.id()).unwrap(), 8);
        engine
            .update_sale_status(so.id(), SaleOrderStatus::Pagada)
            .unwrap();
        assert_eq!(engine.current_stock(b.id()).unwrap(), 5);

        engine.delete_sale_order(so.id(), true).unwrap();
        assert_eq!(engine.current_stock(b.id()).unwrap(), 8);
        let err = engine
            .update_sale_status(so.id(), SaleOrderStatus::Pagada)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState { .. }));
        let err = engine.cancel_sale_order(so.id(), true).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState { .. }));
        assert_consistent(&engine, b.id());
    }

    #[test]
    fn backorder_flag_lets_sales_go_negative() {
        let strict = engine();
        let p = product(&strict, "P", 2);
        let c1 = customer(&strict);
        let err = strict
            .create_sale_order(c1.id, vec![sell(p.id(), 5)], SaleOrderStatus::Pagada, true)
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { .. }));

        let lenient = engine_with(EngineConfig {
            allow_backorder: true,
            ..EngineConfig::default()
        });
        assert!(lenient.sales_policy().allow_backorder);
        let p = product(&lenient, "P", 2);
        let c1 = customer(&lenient);
        let so = lenient
            .create_sale_order(c1.id, vec![sell(p.id(), 5)], SaleOrderStatus::Pagada, true)
            .unwrap();
        assert_eq!(lenient.current_stock(p.id()).unwrap(), -3);
        lenient.cancel_sale_order(so.id(), true).unwrap();
        assert_eq!(lenient.current_stock(p.id()).unwrap(), 2);
    }

    #[test]
    fn reception_tracking_lands_in_the_history() {
        let engine = engine();
        let a = product(&engine, "A", 0);
        let dock = engine.add_location("Dock", None).unwrap();
        let s1 = supplier(&engine);
        let po = engine
            .create_purchase_order(s1.id, vec![buy(a.id(), 5)], PurchaseOrderStatus::Pending, false)
            .unwrap();

        let mut line = ReceptionLineInput::new(1, 5);
        line.location_id = Some(dock.id);
        line.lot = Some(" L7 ".to_string());
        line.serial = Some("  ".to_string());
        let reception = engine
            .receive(
                po.id(),
                ReceptionHeader {
                    document_type: Some("invoice".to_string()),
                    document_number: Some("F-001".to_string()),
                    document_date: None,
                },
                vec![line],
                ReceiveOptions::default(),
            )
            .unwrap();
        assert_eq!(engine.reception(reception.id).unwrap(), reception);

        let history = engine.history(a.id()).unwrap();
        assert_eq!(history.len(), 1);
        let movement = &history[0];
        assert_eq!(movement.reason, MovementReason::PurchaseReceipt);
        assert_eq!(movement.location_id, Some(dock.id));
        assert_eq!(movement.tracking.lot.as_deref(), Some("L7"));
        assert_eq!(movement.tracking.serial, None);
        assert_eq!(
            movement.reference,
            MovementReference::Reception {
                purchase_order_id: po.id(),
                reception_id: reception.id,
            }
        );
    }

    #[test]
    fn reception_without_stock_or_status_only_counts_quantities() {
        let engine = engine();
        let a = product(&engine, "A", 0);
        let s1 = supplier(&engine);
        let po = engine
            .create_purchase_order(s1.id, vec![buy(a.id(), 5)], PurchaseOrderStatus::Pending, false)
            .unwrap();
        engine
            .receive(
                po.id(),
                ReceptionHeader::default(),
                vec![ReceptionLineInput::new(1, 5)],
                ReceiveOptions {
                    apply_to_stock: false,
                    update_status: false,
                },
            )
            .unwrap();
        let po = engine.purchase_order(po.id()).unwrap();
        assert_eq!(po.status(), PurchaseOrderStatus::Pending);
        assert!(po.is_fully_received());
        assert_eq!(engine.current_stock(a.id()).unwrap(), 0);
    }

    #[test]
    fn overview_flags_products_outside_their_bounds() {
        let engine = engine();
        let low = product(&engine, "LOW", 1);
        let high = product(&engine, "HIGH", 50);
        engine.set_thresholds(low.id(), 5, 0).unwrap();
        engine.set_thresholds(high.id(), 0, 10).unwrap();

        let rows = engine.overview().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].product.sku(), "HIGH");
        assert!(rows[0].flags.above_max);
        assert!(rows[1].flags.below_min);

        engine.clear_thresholds(low.id()).unwrap();
        assert!(!engine.evaluate(low.id()).unwrap().below_min);
    }

    #[test]
    fn reconcile_all_repairs_a_drifted_cache() {
        let engine = engine();
        let a = product(&engine, "A", 4);
        let b = product(&engine, "B", 2);
        run_in_transaction(engine.store(), |tx| tx.store_stock(a.id(), 99)).unwrap();

        let drifted = engine.reconcile_all().unwrap();
        assert_eq!(drifted.len(), 1);
        assert_eq!(drifted[0].product_id, a.id());
        assert_eq!(drifted[0].drift, 95);
        assert_eq!(engine.current_stock(a.id()).unwrap(), 4);
        assert_eq!(engine.current_stock(b.id()).unwrap(), 2);
        assert!(engine.reconcile_all().unwrap().is_empty());
    }

    #[test]
    fn concurrent_entries_on_one_product_never_lose_an_update() {
        let engine = Arc::new(engine());
        let a = product(&engine, "A", 0);

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                let id = a.id();
                thread::spawn(move || {
                    for _ in 0..50 {
                        engine
                            .register_entry(id, 1, None, Tracking::default(), None)
                            .unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(engine.current_stock(a.id()).unwrap(), 200);
        assert_eq!(engine.history(a.id()).unwrap().len(), 200);
        assert_consistent(&engine, a.id());
    }

    #[test]
    fn concurrent_sales_cannot_oversell() {
        let engine = Arc::new(engine());
        let b = product(&engine, "B", 10);
        let c1 = customer(&engine);

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                let (product_id, customer_id) = (b.id(), c1.id);
                thread::spawn(move || {
                    engine
                        .create_sale_order(
                            customer_id,
                            vec![sell(product_id, 3)],
                            SaleOrderStatus::Pagada,
                            true,
                        )
                        .is_ok()
                })
            })
            .collect();
        let sold = workers
            .into_iter()
            .map(|w| w.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(sold, 3);
        assert_eq!(engine.current_stock(b.id()).unwrap(), 1);
        assert_eq!(engine.sale_orders(Some(SaleOrderStatus::Pagada)).unwrap().len(), 3);
    }

    #[test]
    fn uncommitted_transaction_is_invisible_to_the_engine() {
        let engine = engine();
        let a = product(&engine, "A", 5);
        let mut tx = engine.store().begin().unwrap();
        tx.store_stock(a.id(), 42).unwrap();
        assert_eq!(tx.product(a.id()).unwrap().unwrap().stock_actual(), 42);
        drop(tx);
        assert_eq!(engine.current_stock(a.id()).unwrap(), 5);
    }

    #[test]
    fn unknown_references_are_not_found() {
        let engine = engine();
        let s1 = supplier(&engine);
        let err = engine
            .create_purchase_order(s1.id, vec![buy(ProductId::new(), 1)], PurchaseOrderStatus::Pending, false)
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "product", .. }));
        let err = engine.history(ProductId::new()).unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
        assert!(engine.purchase_orders(None).unwrap().is_empty());
    }

    #[test]
    fn completing_a_partly_received_order_closes_it_out() {
        let engine = engine();
        let a = product(&engine, "A", 0);
        let s1 = supplier(&engine);
        let po = engine
            .create_purchase_order(s1.id, vec![buy(a.id(), 10)], PurchaseOrderStatus::Pending, false)
            .unwrap();
        engine
            .receive(
                po.id(),
                ReceptionHeader::default(),
                vec![ReceptionLineInput::new(1, 6)],
                ReceiveOptions::default(),
            )
            .unwrap();

        let completed = engine.complete_purchase_order(po.id()).unwrap();
        assert_eq!(completed.status(), PurchaseOrderStatus::Completed);
        assert_eq!(completed.lines()[0].received_qty, 6);
        assert_eq!(engine.current_stock(a.id()).unwrap(), 6);
        assert_eq!(engine.history(a.id()).unwrap().len(), 1);

        let err = engine
            .receive(
                po.id(),
                ReceptionHeader::default(),
                vec![ReceptionLineInput::new(1, 4)],
                ReceiveOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState { .. }));
        assert_eq!(engine.current_stock(a.id()).unwrap(), 6);

        let other = engine
            .create_purchase_order(s1.id, vec![buy(a.id(), 2)], PurchaseOrderStatus::Pending, false)
            .unwrap();
        engine.cancel_purchase_order(other.id(), true).unwrap();
        let err = engine.complete_purchase_order(other.id()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState { .. }));
        assert_eq!(
            engine.purchase_order(other.id()).unwrap().status(),
            PurchaseOrderStatus::Cancelled
        );
    }

    #[test]
    fn status_change_to_cancelled_releases_paid_stock() {
        let engine = engine();
        let b = product(&engine, "B", 20);
        let c1 = customer(&engine);
        let so = engine
            .create_sale_order(c1.id, vec![sell(b.id(), 5)], SaleOrderStatus::Pagada, true)
            .unwrap();
        assert_eq!(engine.current_stock(b.id()).unwrap(), 15);

        let cancelled = engine
            .update_sale_status(so.id(), SaleOrderStatus::Cancelada)
            .unwrap();
        assert_eq!(cancelled.status(), SaleOrderStatus::Cancelada);
        assert_eq!(engine.current_stock(b.id()).unwrap(), 20);

        let again = engine.cancel_sale_order(so.id(), true).unwrap();
        assert_eq!(again.status(), SaleOrderStatus::Cancelada);
        assert_eq!(engine.current_stock(b.id()).unwrap(), 20);

        let err = engine
            .update_sale_status(so.id(), SaleOrderStatus::Pagada)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState { .. }));
        assert_eq!(engine.current_stock(b.id()).unwrap(), 20);

        let deleted = engine
            .create_sale_order(c1.id, vec![sell(b.id(), 3)], SaleOrderStatus::Pagada, true)
            .unwrap();
        assert_eq!(engine.current_stock(b.id()).unwrap(), 17);
        engine
            .update_sale_status(deleted.id(), SaleOrderStatus::Eliminada)
            .unwrap();
        assert_eq!(engine.current_stock(b.id()).unwrap(), 20);
        assert_consistent(&engine, b.id());
    }

    #[test]
    fn sale_quantities_past_the_stock_range_are_rejected() {
        let engine = engine_with(EngineConfig {
            allow_backorder: true,
            ..EngineConfig::default()
        });
        let b = product(&engine, "B", 1);
        let c1 = customer(&engine);
        let huge = NewSaleLine {
            product_id: b.id(),
            quantity: i64::MAX,
            unit_price: 1,
        };
        let err = engine
            .create_sale_order(c1.id, vec![huge.clone(), huge], SaleOrderStatus::Pagada, true)
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(engine.current_stock(b.id()).unwrap(), 1);
        assert!(engine.sale_orders(None).unwrap().is_empty());
    }

    #[test]
    fn reception_total_past_the_stock_range_is_rejected() {
        let engine = engine();
        let a = product(&engine, "A", 0);
        let b = product(&engine, "B", 0);
        let s1 = supplier(&engine);
        let huge = |product_id| NewPurchaseLine {
            product_id,
            ordered_qty: i64::MAX,
            unit_cost: 1,
        };
        let po = engine
            .create_purchase_order(
                s1.id,
                vec![huge(a.id()), huge(b.id())],
                PurchaseOrderStatus::Pending,
                false,
            )
            .unwrap();

        let err = engine
            .receive(
                po.id(),
                ReceptionHeader::default(),
                vec![
                    ReceptionLineInput::new(1, i64::MAX),
                    ReceptionLineInput::new(2, i64::MAX),
                ],
                ReceiveOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(engine.current_stock(a.id()).unwrap(), 0);
        assert!(engine.receptions_for(po.id()).unwrap().is_empty());
        let po = engine.purchase_order(po.id()).unwrap();
        assert!(po.lines().iter().all(|l| l.received_qty == 0));
    }

    #[test]
    fn supplier_links_follow_purchases() {
        let engine = engine();
        let a = product(&engine, "A", 0);
        let b = product(&engine, "B", 0);
        let s1 = supplier(&engine);
        let s2 = engine.add_supplier("S2").unwrap();

        let link = engine.link_supplier_product(s1.id, a.id(), 120, None).unwrap();
        assert_eq!(link.last_price, 120);
        assert_eq!(link.last_purchase_at, None);
        assert!(matches!(
            engine.link_supplier_product(s1.id, a.id(), 0, None),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            engine.update_supplier_price(s2.id, a.id(), 10, None),
            Err(DomainError::NotFound { .. })
        ));
        let link = engine.update_supplier_price(s1.id, a.id(), 130, None).unwrap();
        assert_eq!(link.last_price, 130);

        let po = engine
            .create_purchase_order(s1.id, vec![buy(b.id(), 5)], PurchaseOrderStatus::Pending, false)
            .unwrap();
        let carried = engine.products_for_supplier(s1.id).unwrap();
        let skus: Vec<_> = carried.iter().map(|(p, _)| p.sku().to_string()).collect();
        assert_eq!(skus, vec!["A", "B"]);
        assert_eq!(carried[1].1.last_price, 50);
        assert_eq!(carried[1].1.last_purchase_at, Some(po.created_at()));

        let reception = engine
            .receive(
                po.id(),
                ReceptionHeader::default(),
                vec![ReceptionLineInput::new(1, 2)],
                ReceiveOptions::default(),
            )
            .unwrap();
        let sellers = engine.suppliers_for_product(b.id()).unwrap();
        assert_eq!(sellers.len(), 1);
        assert_eq!(sellers[0].0.id, s1.id);
        assert_eq!(sellers[0].1.last_purchase_at, Some(reception.created_at));

        engine.link_supplier_product(s2.id, a.id(), 110, None).unwrap();
        let names: Vec<_> = engine
            .suppliers_for_product(a.id())
            .unwrap()
            .into_iter()
            .map(|(s, _)| s.name)
            .collect();
        assert_eq!(names, vec!["S1", "S2"]);
    }

    #[test]
    fn overview_can_be_narrowed_to_one_supplier() {
        let engine = engine();
        let a = product(&engine, "A", 1);
        let b = product(&engine, "B", 9);
        product(&engine, "C", 4);
        let s1 = supplier(&engine);
        let s2 = engine.add_supplier("S2").unwrap();
        engine.set_thresholds(a.id(), 5, 0).unwrap();
        engine.link_supplier_product(s1.id, a.id(), 10, None).unwrap();
        engine.link_supplier_product(s1.id, b.id(), 10, None).unwrap();

        let rows = engine.overview_for_supplier(s1.id).unwrap();
        let skus: Vec<_> = rows.iter().map(|r| r.product.sku().to_string()).collect();
        assert_eq!(skus, vec!["A", "B"]);
        assert!(rows[0].flags.below_min);
        assert!(engine.overview_for_supplier(s2.id).unwrap().is_empty());
        assert!(matches!(
            engine.overview_for_supplier(SupplierId::new()),
            Err(DomainError::NotFound { entity: "supplier", .. })
        ));
        assert_eq!(engine.overview().unwrap().len(), 3);
    }

    #[test]
    fn failed_purchase_order_leaves_no_supplier_link() {
        let engine = engine();
        let a = product(&engine, "A", 0);
        let s1 = supplier(&engine);
        let err = engine
            .create_purchase_order(
                s1.id,
                vec![buy(a.id(), 1), buy(ProductId::new(), 1)],
                PurchaseOrderStatus::Pending,
                false,
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
        assert!(engine.suppliers_for_product(a.id()).unwrap().is_empty());
    }
}
