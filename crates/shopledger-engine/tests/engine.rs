//! End-to-end tests of the engine over an in-memory store: the full
//! cart -> validate -> commit -> audit -> undo lifecycle, permission gating,
//! and the no-partial-effect guarantees of a rejected commit.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use shopledger_core::{
    AuditAction, Capability, CartLine, Discount, Identity, InventoryItem, Role, SaleDraft,
    UserEntity,
};
use shopledger_db::{Database, DbConfig};
use shopledger_engine::{
    AuditTrail, CommitOutcome, EngineError, InventoryLedger, RejectReason, SaleCoordinator,
    SessionStore, SessionTokens, UserDirectory, ValidationOutcome,
};

const SHOP: &str = "shop-1";

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn identity(role: Role) -> Identity {
    Identity {
        user_id: "u1".to_string(),
        username: "clerk".to_string(),
        role,
        shop_id: SHOP.to_string(),
        shop_name: "Main Street".to_string(),
        permissions: None,
    }
}

fn item(id: &str, quantity: i64, price_cents: i64, tax_rate_bps: u32) -> InventoryItem {
    InventoryItem {
        id: id.to_string(),
        shop_id: SHOP.to_string(),
        name: format!("Item {id}"),
        sku: format!("SKU-{id}"),
        category_id: None,
        creator_id: "u1".to_string(),
        quantity,
        cost_cents: 500,
        price_cents,
        tax_rate_bps,
        discount: Discount::none(),
        image_urls: Vec::new(),
        updated_at: Utc::now(),
    }
}

fn valid_session() -> Arc<SessionStore> {
    let store = SessionStore::in_memory();
    store
        .save_session(&SessionTokens {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now().timestamp() + 3_600,
            user_id: "u1".to_string(),
            user_email: "clerk@shop.test".to_string(),
        })
        .unwrap();
    Arc::new(store)
}

async fn setup() -> (Database, SaleCoordinator, AuditTrail) {
    init_tracing();
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let coordinator = SaleCoordinator::new(&db, valid_session());
    let audit = AuditTrail::new(&db);
    (db, coordinator, audit)
}

fn draft(lines: &[(&str, i64)]) -> SaleDraft {
    let mut draft = SaleDraft::new();
    for (item_id, quantity) in lines {
        draft.add_line(CartLine::new(*item_id, *quantity)).unwrap();
    }
    draft
}

// =============================================================================
// Sale Lifecycle
// =============================================================================

#[tokio::test]
async fn test_full_sale_lifecycle() {
    let (db, coordinator, audit) = setup().await;
    let cashier = identity(Role::Cashier);

    // 5 in stock at 10.00 with 10% tax; sell 3.
    db.items().upsert(&item("a", 5, 1000, 1000)).await.unwrap();

    let priced = match coordinator
        .validate(&cashier, &draft(&[("a", 3)]))
        .await
        .unwrap()
    {
        ValidationOutcome::Priced(priced) => priced,
        other => panic!("expected priced sale, got {other:?}"),
    };
    assert_eq!(priced.subtotal_cents, 3000);
    assert_eq!(priced.tax_cents, 300);
    assert_eq!(priced.total_cents, 3300);

    let sale = match coordinator.commit(&cashier, &priced).await.unwrap() {
        CommitOutcome::Committed(sale) => sale,
        other => panic!("expected committed sale, got {other:?}"),
    };
    assert_eq!(sale.total_cents, 3300);

    // Stock moved and the sale record is durable with its frozen line.
    let stocked = db.items().get(SHOP, "a").await.unwrap().unwrap();
    assert_eq!(stocked.quantity, 2);

    let loaded = db.sales().get(SHOP, &sale.id).await.unwrap().unwrap();
    assert_eq!(loaded.lines.len(), 1);
    assert_eq!(loaded.lines[0].price_cents_at_sale, 1000);
    assert_eq!(loaded.lines[0].quantity, 3);

    // One Sale audit entry, carrying its reversal.
    let entries = audit.list_for_user(&cashier).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, AuditAction::Sale);
    assert!(!entries[0].undone);
}

#[tokio::test]
async fn test_commit_rejected_when_stock_is_gone() {
    let (db, coordinator, audit) = setup().await;
    let cashier = identity(Role::Cashier);
    db.items().upsert(&item("a", 5, 1000, 1000)).await.unwrap();

    // First sale takes 3 of 5.
    match coordinator.sell(&cashier, &draft(&[("a", 3)])).await.unwrap() {
        CommitOutcome::Committed(_) => {}
        other => panic!("expected committed sale, got {other:?}"),
    }

    // Second sale of 3 outruns the remaining 2: rejected, not an error.
    match coordinator.sell(&cashier, &draft(&[("a", 3)])).await.unwrap() {
        CommitOutcome::Rejected(RejectReason::InsufficientStock {
            available,
            requested,
            ..
        }) => {
            assert_eq!(available, 2);
            assert_eq!(requested, 3);
        }
        other => panic!("expected insufficient-stock rejection, got {other:?}"),
    }

    // No partial effect anywhere: stock, sale count, audit trail untouched.
    assert_eq!(db.items().get(SHOP, "a").await.unwrap().unwrap().quantity, 2);
    assert_eq!(db.sales().count_for_shop(SHOP).await.unwrap(), 1);
    assert_eq!(audit.list_for_user(&cashier).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_multi_line_rejection_rolls_back_earlier_decrements() {
    let (db, coordinator, _) = setup().await;
    let cashier = identity(Role::Cashier);
    db.items().upsert(&item("a", 10, 1000, 0)).await.unwrap();
    db.items().upsert(&item("b", 10, 500, 0)).await.unwrap();

    // Validate against healthy stock, then drain item b behind the sale's
    // back so the commit fails on its second line.
    let priced = match coordinator
        .validate(&cashier, &draft(&[("a", 2), ("b", 4)]))
        .await
        .unwrap()
    {
        ValidationOutcome::Priced(priced) => priced,
        other => panic!("expected priced sale, got {other:?}"),
    };
    db.items().decrement_stock(SHOP, "b", 8).await.unwrap();

    match coordinator.commit(&cashier, &priced).await.unwrap() {
        CommitOutcome::Rejected(RejectReason::InsufficientStock { item_id, .. }) => {
            assert_eq!(item_id, "b");
        }
        other => panic!("expected rejection, got {other:?}"),
    }

    // Item a's decrement was compensated.
    assert_eq!(db.items().get(SHOP, "a").await.unwrap().unwrap().quantity, 10);
    assert_eq!(db.sales().count_for_shop(SHOP).await.unwrap(), 0);
}

#[tokio::test]
async fn test_validate_rejects_empty_and_unknown() {
    let (_db, coordinator, _) = setup().await;
    let cashier = identity(Role::Cashier);

    match coordinator.validate(&cashier, &SaleDraft::new()).await.unwrap() {
        ValidationOutcome::Rejected(RejectReason::EmptySale) => {}
        other => panic!("expected empty-sale rejection, got {other:?}"),
    }

    match coordinator
        .validate(&cashier, &draft(&[("ghost", 1)]))
        .await
        .unwrap()
    {
        ValidationOutcome::Rejected(RejectReason::UnknownItem { item_id }) => {
            assert_eq!(item_id, "ghost");
        }
        other => panic!("expected unknown-item rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_commit_requires_valid_session() {
    init_tracing();
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    // Session store with nothing in it.
    let coordinator = SaleCoordinator::new(&db, Arc::new(SessionStore::in_memory()));
    let cashier = identity(Role::Cashier);
    db.items().upsert(&item("a", 5, 1000, 0)).await.unwrap();

    let priced = match coordinator
        .validate(&cashier, &draft(&[("a", 1)]))
        .await
        .unwrap()
    {
        ValidationOutcome::Priced(priced) => priced,
        other => panic!("expected priced sale, got {other:?}"),
    };

    let err = coordinator.commit(&cashier, &priced).await.unwrap_err();
    assert!(matches!(err, EngineError::AuthExpired));
    assert_eq!(db.items().get(SHOP, "a").await.unwrap().unwrap().quantity, 5);
}

#[tokio::test]
async fn test_sale_forbidden_without_capability() {
    let (db, coordinator, _) = setup().await;
    db.items().upsert(&item("a", 5, 1000, 0)).await.unwrap();

    // Explicit empty override set denies everything, role notwithstanding.
    let mut locked_out = identity(Role::Admin);
    locked_out.permissions = Some(HashSet::new());

    let err = coordinator
        .validate(&locked_out, &draft(&[("a", 1)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Forbidden {
            capability: Capability::RecordSale
        }
    ));
}

// =============================================================================
// Undo
// =============================================================================

#[tokio::test]
async fn test_undo_sale_restores_stock_once() {
    let (db, coordinator, audit) = setup().await;
    let manager = identity(Role::Manager);
    db.items().upsert(&item("a", 5, 1000, 1000)).await.unwrap();

    match coordinator.sell(&manager, &draft(&[("a", 3)])).await.unwrap() {
        CommitOutcome::Committed(_) => {}
        other => panic!("expected committed sale, got {other:?}"),
    }
    assert_eq!(db.items().get(SHOP, "a").await.unwrap().unwrap().quantity, 2);

    let entry_id = audit.list_for_user(&manager).await.unwrap()[0].id.clone();
    audit.undo(&manager, &entry_id).await.unwrap();

    // Stock back to 5; original entry flagged; compensating Undo entry
    // appended referencing the original actor.
    assert_eq!(db.items().get(SHOP, "a").await.unwrap().unwrap().quantity, 5);
    let entries = audit.list_for_user(&manager).await.unwrap();
    assert_eq!(entries.len(), 2);
    let original = entries.iter().find(|e| e.id == entry_id).unwrap();
    assert!(original.undone);
    let undo_entry = entries
        .iter()
        .find(|e| e.action == AuditAction::Undo)
        .unwrap();
    assert_eq!(undo_entry.target.as_ref().unwrap().user_id, "u1");

    // Second undo must not double-restore.
    let err = audit.undo(&manager, &entry_id).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyUndone { .. }));
    assert_eq!(db.items().get(SHOP, "a").await.unwrap().unwrap().quantity, 5);
}

#[tokio::test]
async fn test_undo_sale_forbidden_for_cashier() {
    let (db, coordinator, audit) = setup().await;
    let manager = identity(Role::Manager);
    db.items().upsert(&item("a", 5, 1000, 0)).await.unwrap();

    match coordinator.sell(&manager, &draft(&[("a", 1)])).await.unwrap() {
        CommitOutcome::Committed(_) => {}
        other => panic!("expected committed sale, got {other:?}"),
    }

    let entry_id = audit.list_for_user(&manager).await.unwrap()[0].id.clone();
    let err = audit
        .undo(&identity(Role::Cashier), &entry_id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Forbidden {
            capability: Capability::UndoAudit
        }
    ));
    assert_eq!(db.items().get(SHOP, "a").await.unwrap().unwrap().quantity, 4);
}

#[tokio::test]
async fn test_undo_informational_entry_unsupported() {
    let (db, _, audit) = setup().await;
    let admin = identity(Role::Admin);
    let directory = UserDirectory::new(&db);

    let user = UserEntity {
        id: "u2".to_string(),
        shop_id: SHOP.to_string(),
        username: "newhire".to_string(),
        email: "newhire@shop.test".to_string(),
        role: Role::Cashier,
        permissions: None,
    };
    directory.create_user(&admin, &user, &audit).await.unwrap();

    let entries = audit.list_for_user(&admin).await.unwrap();
    assert_eq!(entries[0].action, AuditAction::CreateUser);
    let err = audit.undo(&admin, &entries[0].id).await.unwrap_err();
    assert!(matches!(err, EngineError::UndoNotSupported { .. }));
}

#[tokio::test]
async fn test_delete_user_and_undo_reinstates() {
    let (db, _, audit) = setup().await;
    let admin = identity(Role::Admin);
    let directory = UserDirectory::new(&db);

    let user = UserEntity {
        id: "u2".to_string(),
        shop_id: SHOP.to_string(),
        username: "newhire".to_string(),
        email: "newhire@shop.test".to_string(),
        role: Role::Cashier,
        permissions: Some(vec![Capability::ViewInventory]),
    };
    db.users().upsert(&user).await.unwrap();

    directory
        .delete_user(&admin, SHOP, "u2", &audit)
        .await
        .unwrap();
    assert!(db.users().get(SHOP, "u2").await.unwrap().is_none());

    let entry = audit
        .list_for_user(&admin)
        .await
        .unwrap()
        .into_iter()
        .find(|e| e.action == AuditAction::DeleteUser)
        .unwrap();
    audit.undo(&admin, &entry.id).await.unwrap();

    // Back exactly as deleted, explicit overrides included.
    let reinstated = db.users().get(SHOP, "u2").await.unwrap().unwrap();
    assert_eq!(reinstated, user);
}

#[tokio::test]
async fn test_inventory_edit_and_undo_restores_prior_state() {
    let (db, _, audit) = setup().await;
    let manager = identity(Role::Manager);
    let ledger = InventoryLedger::new(&db);

    let original = item("a", 5, 1000, 1000);
    db.items().upsert(&original).await.unwrap();

    let mut edited = original.clone();
    edited.price_cents = 1200;
    edited.name = "Item a (new label)".to_string();
    ledger.edit_item(&manager, &edited, &audit).await.unwrap();
    assert_eq!(
        db.items().get(SHOP, "a").await.unwrap().unwrap().price_cents,
        1200
    );

    let entry = audit
        .list_for_user(&manager)
        .await
        .unwrap()
        .into_iter()
        .find(|e| e.action == AuditAction::InventoryEdit)
        .unwrap();
    audit.undo(&manager, &entry.id).await.unwrap();

    let restored = db.items().get(SHOP, "a").await.unwrap().unwrap();
    assert_eq!(restored.price_cents, 1000);
    assert_eq!(restored.name, original.name);
}

#[tokio::test]
async fn test_delete_item_and_undo_reinstates() {
    let (db, _, audit) = setup().await;
    let manager = identity(Role::Manager);
    let ledger = InventoryLedger::new(&db);

    let original = item("a", 5, 1000, 1000);
    db.items().upsert(&original).await.unwrap();

    ledger
        .delete_item(&manager, SHOP, "a", &audit)
        .await
        .unwrap();
    assert!(db.items().get(SHOP, "a").await.unwrap().is_none());

    let entry = audit
        .list_for_user(&manager)
        .await
        .unwrap()
        .into_iter()
        .find(|e| e.action == AuditAction::InventoryEdit)
        .unwrap();
    audit.undo(&manager, &entry.id).await.unwrap();

    let reinstated = db.items().get(SHOP, "a").await.unwrap().unwrap();
    assert_eq!(reinstated.quantity, 5);
    assert_eq!(reinstated.sku, original.sku);
}

// =============================================================================
// Tenant & Permission Boundaries
// =============================================================================

#[tokio::test]
async fn test_audit_listing_requires_view_reports() {
    let (_db, _, audit) = setup().await;

    let mut blind = identity(Role::Cashier);
    blind.permissions = Some(HashSet::new());

    let err = audit.list_for_user(&blind).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Forbidden {
            capability: Capability::ViewReports
        }
    ));
}

#[tokio::test]
async fn test_cross_shop_edit_requires_platform_admin() {
    let (db, _, audit) = setup().await;
    let ledger = InventoryLedger::new(&db);

    let mut foreign_item = item("a", 5, 1000, 0);
    foreign_item.shop_id = "shop-2".to_string();

    // Admin of shop-1 cannot touch shop-2.
    let err = ledger
        .edit_item(&identity(Role::Admin), &foreign_item, &audit)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Forbidden {
            capability: Capability::PlatformAdmin
        }
    ));

    // With the explicit platform override it goes through.
    let mut platform = identity(Role::Admin);
    platform.permissions = Some(HashSet::from([
        Capability::PlatformAdmin,
        Capability::EditInventory,
    ]));
    ledger
        .edit_item(&platform, &foreign_item, &audit)
        .await
        .unwrap();
    assert!(db.items().get("shop-2", "a").await.unwrap().is_some());
}

#[tokio::test]
async fn test_manage_users_gated_by_role() {
    let (db, _, audit) = setup().await;
    let directory = UserDirectory::new(&db);

    let user = UserEntity {
        id: "u2".to_string(),
        shop_id: SHOP.to_string(),
        username: "newhire".to_string(),
        email: "newhire@shop.test".to_string(),
        role: Role::Cashier,
        permissions: None,
    };

    // Manager role stops short of user management.
    let err = directory
        .create_user(&identity(Role::Manager), &user, &audit)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Forbidden {
            capability: Capability::ManageUsers
        }
    ));

    directory
        .create_user(&identity(Role::Admin), &user, &audit)
        .await
        .unwrap();
    directory
        .change_role(&identity(Role::Admin), SHOP, "u2", Role::Manager, &audit)
        .await
        .unwrap();
    assert_eq!(
        db.users().get(SHOP, "u2").await.unwrap().unwrap().role,
        Role::Manager
    );
}
