//! # Sale Transaction Coordinator
//!
//! Drives a sale attempt through its lifecycle:
//!
//! ```text
//! Building --validate--> Priced --commit--> Committed
//!     |                    |                    ^
//!     |                    +--> Rejected        |
//!     +--(abandon: no side effects)             |
//!                                               |
//!   commit = decrement stock -> insert sale -> append audit entry
//!            (any mid-failure compensates and leaves no trace)
//! ```
//!
//! Validation is optimistic: it prices the draft against current stock but
//! reserves nothing. The store-level conditional decrement at commit time is
//! the final arbiter, so a client that raced another sale gets a clean
//! [`CommitOutcome::Rejected`] rather than an oversold ledger.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use shopledger_core::{
    price_line, sale_totals, AuditAction, Capability, CoreError, Identity, LinePricing,
    ReversalLine, ReversalPayload, SaleDraft, SaleLine, SaleRecord, SaleStatus,
};
use shopledger_db::{Database, SaleRepository};

use crate::access::{actor, require_capability, require_shop_access};
use crate::audit::AuditTrail;
use crate::error::{EngineError, EngineResult};
use crate::ledger::InventoryLedger;
use crate::session::SessionStore;

// =============================================================================
// Outcomes
// =============================================================================

/// A validated, fully priced sale ready to commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricedSale {
    pub shop_id: String,
    pub lines: Vec<LinePricing>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
}

/// Why a sale attempt was rejected. Rejections are business outcomes, not
/// errors: the draft survives and the caller may adjust and retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// The draft has no lines.
    EmptySale,
    /// A line's quantity is zero or negative.
    NonPositiveQuantity { item_id: String },
    /// A line references an item missing from the shop catalog.
    UnknownItem { item_id: String },
    /// A line asks for more than the ledger holds.
    InsufficientStock {
        item_id: String,
        available: i64,
        requested: i64,
    },
}

/// Verdict of the validation stage.
#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    /// The draft priced cleanly and may be committed.
    Priced(PricedSale),
    /// The draft was rejected; nothing was touched.
    Rejected(RejectReason),
}

/// Terminal verdict of a commit attempt.
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    /// The sale is durable: stock moved, record written, audit appended.
    Committed(SaleRecord),
    /// A racing client got the stock first (or the sale was empty); no
    /// persisted state changed.
    Rejected(RejectReason),
}

// =============================================================================
// Coordinator
// =============================================================================

/// Coordinates the validate/commit protocol for sale attempts.
pub struct SaleCoordinator {
    session: Arc<SessionStore>,
    ledger: InventoryLedger,
    sales: SaleRepository,
    audit: AuditTrail,
}

impl SaleCoordinator {
    /// Creates a coordinator over the database and session store.
    pub fn new(db: &Database, session: Arc<SessionStore>) -> Self {
        SaleCoordinator {
            session,
            ledger: InventoryLedger::new(db),
            sales: db.sales(),
            audit: AuditTrail::new(db),
        }
    }

    /// Prices a draft against current stock without reserving anything.
    pub async fn validate(
        &self,
        identity: &Identity,
        draft: &SaleDraft,
    ) -> EngineResult<ValidationOutcome> {
        require_capability(identity, Capability::RecordSale)?;

        if draft.is_empty() {
            return Ok(ValidationOutcome::Rejected(RejectReason::EmptySale));
        }

        let mut lines = Vec::with_capacity(draft.line_count());
        for cart_line in &draft.lines {
            if cart_line.quantity <= 0 {
                return Ok(ValidationOutcome::Rejected(
                    RejectReason::NonPositiveQuantity {
                        item_id: cart_line.item_id.clone(),
                    },
                ));
            }

            let Some(item) = self
                .ledger
                .find_item(&identity.shop_id, &cart_line.item_id)
                .await?
            else {
                return Ok(ValidationOutcome::Rejected(RejectReason::UnknownItem {
                    item_id: cart_line.item_id.clone(),
                }));
            };

            match price_line(&item, cart_line) {
                Ok(pricing) => lines.push(pricing),
                Err(CoreError::InsufficientStock {
                    item_id,
                    available,
                    requested,
                }) => {
                    return Ok(ValidationOutcome::Rejected(RejectReason::InsufficientStock {
                        item_id,
                        available,
                        requested,
                    }))
                }
                Err(err) => return Err(err.into()),
            }
        }

        let (subtotal, tax, total) = sale_totals(&lines);
        Ok(ValidationOutcome::Priced(PricedSale {
            shop_id: identity.shop_id.clone(),
            lines,
            subtotal_cents: subtotal.cents(),
            tax_cents: tax.cents(),
            total_cents: total.cents(),
        }))
    }

    /// Commits a priced sale: decrement stock, insert the record, append the
    /// audit entry. Any mid-sequence failure compensates everything already
    /// applied; losing the stock race yields `Rejected`, not an error.
    pub async fn commit(
        &self,
        identity: &Identity,
        priced: &PricedSale,
    ) -> EngineResult<CommitOutcome> {
        if !self.session.is_session_valid() {
            return Err(EngineError::AuthExpired);
        }
        require_capability(identity, Capability::RecordSale)?;
        require_shop_access(identity, &priced.shop_id)?;

        if priced.lines.is_empty() {
            return Ok(CommitOutcome::Rejected(RejectReason::EmptySale));
        }

        // Stage 1: move stock, line by line; the conditional decrement is
        // the arbiter against racing clients.
        let mut decremented: Vec<&LinePricing> = Vec::new();
        for line in &priced.lines {
            match self
                .ledger
                .decrement_stock(&priced.shop_id, &line.item_id, line.quantity)
                .await
            {
                Ok(()) => decremented.push(line),
                Err(EngineError::InsufficientStock {
                    item_id,
                    available,
                    requested,
                }) => {
                    self.rollback_decrements(&priced.shop_id, &decremented).await;
                    info!(item_id = %item_id, "Commit lost the stock race; sale rejected");
                    return Ok(CommitOutcome::Rejected(RejectReason::InsufficientStock {
                        item_id,
                        available,
                        requested,
                    }));
                }
                Err(err) => {
                    self.rollback_decrements(&priced.shop_id, &decremented).await;
                    return Err(err);
                }
            }
        }

        // Stage 2: write the sale record (with its lines) in one store
        // transaction. The fresh UUID is the idempotency token: a duplicate
        // insert of the same record trips the primary key instead of
        // double-charging.
        let sale = SaleRecord {
            id: Uuid::new_v4().to_string(),
            shop_id: priced.shop_id.clone(),
            creator_id: identity.user_id.clone(),
            creator_name: identity.username.clone(),
            status: SaleStatus::Completed,
            total_cents: priced.total_cents,
            created_at: Utc::now(),
            lines: priced
                .lines
                .iter()
                .map(|line| SaleLine {
                    item_id: line.item_id.clone(),
                    price_cents_at_sale: line.unit_price_cents,
                    quantity: line.quantity,
                    discount: line.discount,
                })
                .collect(),
        };

        if let Err(err) = self.sales.insert(&sale).await {
            warn!(sale_id = %sale.id, error = %err, "Sale insert failed; restoring stock");
            self.rollback_decrements(&priced.shop_id, &decremented).await;
            return Err(err.into());
        }

        // Stage 3: append the audit entry carrying the reversal payload. A
        // sale that cannot be audited does not happen.
        let reversal = ReversalPayload::Sale {
            lines: priced
                .lines
                .iter()
                .map(|line| ReversalLine {
                    item_id: line.item_id.clone(),
                    quantity: line.quantity,
                })
                .collect(),
        };
        let description = format!(
            "Sale of {} line(s) totaling {} cents",
            sale.lines.len(),
            sale.total_cents
        );

        if let Err(err) = self
            .audit
            .record(
                AuditAction::Sale,
                &priced.shop_id,
                actor(identity),
                None,
                description,
                reversal,
            )
            .await
        {
            warn!(sale_id = %sale.id, error = %err, "Audit append failed; compensating sale");
            if let Err(comp_err) = self.sales.delete(&priced.shop_id, &sale.id).await {
                warn!(sale_id = %sale.id, error = %comp_err, "Sale compensation failed");
            }
            self.rollback_decrements(&priced.shop_id, &decremented).await;
            return Err(err);
        }

        info!(
            sale_id = %sale.id,
            total_cents = sale.total_cents,
            lines = sale.lines.len(),
            "Sale committed"
        );
        Ok(CommitOutcome::Committed(sale))
    }

    /// Validates and commits in one call. Validation rejections surface as
    /// `Rejected` outcomes, same as commit-time races.
    pub async fn sell(
        &self,
        identity: &Identity,
        draft: &SaleDraft,
    ) -> EngineResult<CommitOutcome> {
        match self.validate(identity, draft).await? {
            ValidationOutcome::Priced(priced) => self.commit(identity, &priced).await,
            ValidationOutcome::Rejected(reason) => Ok(CommitOutcome::Rejected(reason)),
        }
    }

    /// Restores stock for already-applied decrements after a failed commit.
    /// Best effort: failures here are logged, not propagated, so the
    /// original failure stays visible to the caller.
    async fn rollback_decrements(&self, shop_id: &str, applied: &[&LinePricing]) {
        for line in applied {
            if let Err(err) = self
                .ledger
                .increment_stock(shop_id, &line.item_id, line.quantity)
                .await
            {
                warn!(item_id = %line.item_id, error = %err, "Stock compensation failed");
            }
        }
    }
}
