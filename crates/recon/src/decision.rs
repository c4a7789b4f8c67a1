//! Per-record reconciliation decision. Pure: no storage, no clock.

use std::fmt;

use serde::Serialize;

use freightrecon_core::{
    CostProvenance, ExistingShipment, Order, ParsedInvoiceRecord, UploadMode,
    EQUALITY_TOLERANCE_CENTS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Add,
    Skip,
    Blocked,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Add => "add",
            Action::Skip => "skip",
            Action::Blocked => "blocked",
        }
    }

    /// True for actions that write to the shipment table.
    pub fn writes(&self) -> bool {
        matches!(self, Action::Create | Action::Update | Action::Add)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    AddModeNeedsExisting,
    NewShipmentForOrder,
    NoMatchingOrder,
    ManualOverrideProtected,
    ActualNotReplacedByEstimate,
    AddOnlyExisting,
    CostUnchanged,
    CostChanged,
    CostHigher,
    CostNotHigher,
    CostLower,
    CostNotLower,
    AddedToExisting,
    /// Set at commit when the lock re-read finds the shipment locked.
    LockedSinceAnalysis,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionReason::AddModeNeedsExisting => "add mode requires an existing target",
            DecisionReason::NewShipmentForOrder => "new shipment for matching order",
            DecisionReason::NoMatchingOrder => "no matching order",
            DecisionReason::ManualOverrideProtected => "manual override protected",
            DecisionReason::ActualNotReplacedByEstimate => {
                "cannot overwrite verified actual cost with an estimate"
            }
            DecisionReason::AddOnlyExisting => "shipment exists; add-only mode",
            DecisionReason::CostUnchanged => "cost unchanged",
            DecisionReason::CostChanged => "cost changed",
            DecisionReason::CostHigher => "invoice cost is higher",
            DecisionReason::CostNotHigher => "invoice cost is not higher",
            DecisionReason::CostLower => "invoice cost is lower",
            DecisionReason::CostNotLower => "invoice cost is not lower",
            DecisionReason::AddedToExisting => "invoice cost added to existing",
            DecisionReason::LockedSinceAnalysis => "cost locked since analysis",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub action: Action,
    pub reason: DecisionReason,
    /// incoming − existing, when a shipment exists.
    pub cost_difference_cents: Option<i64>,
    /// Cost the shipment will hold after a write.
    pub resulting_cost_cents: Option<i64>,
    pub order_id: Option<i64>,
    /// Provenance a write will store.
    pub provenance: Option<CostProvenance>,
}

impl Decision {
    fn new(action: Action, reason: DecisionReason) -> Self {
        Self {
            action,
            reason,
            cost_difference_cents: None,
            resulting_cost_cents: None,
            order_id: None,
            provenance: None,
        }
    }

    /// Downgrade a write to `blocked` after the lock re-read.
    pub fn locked_at_write(mut self) -> Self {
        self.action = Action::Blocked;
        self.reason = DecisionReason::LockedSinceAnalysis;
        self.resulting_cost_cents = None;
        self.provenance = None;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub record: &'a ParsedInvoiceRecord,
    /// Provenance implied by the uploading carrier.
    pub incoming_provenance: CostProvenance,
    pub existing: Option<&'a ExistingShipment>,
    /// Order referencing this tracking number; only consulted when no shipment exists.
    pub order: Option<&'a Order>,
    pub mode: UploadMode,
}

/// Decide what one record does. First matching rule wins.
pub fn decide(input: DecisionInput<'_>) -> Decision {
    let incoming = input.record.shipping_cost_cents;

    let Some(existing) = input.existing else {
        if input.mode == UploadMode::AddToExisting {
            return Decision::new(Action::Skip, DecisionReason::AddModeNeedsExisting);
        }
        return match input.order {
            Some(order) => Decision {
                resulting_cost_cents: Some(incoming),
                order_id: Some(order.id),
                provenance: Some(input.incoming_provenance),
                ..Decision::new(Action::Create, DecisionReason::NewShipmentForOrder)
            },
            None => Decision::new(Action::Skip, DecisionReason::NoMatchingOrder),
        };
    };

    let diff = incoming - existing.shipping_cost_cents;
    let base = |action, reason| Decision {
        cost_difference_cents: Some(diff),
        order_id: existing.order_id,
        ..Decision::new(action, reason)
    };

    if existing.cost_locked {
        return base(Action::Blocked, DecisionReason::ManualOverrideProtected);
    }
    if existing.cost_provenance == CostProvenance::Actual
        && input.incoming_provenance == CostProvenance::Estimated
    {
        return base(Action::Blocked, DecisionReason::ActualNotReplacedByEstimate);
    }

    let update = |reason| Decision {
        resulting_cost_cents: Some(incoming),
        provenance: Some(input.incoming_provenance),
        ..base(Action::Update, reason)
    };

    match input.mode {
        UploadMode::AddOnly => base(Action::Skip, DecisionReason::AddOnlyExisting),
        UploadMode::OverwriteAll => {
            if diff.abs() < EQUALITY_TOLERANCE_CENTS {
                base(Action::Skip, DecisionReason::CostUnchanged)
            } else {
                update(DecisionReason::CostChanged)
            }
        }
        UploadMode::UpdateIfHigher => {
            if diff >= EQUALITY_TOLERANCE_CENTS {
                update(DecisionReason::CostHigher)
            } else {
                base(Action::Skip, DecisionReason::CostNotHigher)
            }
        }
        UploadMode::UpdateIfLower => {
            if diff <= -EQUALITY_TOLERANCE_CENTS {
                update(DecisionReason::CostLower)
            } else {
                base(Action::Skip, DecisionReason::CostNotLower)
            }
        }
        // Summed charges keep the provenance of the cost they extend
        UploadMode::AddToExisting => Decision {
            resulting_cost_cents: Some(existing.shipping_cost_cents + incoming),
            provenance: Some(existing.cost_provenance),
            ..base(Action::Add, DecisionReason::AddedToExisting)
        },
    }
}
