//! Inventory domain: batches, balances, the movement model, allocation
//! planning and the transfer state machine.
//!
//! Everything here is deterministic domain logic (no IO, no storage). The
//! infrastructure crate wires these rules into transactions.

pub mod allocation;
pub mod balance;
pub mod batch;
pub mod catalog;
pub mod events;
pub mod movement;
pub mod transfer;

pub use allocation::{
    AllocationCandidate, AllocationPlan, Draw, ExpiryWarning, order_candidates, plan_allocation,
};
pub use balance::{BalanceKey, InventoryBalance};
pub use batch::{Batch, ExpiryStatus, NewBatch};
pub use catalog::{Substance, Unit, UnitMinimumOverride, effective_minimum};
pub use events::{
    BatchReceived, LowStockReached, MovementRecorded, StockEvent, TransferCompleted,
};
pub use movement::{BalanceEffect, Direction, Movement, MovementDraft, MovementKind, MovementLinks};
pub use transfer::{
    DestinationExpiry, Transfer, TransferLine, TransferStatus, format_transfer_code,
    synthesize_lot_code,
};
