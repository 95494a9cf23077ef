//! Infrastructure layer: transactional store, ledger, allocation and
//! transfer execution, and the `StockService` facade.

pub mod allocation;
pub mod config;
pub mod error;
pub mod ledger;
pub mod queries;
pub mod requests;
pub mod service;
pub mod store;
pub mod transfer;
pub mod verify;


pub use allocation::{AllocatedLine, AllocationEngine, AllocationRequest, AllocationResult};
pub use config::{DestinationExpiryMode, EngineConfig};
pub use error::StockError;
pub use ledger::MovementLedger;
pub use queries::{BatchStock, ExpiryAlert, LowStockEntry, StockSummary, UnitStock};
pub use requests::{
    AdjustmentRequest, CorrectionRequest, IssueRequest, LossRequest, ReceiptRequest,
};
pub use service::{StockEnvelope, StockService};
pub use store::{InMemoryStockStore, MovementFilter, StockStore, StoreError};
pub use transfer::{TransferCoordinator, TransferLineRequest, TransferRequest, TransferResult};
pub use verify::{LedgerDiscrepancy, LedgerReport};
