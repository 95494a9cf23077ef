//! Transactional stock storage boundary.
//!
//! Every stock-changing operation runs inside one store transaction. The
//! repositories exposed to the closure see the transaction's own writes;
//! nothing becomes visible to other callers until the closure returns `Ok`.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::{InMemoryStockStore, StockSnapshot, StockState};
pub use r#trait::{
    AllocationRecord, AllocationRepository, BalanceRepository, BatchRepository, CatalogRepository,
    MovementFilter, MovementRepository, SequenceRepository, StockStore, StockTx, StoreError,
    TransferRepository,
};

/// Named counters handed out by [`SequenceRepository`].
pub mod sequences {
    /// Batch registration order, the allocation tie-break.
    pub const BATCH: &str = "batch";
    /// Ledger position of every movement.
    pub const LEDGER: &str = "ledger";
    /// Transfer code numbers.
    pub const TRANSFER: &str = "transfer";
}
