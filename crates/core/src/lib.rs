//! `pharmastock-core`: foundation types shared by every stock crate.
//!
//! Pure values only: quantities, identifiers, errors and the clock seam.
//! Nothing here performs IO.

pub mod clock;
pub mod entity;
pub mod error;
pub mod id;
pub mod quantity;
pub mod value_object;

pub use clock::{Clock, FixedClock, SystemClock};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{BatchId, MovementId, PatientRef, SessionRef, SubstanceId, TransferId, UnitId, UserId};
pub use quantity::{Money, QUANTITY_MAX, QUANTITY_SCALE, Quantity};
pub use value_object::ValueObject;
