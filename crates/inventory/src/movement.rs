//! The movement model: one immutable ledger row per stock-affecting event.
//!
//! Kind-to-effect mapping:
//!
//! | kind                         | balance effect            |
//! |------------------------------|---------------------------|
//! | receipt, transfer-in         | `+quantity`               |
//! | issue, loss, transfer-out    | `-quantity`               |
//! | correction                   | `±quantity` by direction  |
//! | adjustment                   | set to exactly `quantity` |

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pharmastock_core::{
    BatchId, DomainError, DomainResult, Entity, MovementId, PatientRef, Quantity, SessionRef,
    SubstanceId, TransferId, UnitId, UserId,
};

use crate::balance::BalanceKey;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Receipt,
    Issue,
    Correction,
    Adjustment,
    Loss,
    TransferOut,
    TransferIn,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::Receipt => "receipt",
            MovementKind::Issue => "issue",
            MovementKind::Correction => "correction",
            MovementKind::Adjustment => "adjustment",
            MovementKind::Loss => "loss",
            MovementKind::TransferOut => "transfer_out",
            MovementKind::TransferIn => "transfer_in",
        }
    }

    /// Fixed direction of the kind; `None` for corrections and adjustments.
    pub fn fixed_direction(self) -> Option<Direction> {
        match self {
            MovementKind::Receipt | MovementKind::TransferIn => Some(Direction::Increase),
            MovementKind::Issue | MovementKind::Loss | MovementKind::TransferOut => {
                Some(Direction::Decrease)
            }
            MovementKind::Correction | MovementKind::Adjustment => None,
        }
    }

    pub fn is_outgoing(self) -> bool {
        self.fixed_direction() == Some(Direction::Decrease)
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sign of a movement's effect on the balance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    pub fn signed(self, quantity: Quantity) -> Decimal {
        match self {
            Direction::Increase => quantity.value(),
            Direction::Decrease => -quantity.value(),
        }
    }
}

/// What recording a movement does to its balance row.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BalanceEffect {
    Delta(Decimal),
    SetTo(Quantity),
}

impl BalanceEffect {
    /// Resulting balance, or `NegativeBalance` when a delta overdraws.
    pub fn apply(self, before: Quantity) -> DomainResult<Quantity> {
        match self {
            BalanceEffect::Delta(delta) => before.apply_signed(delta),
            BalanceEffect::SetTo(q) => Ok(q),
        }
    }
}

/// Optional attribution attached to a movement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementLinks {
    pub patient: Option<PatientRef>,
    pub session: Option<SessionRef>,
    /// Receiving unit, on transfer-out rows.
    pub destination_unit: Option<UnitId>,
    /// Sending unit, on transfer-in rows.
    pub origin_unit: Option<UnitId>,
    /// The movement a correction amends.
    pub origin_movement: Option<MovementId>,
    pub transfer: Option<TransferId>,
}

/// A movement that has not been recorded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementDraft {
    pub kind: MovementKind,
    /// Required for corrections; must match the kind's fixed direction otherwise.
    pub direction: Option<Direction>,
    pub key: BalanceKey,
    pub quantity: Quantity,
    pub reason: String,
    pub actor: UserId,
    pub links: MovementLinks,
}

impl MovementDraft {
    pub fn new(
        kind: MovementKind,
        key: BalanceKey,
        quantity: Quantity,
        reason: impl Into<String>,
        actor: UserId,
    ) -> Self {
        Self {
            kind,
            direction: kind.fixed_direction(),
            key,
            quantity,
            reason: reason.into(),
            actor,
            links: MovementLinks::default(),
        }
    }

    pub fn correction(
        key: BalanceKey,
        direction: Direction,
        quantity: Quantity,
        origin: MovementId,
        reason: impl Into<String>,
        actor: UserId,
    ) -> Self {
        let mut draft = Self::new(MovementKind::Correction, key, quantity, reason, actor);
        draft.direction = Some(direction);
        draft.links.origin_movement = Some(origin);
        draft
    }

    pub fn with_links(mut self, links: MovementLinks) -> Self {
        self.links = links;
        self
    }

    pub fn effect(&self) -> DomainResult<BalanceEffect> {
        if self.reason.trim().is_empty() {
            return Err(DomainError::validation("movement reason cannot be empty"));
        }
        if self.kind == MovementKind::Adjustment {
            return Ok(BalanceEffect::SetTo(self.quantity));
        }
        self.quantity.ensure_positive()?;

        let direction = match (self.kind.fixed_direction(), self.direction) {
            (Some(fixed), None) => fixed,
            (Some(fixed), Some(given)) if fixed == given => fixed,
            (Some(_), Some(_)) => {
                return Err(DomainError::validation(format!(
                    "{} movements cannot change direction",
                    self.kind
                )));
            }
            (None, Some(given)) => given,
            (None, None) => {
                return Err(DomainError::validation("correction requires a direction"));
            }
        };
        if self.kind == MovementKind::Correction && self.links.origin_movement.is_none() {
            return Err(DomainError::validation("correction must reference the movement it corrects"));
        }
        Ok(BalanceEffect::Delta(direction.signed(self.quantity)))
    }

    /// Turn the draft into an immutable movement against `balance_before`.
    ///
    /// Overdrawing maps to `InsufficientStock`: from the ledger's point of view
    /// the request asked for more than the row holds.
    pub fn commit(
        self,
        id: MovementId,
        ledger_seq: u64,
        balance_before: Quantity,
        recorded_at: DateTime<Utc>,
    ) -> DomainResult<Movement> {
        let effect = self.effect()?;
        let balance_after = effect.apply(balance_before).map_err(|e| match e {
            DomainError::NegativeBalance { balance, .. } => {
                DomainError::insufficient(self.quantity, balance)
            }
            other => other,
        })?;

        let direction = match effect {
            BalanceEffect::Delta(d) if d.is_sign_negative() => Direction::Decrease,
            BalanceEffect::Delta(_) => Direction::Increase,
            BalanceEffect::SetTo(q) if q < balance_before => Direction::Decrease,
            BalanceEffect::SetTo(_) => Direction::Increase,
        };

        Ok(Movement {
            id,
            ledger_seq,
            substance_id: self.key.substance_id,
            batch_id: self.key.batch_id,
            unit_id: self.key.unit_id,
            kind: self.kind,
            direction,
            quantity: self.quantity,
            balance_before,
            balance_after,
            reason: self.reason,
            actor: self.actor,
            recorded_at,
            links: self.links,
        })
    }
}

/// Immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    /// Position in the ledger (assigned on append, strictly increasing).
    pub ledger_seq: u64,
    pub substance_id: SubstanceId,
    pub batch_id: BatchId,
    pub unit_id: UnitId,
    pub kind: MovementKind,
    pub direction: Direction,
    pub quantity: Quantity,
    pub balance_before: Quantity,
    pub balance_after: Quantity,
    pub reason: String,
    pub actor: UserId,
    pub recorded_at: DateTime<Utc>,
    pub links: MovementLinks,
}

impl Movement {
    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.substance_id, self.batch_id, self.unit_id)
    }

    /// Net change this movement made to its balance row.
    pub fn signed_delta(&self) -> Decimal {
        self.balance_after.signed_diff(self.balance_before)
    }
}

impl Entity for Movement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
