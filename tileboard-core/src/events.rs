/// Inbound messages a board session reacts to.
///
/// Two sources feed a session:
///   - the row-change feed of the backing store (`ChangeEvent`)
///   - the cross-client broadcast channel (`BroadcastMessage`)
///
/// Neither carries truth. Both only tell the session what to re-fetch.
use serde::{Deserialize, Serialize};

use crate::types::{Cell, CellId, PaletteEntry, PaletteId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A palette row changed. `new` is the row after the change (absent on
/// delete), `old_id` the id of the row before it (present on delete).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteChange {
    pub kind: ChangeKind,
    pub new: Option<PaletteEntry>,
    pub old_id: Option<PaletteId>,
}

/// Row-level change notification from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    CellInserted(Cell),
    CellUpdated { id: CellId },
    CellDeleted { id: CellId },
    Palette(PaletteChange),
}

/// Message exchanged between clients over the broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum BroadcastMessage {
    #[serde(rename = "cell:update")]
    CellUpdate { id: CellId },
    #[serde(rename = "palette:list:refresh")]
    PaletteListRefresh { at: i64 },
}

impl BroadcastMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            BroadcastMessage::CellUpdate { .. } => "cell:update",
            BroadcastMessage::PaletteListRefresh { .. } => "palette:list:refresh",
        }
    }

    /// Palette refresh stamped with the current time in unix millis.
    pub fn palette_refresh_now() -> Self {
        BroadcastMessage::PaletteListRefresh {
            at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Re-fetch a session must perform after absorbing an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Followup {
    RefetchCell(CellId),
    RefetchPalettes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Change(ChangeEvent),
    Broadcast(BroadcastMessage),
}
