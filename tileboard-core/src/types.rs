use serde::{Deserialize, Serialize};

/// Reserved name of the wall palette entry. Matched case-insensitively.
pub const WALL_NAME: &str = "WALL";

/// Name given to an uploaded palette entry when none is supplied.
pub const DEFAULT_PALETTE_NAME: &str = "palette";

/// Fill color of a wall cell.
pub const WALL_COLOR: &str = "#111827";

/// Fill color of an empty cell.
pub const BLANK_COLOR: &str = "#ffffff";

/// Default board edge length.
pub const DEFAULT_BOARD_SIZE: u32 = 9;

pub type CellId = i64;
pub type PaletteId = String;

/// Whether a palette name designates the wall marker.
pub fn is_wall_name(name: Option<&str>) -> bool {
    name.is_some_and(|n| n.trim().eq_ignore_ascii_case(WALL_NAME))
}

/// Denormalized view of the palette entry a cell references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteSnapshot {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// One board coordinate. Negative ids mark placeholders with no backing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub x: u32,
    pub y: u32,
    #[serde(default)]
    pub palette_id: Option<PaletteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<PaletteSnapshot>,
}

impl Cell {
    pub fn is_placeholder(&self) -> bool {
        self.id < 0
    }

    pub fn references(&self, palette_id: &str) -> bool {
        self.palette_id.as_deref() == Some(palette_id)
    }

    /// Drop the palette reference and its snapshot.
    pub fn clear_palette(&mut self) {
        self.palette_id = None;
        self.palette = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteEntry {
    pub id: PaletteId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl PaletteEntry {
    pub fn is_wall(&self) -> bool {
        is_wall_name(self.name.as_deref())
    }

    pub fn snapshot(&self) -> PaletteSnapshot {
        PaletteSnapshot {
            name: self.name.clone(),
            image_url: self.image_url.clone(),
        }
    }
}

/// Active paint mode; decides what the next cell click does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Selection {
    Wall { wall_id: Option<PaletteId> },
    Reset,
    Image { id: PaletteId, url: String },
}

impl Default for Selection {
    fn default() -> Self {
        Selection::Wall { wall_id: None }
    }
}

impl Selection {
    /// Palette reference a click writes, or `None` when the click has no
    /// target yet (wall mode before the wall id is known).
    pub fn target(&self) -> Option<Option<PaletteId>> {
        match self {
            Selection::Wall { wall_id } => wall_id.clone().map(Some),
            Selection::Reset => Some(None),
            Selection::Image { id, .. } => Some(Some(id.clone())),
        }
    }

    /// Optimistic paint shown for a click in this mode.
    pub fn paint(&self) -> Paint {
        match self {
            Selection::Wall { .. } => Paint::Wall,
            Selection::Reset => Paint::Clear,
            Selection::Image { url, .. } => Paint::Image { url: url.clone() },
        }
    }
}

/// Local-only paint applied before the write is confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Paint {
    Clear,
    Wall,
    Image { url: String },
}

/// Resolved look of a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Appearance {
    Blank,
    Wall,
    Image { url: String },
}

impl Appearance {
    /// Background color the cell is drawn with.
    pub fn color(&self) -> &'static str {
        match self {
            Appearance::Wall => WALL_COLOR,
            Appearance::Blank | Appearance::Image { .. } => BLANK_COLOR,
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        match self {
            Appearance::Image { url } => Some(url),
            _ => None,
        }
    }

    pub fn from_paint(paint: &Paint) -> Self {
        match paint {
            Paint::Clear => Appearance::Blank,
            Paint::Wall => Appearance::Wall,
            Paint::Image { url } => Appearance::Image { url: url.clone() },
        }
    }

    /// Appearance of a persisted palette reference.
    pub fn from_snapshot(snapshot: Option<&PaletteSnapshot>) -> Self {
        let Some(snapshot) = snapshot else {
            return Appearance::Blank;
        };
        if is_wall_name(snapshot.name.as_deref()) {
            return Appearance::Wall;
        }
        match snapshot.image_url.as_deref() {
            Some(url) if !url.is_empty() => Appearance::Image {
                url: url.to_string(),
            },
            _ => Appearance::Blank,
        }
    }
}
