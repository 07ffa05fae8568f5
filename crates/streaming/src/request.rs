use serde::{Deserialize, Serialize};

/// Cube faces, named from the viewer's resting orientation (looking at the
/// front face). World axes: front = -Z, back = +Z, left = -X, right = +X,
/// top = +Y, bottom = -Y.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CubeFace {
    Front,
    Back,
    Left,
    Right,
    Top,
    Bottom,
}

pub const CUBE_FACES: [CubeFace; 6] = [
    CubeFace::Front,
    CubeFace::Back,
    CubeFace::Left,
    CubeFace::Right,
    CubeFace::Top,
    CubeFace::Bottom,
];

impl CubeFace {
    pub fn index(self) -> usize {
        match self {
            CubeFace::Front => 0,
            CubeFace::Back => 1,
            CubeFace::Left => 2,
            CubeFace::Right => 3,
            CubeFace::Top => 4,
            CubeFace::Bottom => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CubeFace::Front => "front",
            CubeFace::Back => "back",
            CubeFace::Left => "left",
            CubeFace::Right => "right",
            CubeFace::Top => "top",
            CubeFace::Bottom => "bottom",
        }
    }
}

impl std::fmt::Display for CubeFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifies one tile of a panorama.
///
/// A small copyable key, ordered and hashable so it can key the task queue
/// and seen set directly. The textual form (`Display`) is stable and is what
/// events carry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TileId {
    /// Equirectangular grid tile.
    Sphere { col: u32, row: u32 },
    /// Cubemap tile on one face.
    Face { face: CubeFace, col: u32, row: u32 },
}

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TileId::Sphere { col, row } => write!(f, "{col}x{row}"),
            TileId::Face { face, col, row } => write!(f, "{face}/{col}x{row}"),
        }
    }
}

/// A fetch the queue has dispatched: the driver loads `url` and reports the
/// outcome back through the owning layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRequest {
    pub id: TileId,
    pub url: String,
}
