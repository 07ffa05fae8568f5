use runtime::event_bus::{Event, EventBus};
use runtime::task::TaskOutcome;
use scene::camera::Camera;
use scene::material::ImageData;
use scene::repaint::RepaintFlag;
use serde::{Deserialize, Serialize};
use streaming::loader::{ImageLoadError, TileLoader};
use streaming::queue::TileQueue;
use streaming::request::{CubeFace, TileId, TileRequest};
use streaming::seen::SeenTiles;

/// Rejected panorama configuration. Detected synchronously before any
/// streaming starts, so a bad config never leaves a half-initialized layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    GridDimensionZero {
        dim: &'static str,
    },
    GridDimensionNotPowerOfTwo {
        dim: &'static str,
        value: u32,
    },
    GridTooDense {
        dim: &'static str,
        value: u32,
        max: u32,
    },
    TileSizeNotIntegral {
        width: u32,
        cols: u32,
    },
    MissingUrlTemplate,
    UrlTemplateMissingPlaceholder {
        placeholder: &'static str,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::GridDimensionZero { dim } => {
                write!(f, "{dim} must be non-zero")
            }
            ConfigError::GridDimensionNotPowerOfTwo { dim, value } => {
                write!(f, "{dim} must be a power of two, got {value}")
            }
            ConfigError::GridTooDense { dim, value, max } => {
                write!(f, "{dim}={value} exceeds the mesh subdivision ({max})")
            }
            ConfigError::TileSizeNotIntegral { width, cols } => {
                write!(f, "width {width} is not a multiple of cols {cols}")
            }
            ConfigError::MissingUrlTemplate => write!(f, "tile URL template is required"),
            ConfigError::UrlTemplateMissingPlaceholder { placeholder } => {
                write!(f, "tile URL template is missing the {{{placeholder}}} placeholder")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// What happens to a tile whose one fetch failed.
///
/// There is exactly one policy: the seen set remembers every dispatched id
/// for the whole panorama lifetime, so a failed tile is not fetched again
/// until the panorama reloads. This is intentional behavior inherited from
/// the at-most-once dispatch protocol, not a missing feature.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryPolicy {
    #[default]
    #[serde(rename = "once-per-session")]
    OncePerSession,
}

pub(crate) fn validate_grid_dim(dim: &'static str, value: u32, max: u32) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::GridDimensionZero { dim });
    }
    if !value.is_power_of_two() {
        return Err(ConfigError::GridDimensionNotPowerOfTwo { dim, value });
    }
    if value > max {
        return Err(ConfigError::GridTooDense { dim, value, max });
    }
    Ok(())
}

pub(crate) fn validate_template(template: &str, requires_face: bool) -> Result<(), ConfigError> {
    if template.is_empty() {
        return Err(ConfigError::MissingUrlTemplate);
    }
    for placeholder in ["{col}", "{row}"] {
        if !template.contains(placeholder) {
            return Err(ConfigError::UrlTemplateMissingPlaceholder {
                placeholder: &placeholder[1..placeholder.len() - 1],
            });
        }
    }
    if requires_face && !template.contains("{face}") {
        return Err(ConfigError::UrlTemplateMissingPlaceholder { placeholder: "face" });
    }
    Ok(())
}

pub(crate) fn expand_template(
    template: &str,
    face: Option<CubeFace>,
    col: u32,
    row: u32,
) -> String {
    let mut url = template
        .replace("{col}", &col.to_string())
        .replace("{row}", &row.to_string());
    if let Some(face) = face {
        url = url.replace("{face}", face.name());
    }
    url
}

/// Grid points sampled for one tile's visibility test: the four corners,
/// plus edge midpoints and the center for coarse tiles (a tile spanning a
/// large arc can be visible while all four corners are off-screen).
pub(crate) fn tile_sample_grid(
    x0: u32,
    y0: u32,
    span_x: u32,
    span_y: u32,
    coarse_x: bool,
    coarse_y: bool,
) -> Vec<(u32, u32)> {
    let x1 = x0 + span_x;
    let y1 = y0 + span_y;
    let xm = x0 + span_x / 2;
    let ym = y0 + span_y / 2;

    let mut points = Vec::with_capacity(9);
    points.extend([(x0, y0), (x1, y0), (x0, y1), (x1, y1)]);
    if coarse_x {
        points.extend([(xm, y0), (xm, y1)]);
    }
    if coarse_y {
        points.extend([(x0, ym), (x1, ym)]);
    }
    if coarse_x || coarse_y {
        points.push((xm, ym));
    }
    points
}

/// Priority of a visible tile: the angle between the first visible sample
/// direction and the camera view direction. Polar tiles are heavily
/// distorted, so their angle is doubled to deprioritize them against
/// equatorial tiles of similar apparent centrality.
pub(crate) fn tile_priority(
    sample_dir: foundation::math::Vec3,
    view_dir: foundation::math::Vec3,
    polar: bool,
) -> f64 {
    let angle = sample_dir.angle_to(view_dir);
    if polar { angle * 2.0 } else { angle }
}

/// The driver protocol both tiled panorama layers speak.
///
/// The hosting viewer calls [`TiledLayer::handle_view_change`] on every
/// camera move and performs the returned fetches; each finished fetch comes
/// back through [`TiledLayer::complete_tile`], whose return value is the
/// follow-on batch to fetch next.
pub trait TiledLayer {
    fn handle_view_change(&mut self, camera: &Camera) -> Vec<TileRequest>;

    fn complete_tile(
        &mut self,
        id: TileId,
        result: Result<ImageData, ImageLoadError>,
    ) -> Vec<TileRequest>;

    fn teardown(&mut self);

    fn stats(&self) -> StreamStats;

    fn take_repaint(&mut self) -> bool;

    fn drain_events(&mut self) -> Vec<Event>;
}

/// Per-pass counters the hosting application reads after driving the layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StreamStats {
    pub tracked: usize,
    pub running: usize,
    pub seen: usize,
    pub settled_done: u64,
    pub settled_error: u64,
}

/// The streaming state both tiled adapters share: the task queue, the seen
/// set, the material loader, traceability, and the repaint flag. Adapters
/// own the geometry; this owns the protocol.
#[derive(Debug)]
pub(crate) struct TileStream {
    pub queue: TileQueue,
    pub seen: SeenTiles,
    pub loader: TileLoader,
    pub bus: EventBus,
    pub repaint: RepaintFlag,
    pub pass: u64,
}

impl TileStream {
    pub fn new(concurrency: usize, show_error_tile: bool, error_tile_size: u32) -> Self {
        Self {
            queue: TileQueue::new(concurrency),
            seen: SeenTiles::new(),
            loader: TileLoader::new(show_error_tile, error_tile_size),
            bus: EventBus::new(),
            repaint: RepaintFlag::new(),
            pass: 0,
        }
    }

    /// Opens a visibility pass: bumps the pass index and soft-pauses every
    /// tracked task; the pass then re-enables exactly the tiles it offers.
    pub fn begin_pass(&mut self) -> u64 {
        self.pass += 1;
        self.queue.disable_all();
        self.pass
    }

    /// The enqueue-vs-reprioritize diff for one candidate.
    pub fn offer(&mut self, id: TileId, priority: f64) {
        if self.seen.first_sighting(id) {
            self.queue.enqueue(id, priority);
        } else {
            self.queue.set_priority(id, priority);
        }
    }

    pub fn settle(&mut self, id: TileId, outcome: TaskOutcome) -> Vec<TileId> {
        self.queue.settle(id, outcome)
    }

    /// Hard teardown: cancels in-flight work and forgets all per-panorama
    /// state, allowing a fresh panorama to re-attempt every tile.
    pub fn teardown(&mut self) {
        self.queue.clear();
        self.seen.reset();
        self.loader.reset();
        self.bus.emit(self.pass, "teardown", "tile streaming stopped");
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            tracked: self.queue.len(),
            running: self.queue.running_len(),
            seen: self.seen.len(),
            settled_done: self.queue.settled_done(),
            settled_error: self.queue.settled_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{
        ConfigError, TileStream, expand_template, tile_priority, tile_sample_grid,
        validate_grid_dim, validate_template,
    };
    use foundation::math::Vec3;
    use streaming::request::{CubeFace, TileId};

    #[test]
    fn grid_dim_validation_covers_all_rejections() {
        assert_eq!(
            validate_grid_dim("cols", 0, 64),
            Err(ConfigError::GridDimensionZero { dim: "cols" })
        );
        assert_eq!(
            validate_grid_dim("cols", 12, 64),
            Err(ConfigError::GridDimensionNotPowerOfTwo {
                dim: "cols",
                value: 12
            })
        );
        assert_eq!(
            validate_grid_dim("cols", 128, 64),
            Err(ConfigError::GridTooDense {
                dim: "cols",
                value: 128,
                max: 64
            })
        );
        assert_eq!(validate_grid_dim("cols", 16, 64), Ok(()));
    }

    #[test]
    fn template_validation_requires_placeholders() {
        assert_eq!(validate_template("", false), Err(ConfigError::MissingUrlTemplate));
        assert_eq!(
            validate_template("tiles/{row}.jpg", false),
            Err(ConfigError::UrlTemplateMissingPlaceholder { placeholder: "col" })
        );
        assert_eq!(
            validate_template("tiles/{col}x{row}.jpg", true),
            Err(ConfigError::UrlTemplateMissingPlaceholder { placeholder: "face" })
        );
        assert_eq!(validate_template("t/{face}/{col}x{row}.jpg", true), Ok(()));
    }

    #[test]
    fn template_expansion_substitutes_all_placeholders() {
        assert_eq!(
            expand_template("t/{col}x{row}.jpg", None, 3, 1),
            "t/3x1.jpg"
        );
        assert_eq!(
            expand_template("t/{face}/{col}x{row}.jpg", Some(CubeFace::Top), 0, 2),
            "t/top/0x2.jpg"
        );
    }

    #[test]
    fn fine_tiles_sample_corners_only() {
        let points = tile_sample_grid(4, 2, 2, 2, false, false);
        assert_eq!(points, vec![(4, 2), (6, 2), (4, 4), (6, 4)]);
    }

    #[test]
    fn coarse_tiles_add_midpoints_and_center() {
        let points = tile_sample_grid(0, 0, 8, 4, true, true);
        assert_eq!(points.len(), 9);
        assert!(points.contains(&(4, 0)));
        assert!(points.contains(&(0, 2)));
        assert!(points.contains(&(4, 2)));
    }

    #[test]
    fn polar_tiles_pay_double() {
        let view = Vec3::new(0.0, 0.0, -1.0);
        let sample = Vec3::new(0.5, 0.0, -1.0);
        let plain = tile_priority(sample, view, false);
        let polar = tile_priority(sample, view, true);
        assert!((polar - 2.0 * plain).abs() < 1e-12);
    }

    #[test]
    fn offer_enqueues_once_then_reprioritizes() {
        let mut stream = TileStream::new(4, true, 32);
        let id = TileId::Sphere { col: 1, row: 0 };

        stream.begin_pass();
        stream.offer(id, 0.5);
        assert_eq!(stream.queue.len(), 1);

        stream.begin_pass();
        stream.offer(id, 0.2);
        assert_eq!(stream.queue.len(), 1);
        assert_eq!(stream.seen.len(), 1);
    }
}
