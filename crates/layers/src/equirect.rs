use foundation::math::{Vec2, Vec3};
use runtime::event_bus::Event;
use runtime::task::TaskOutcome;
use scene::camera::Camera;
use scene::material::{ImageData, Material, MaterialId, MaterialStore};
use scene::mesh::{GridMesh, MeshGroup};
use scene::visibility::Frustum;
use serde::{Deserialize, Serialize};
use streaming::config::StreamingConfig;
use streaming::loader::ImageLoadError;
use streaming::request::{TileId, TileRequest};

use crate::layer::{
    ConfigError, RetryPolicy, StreamStats, TileStream, TiledLayer, expand_template,
    tile_priority, tile_sample_grid, validate_grid_dim, validate_template,
};

/// Sphere subdivision: cells per row (longitude) and rows (latitude).
///
/// The tile grid must divide this evenly, which the power-of-two config
/// validation guarantees.
pub const SPHERE_SEGMENTS: u32 = 64;
pub const SPHERE_HORIZONTAL_SEGMENTS: u32 = 32;

pub const SPHERE_RADIUS: f64 = 10.0;

const NB_VERTICES_BY_FAN: usize = 3;
const NB_VERTICES_BY_QUAD: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquirectTilesConfig {
    /// Full panorama width in pixels; one tile is `width / cols` wide.
    pub width: u32,
    /// Tile columns, a power of two up to [`SPHERE_SEGMENTS`].
    pub cols: u32,
    /// Tile rows, a power of two up to [`SPHERE_HORIZONTAL_SEGMENTS`].
    pub rows: u32,
    /// Tile URL template with `{col}` and `{row}` placeholders.
    pub url_template: String,
    /// Optional low-resolution whole-panorama image loaded before tiles.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_show_error_tile")]
    pub show_error_tile: bool,
    /// Renderer hint: blur the base material under the streamed tiles.
    #[serde(default)]
    pub base_blur: bool,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub streaming: StreamingConfig,
}

fn default_show_error_tile() -> bool {
    true
}

/// Equirectangular tiled-panorama adapter.
///
/// Owns the subdivided sphere mesh and streams visible tiles onto it. The
/// driver loop is: [`EquirectTilesLayer::handle_view_change`] on every
/// camera move returns the fetches to start; each finished fetch comes back
/// through [`EquirectTilesLayer::complete_tile`], which may return follow-on
/// fetches.
#[derive(Debug)]
pub struct EquirectTilesLayer {
    config: EquirectTilesConfig,
    mesh: GridMesh,
    materials: MaterialStore,
    base_material: MaterialId,
    stream: TileStream,
    base_pending: bool,
}

impl EquirectTilesLayer {
    pub fn new(config: EquirectTilesConfig) -> Result<Self, ConfigError> {
        validate_grid_dim("cols", config.cols, SPHERE_SEGMENTS)?;
        validate_grid_dim("rows", config.rows, SPHERE_HORIZONTAL_SEGMENTS)?;
        if config.width == 0 {
            return Err(ConfigError::GridDimensionZero { dim: "width" });
        }
        if config.width % config.cols != 0 {
            return Err(ConfigError::TileSizeNotIntegral {
                width: config.width,
                cols: config.cols,
            });
        }
        validate_template(&config.url_template, false)?;

        let mut materials = MaterialStore::new();
        let base_material = materials.insert(Material::base(
            ImageData::solid(1, 1, [24, 24, 24, 255]),
            config.base_blur,
        ));
        let mesh = build_sphere_mesh(base_material);

        let tile_size = config.width / config.cols;
        let stream = TileStream::new(
            config.streaming.concurrency,
            config.show_error_tile,
            tile_size,
        );
        let base_pending = config.base_url.is_some();

        Ok(Self {
            config,
            mesh,
            materials,
            base_material,
            stream,
            base_pending,
        })
    }

    pub fn config(&self) -> &EquirectTilesConfig {
        &self.config
    }

    pub fn mesh(&self) -> &GridMesh {
        &self.mesh
    }

    pub fn mesh_mut(&mut self) -> &mut GridMesh {
        &mut self.mesh
    }

    pub fn materials(&self) -> &MaterialStore {
        &self.materials
    }

    pub fn base_material(&self) -> MaterialId {
        self.base_material
    }

    pub fn pass(&self) -> u64 {
        self.stream.pass
    }

    pub fn stats(&self) -> StreamStats {
        self.stream.stats()
    }

    pub fn take_repaint(&mut self) -> bool {
        self.stream.repaint.take()
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.stream.bus.drain()
    }

    /// URL of the optional low-resolution base panorama, until it lands.
    pub fn base_url(&self) -> Option<&str> {
        if self.base_pending {
            self.config.base_url.as_deref()
        } else {
            None
        }
    }

    /// Applies (or discards) the base panorama fetch.
    pub fn complete_base(&mut self, result: Result<ImageData, ImageLoadError>) {
        if !self.base_pending {
            // Teardown raced the fetch; the result has nowhere to land.
            self.stream
                .bus
                .emit(self.stream.pass, "base-stale", "base image discarded");
            return;
        }
        self.base_pending = false;
        match result {
            Ok(image) => {
                if (image.aspect_ratio() - 2.0).abs() > 1e-9 {
                    self.stream.bus.emit(
                        self.stream.pass,
                        "panorama-warning",
                        format!(
                            "base image is {}x{}, expected a 2:1 equirectangular panorama",
                            image.width, image.height
                        ),
                    );
                }
                let id = self
                    .materials
                    .insert(Material::base(image, self.config.base_blur));
                for group in 0..self.mesh.group_count() {
                    self.mesh.set_group_material(group, id);
                }
                self.base_material = id;
                self.stream.repaint.request();
                self.stream
                    .bus
                    .emit(self.stream.pass, "base-loaded", "base image applied");
            }
            Err(err) => {
                self.stream
                    .bus
                    .emit(self.stream.pass, "base-error", err.to_string());
            }
        }
    }

    /// Runs one visibility pass for the given camera and returns the tile
    /// fetches to start now. Synchronous and side-effect free beyond the
    /// queue diff; call it on every camera position or zoom change.
    pub fn handle_view_change(&mut self, camera: &Camera) -> Vec<TileRequest> {
        self.stream.begin_pass();
        for (id, priority) in self.scan_visible(camera) {
            self.stream.offer(id, priority);
        }
        let started = self.stream.queue.pump();
        self.requests_for(started)
    }

    /// Applies one finished tile fetch and returns the follow-on fetches.
    ///
    /// A result whose tile lost its claim (panorama torn down while the
    /// fetch was in flight) is discarded without touching the mesh.
    pub fn complete_tile(
        &mut self,
        id: TileId,
        result: Result<ImageData, ImageLoadError>,
    ) -> Vec<TileRequest> {
        let TileId::Sphere { .. } = id else {
            return Vec::new();
        };
        if self.stream.queue.is_stale(id) {
            self.stream
                .bus
                .emit(self.stream.pass, "tile-stale", id.to_string());
            return Vec::new();
        }

        let outcome = match result {
            Ok(image) => {
                let material = self.stream.loader.tile_material(&mut self.materials, image);
                self.patch_tile(id, material);
                self.stream.repaint.request();
                self.stream
                    .bus
                    .emit(self.stream.pass, "tile-loaded", id.to_string());
                TaskOutcome::Done
            }
            Err(err) => {
                self.stream
                    .bus
                    .emit(self.stream.pass, "tile-error", format!("{id}: {err}"));
                if let Some(material) = self.stream.loader.error_material(&mut self.materials) {
                    self.patch_tile(id, material);
                    self.stream.repaint.request();
                }
                TaskOutcome::Error
            }
        };

        let next = self.stream.settle(id, outcome);
        self.requests_for(next)
    }

    /// Stops streaming for this panorama: cancels in-flight work, forgets
    /// the seen set, and makes any late fetch result stale.
    pub fn teardown(&mut self) {
        self.base_pending = false;
        self.stream.teardown();
    }

    fn requests_for(&self, ids: Vec<TileId>) -> Vec<TileRequest> {
        ids.into_iter()
            .map(|id| TileRequest {
                id,
                url: self.tile_url(id),
            })
            .collect()
    }

    fn tile_url(&self, id: TileId) -> String {
        match id {
            TileId::Sphere { col, row } => {
                expand_template(&self.config.url_template, None, col, row)
            }
            TileId::Face { .. } => unreachable!("equirectangular layer only builds sphere ids"),
        }
    }

    /// Samples each tile's covering vertices against the current frustum.
    /// Rebuilt from scratch every pass; no incremental state.
    fn scan_visible(&self, camera: &Camera) -> Vec<(TileId, f64)> {
        let frustum = Frustum::from_view_proj(camera.view_proj());
        let rotation = self.mesh.rotation();
        let view_dir = camera.view_direction();

        let tsx = SPHERE_SEGMENTS / self.config.cols;
        let tsy = SPHERE_HORIZONTAL_SEGMENTS / self.config.rows;
        let coarse_x = tsx >= SPHERE_SEGMENTS / 8;
        let coarse_y = tsy >= SPHERE_HORIZONTAL_SEGMENTS / 8;

        let mut candidates = Vec::new();
        for row in 0..self.config.rows {
            let polar = row == 0 || row == self.config.rows - 1;
            for col in 0..self.config.cols {
                let samples = tile_sample_grid(col * tsx, row * tsy, tsx, tsy, coarse_x, coarse_y);
                for (i, j) in samples {
                    let vertex = grid_point_vertex_index(i, j);
                    let p = rotation.transform_point(self.mesh.position(vertex));
                    if frustum.contains_point(p) {
                        candidates.push((
                            TileId::Sphere { col, row },
                            tile_priority(p, view_dir, polar),
                        ));
                        break;
                    }
                }
            }
        }
        candidates
    }

    /// Swaps one tile's cells over to `material` and rewrites their UVs to
    /// address the tile's own image.
    fn patch_tile(&mut self, id: TileId, material: MaterialId) {
        let TileId::Sphere { col, row } = id else {
            return;
        };
        let tsx = SPHERE_SEGMENTS / self.config.cols;
        let tsy = SPHERE_HORIZONTAL_SEGMENTS / self.config.rows;
        let x0 = col * tsx;
        let y0 = row * tsy;

        for cy in y0..y0 + tsy {
            for cx in x0..x0 + tsx {
                let group = (cy * SPHERE_SEGMENTS + cx) as usize;
                self.mesh.set_group_material(group, material);

                let u0 = (cx - x0) as f64 / tsx as f64;
                let u1 = (cx - x0 + 1) as f64 / tsx as f64;
                let v0 = (cy - y0) as f64 / tsy as f64;
                let v1 = (cy - y0 + 1) as f64 / tsy as f64;
                let uc = (u0 + u1) * 0.5;

                let first = cell_first_vertex(cx, cy);
                if cy == 0 {
                    // Fan: pole, bottom-left, bottom-right.
                    let uvs = [Vec2::new(uc, v0), Vec2::new(u0, v1), Vec2::new(u1, v1)];
                    self.mesh.write_cell_uvs(first, &uvs);
                } else if cy == SPHERE_HORIZONTAL_SEGMENTS - 1 {
                    // Fan: top-left, pole, top-right.
                    let uvs = [Vec2::new(u0, v0), Vec2::new(uc, v1), Vec2::new(u1, v0)];
                    self.mesh.write_cell_uvs(first, &uvs);
                } else {
                    let uvs = quad_uvs(u0, u1, v0, v1);
                    self.mesh.write_cell_uvs(first, &uvs);
                }
            }
        }
    }
}

impl TiledLayer for EquirectTilesLayer {
    fn handle_view_change(&mut self, camera: &Camera) -> Vec<TileRequest> {
        EquirectTilesLayer::handle_view_change(self, camera)
    }

    fn complete_tile(
        &mut self,
        id: TileId,
        result: Result<ImageData, ImageLoadError>,
    ) -> Vec<TileRequest> {
        EquirectTilesLayer::complete_tile(self, id, result)
    }

    fn teardown(&mut self) {
        EquirectTilesLayer::teardown(self)
    }

    fn stats(&self) -> StreamStats {
        EquirectTilesLayer::stats(self)
    }

    fn take_repaint(&mut self) -> bool {
        EquirectTilesLayer::take_repaint(self)
    }

    fn drain_events(&mut self) -> Vec<Event> {
        EquirectTilesLayer::drain_events(self)
    }
}

/// UVs for a quad cell in its vertex order: tl, bl, br, tl, br, tr.
pub(crate) fn quad_uvs(u0: f64, u1: f64, v0: f64, v1: f64) -> [Vec2; 6] {
    [
        Vec2::new(u0, v0),
        Vec2::new(u0, v1),
        Vec2::new(u1, v1),
        Vec2::new(u0, v0),
        Vec2::new(u1, v1),
        Vec2::new(u1, v0),
    ]
}

/// Position of sphere grid point (i, j): longitude index i (wrapping), row
/// index j from the top pole (j = 0) to the bottom pole.
fn grid_point_position(i: u32, j: u32) -> Vec3 {
    let theta = std::f64::consts::TAU * (i % SPHERE_SEGMENTS) as f64 / SPHERE_SEGMENTS as f64;
    let phi = std::f64::consts::PI * j as f64 / SPHERE_HORIZONTAL_SEGMENTS as f64;
    Vec3::new(
        SPHERE_RADIUS * phi.sin() * theta.sin(),
        SPHERE_RADIUS * phi.cos(),
        -SPHERE_RADIUS * phi.sin() * theta.cos(),
    )
}

/// First-vertex index of cell (ccol, crow), closed form over the row-major
/// layout: the two polar rows are 3-vertex fans, everything between is
/// 6-vertex quads.
pub(crate) fn cell_first_vertex(ccol: u32, crow: u32) -> usize {
    let s = SPHERE_SEGMENTS as usize;
    let ccol = ccol as usize;
    let crow = crow as usize;
    if crow == 0 {
        ccol * NB_VERTICES_BY_FAN
    } else if crow < (SPHERE_HORIZONTAL_SEGMENTS - 1) as usize {
        s * NB_VERTICES_BY_FAN + (crow - 1) * s * NB_VERTICES_BY_QUAD + ccol * NB_VERTICES_BY_QUAD
    } else {
        s * NB_VERTICES_BY_FAN
            + ((SPHERE_HORIZONTAL_SEGMENTS - 2) as usize) * s * NB_VERTICES_BY_QUAD
            + ccol * NB_VERTICES_BY_FAN
    }
}

/// Buffer index of the vertex sitting at grid point (i, j). Pole rows
/// collapse to the fan apex of the cell below/above.
pub(crate) fn grid_point_vertex_index(i: u32, j: u32) -> usize {
    let i = i % SPHERE_SEGMENTS;
    let last_row = SPHERE_HORIZONTAL_SEGMENTS - 1;
    if j == 0 {
        cell_first_vertex(i, 0)
    } else if j == SPHERE_HORIZONTAL_SEGMENTS {
        cell_first_vertex(i, last_row) + 1
    } else {
        // Grid row j is the top edge of cell row j (quads and the bottom
        // fan row both store their top-left corner first).
        cell_first_vertex(i, j)
    }
}

fn build_sphere_mesh(base_material: MaterialId) -> GridMesh {
    let s = SPHERE_SEGMENTS;
    let h = SPHERE_HORIZONTAL_SEGMENTS;
    let sf = s as f64;
    let hf = h as f64;

    let mut positions = Vec::new();
    let mut uvs = Vec::new();
    let mut groups = Vec::new();

    for crow in 0..h {
        for ccol in 0..s {
            let first = positions.len();
            let uc = (ccol as f64 + 0.5) / sf;
            let u0 = ccol as f64 / sf;
            let u1 = (ccol + 1) as f64 / sf;
            let v0 = crow as f64 / hf;
            let v1 = (crow + 1) as f64 / hf;

            if crow == 0 {
                positions.push(grid_point_position(ccol, 0));
                positions.push(grid_point_position(ccol, 1));
                positions.push(grid_point_position(ccol + 1, 1));
                uvs.push(Vec2::new(uc, v0));
                uvs.push(Vec2::new(u0, v1));
                uvs.push(Vec2::new(u1, v1));
            } else if crow == h - 1 {
                positions.push(grid_point_position(ccol, crow));
                positions.push(grid_point_position(ccol, h));
                positions.push(grid_point_position(ccol + 1, crow));
                uvs.push(Vec2::new(u0, v0));
                uvs.push(Vec2::new(uc, v1));
                uvs.push(Vec2::new(u1, v0));
            } else {
                positions.push(grid_point_position(ccol, crow));
                positions.push(grid_point_position(ccol, crow + 1));
                positions.push(grid_point_position(ccol + 1, crow + 1));
                positions.push(grid_point_position(ccol, crow));
                positions.push(grid_point_position(ccol + 1, crow + 1));
                positions.push(grid_point_position(ccol + 1, crow));
                for uv in quad_uvs(u0, u1, v0, v1) {
                    uvs.push(uv);
                }
            }

            groups.push(MeshGroup {
                first_vertex: first,
                vertex_count: positions.len() - first,
                material: base_material,
            });
        }
    }

    GridMesh::new(positions, uvs, groups)
}
