use foundation::math::Vec3;
use runtime::event_bus::Event;
use runtime::task::TaskOutcome;
use scene::camera::Camera;
use scene::material::{ImageData, Material, MaterialId, MaterialStore};
use scene::mesh::{GridMesh, MeshGroup};
use scene::visibility::Frustum;
use serde::{Deserialize, Serialize};
use streaming::config::StreamingConfig;
use streaming::loader::ImageLoadError;
use streaming::request::{CUBE_FACES, CubeFace, TileId, TileRequest};

use crate::equirect::quad_uvs;
use crate::layer::{
    ConfigError, RetryPolicy, StreamStats, TileStream, TiledLayer, expand_template,
    tile_priority, tile_sample_grid, validate_grid_dim, validate_template,
};

/// Box subdivision: cells per face edge. The per-face tile grid must divide
/// this evenly, which the power-of-two config validation guarantees.
pub const CUBE_SEGMENTS: u32 = 16;

pub const BOX_HALF_EXTENT: f64 = 10.0;

pub const MAX_FACE_SIZE: u32 = 8192;

const NB_VERTICES_BY_QUAD: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CubemapTilesConfig {
    /// Full face edge in pixels; one tile is `face_size / nb_tiles` wide.
    pub face_size: u32,
    /// Tiles per face edge, a power of two up to [`CUBE_SEGMENTS`].
    pub nb_tiles: u32,
    /// Tile URL template with `{face}`, `{col}` and `{row}` placeholders.
    pub url_template: String,
    /// Optional per-face low-resolution base images, `{face}` placeholder.
    #[serde(default)]
    pub base_url_template: Option<String>,
    #[serde(default = "default_show_error_tile")]
    pub show_error_tile: bool,
    /// Renderer hint: blur the base materials under the streamed tiles.
    #[serde(default)]
    pub base_blur: bool,
    /// Source stores the top and bottom faces rotated by 180 degrees.
    #[serde(default)]
    pub flip_top_bottom: bool,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub streaming: StreamingConfig,
}

fn default_show_error_tile() -> bool {
    true
}

/// Cubemap tiled-panorama adapter. Same driver protocol as the
/// equirectangular layer, over a box mesh of six independently tiled faces.
#[derive(Debug)]
pub struct CubemapTilesLayer {
    config: CubemapTilesConfig,
    mesh: GridMesh,
    materials: MaterialStore,
    base_material: MaterialId,
    stream: TileStream,
    base_pending: [bool; 6],
}

impl CubemapTilesLayer {
    pub fn new(config: CubemapTilesConfig) -> Result<Self, ConfigError> {
        validate_grid_dim("face_size", config.face_size, MAX_FACE_SIZE)?;
        validate_grid_dim("nb_tiles", config.nb_tiles, CUBE_SEGMENTS)?;
        if config.nb_tiles > config.face_size {
            return Err(ConfigError::GridTooDense {
                dim: "nb_tiles",
                value: config.nb_tiles,
                max: config.face_size,
            });
        }
        validate_template(&config.url_template, true)?;
        if let Some(base) = &config.base_url_template
            && !base.contains("{face}")
        {
            return Err(ConfigError::UrlTemplateMissingPlaceholder { placeholder: "face" });
        }

        let mut materials = MaterialStore::new();
        let base_material = materials.insert(Material::base(
            ImageData::solid(1, 1, [24, 24, 24, 255]),
            config.base_blur,
        ));
        let mesh = build_box_mesh(base_material, config.flip_top_bottom);

        let tile_size = config.face_size / config.nb_tiles;
        let stream = TileStream::new(
            config.streaming.concurrency,
            config.show_error_tile,
            tile_size,
        );
        let base_pending = [config.base_url_template.is_some(); 6];

        Ok(Self {
            config,
            mesh,
            materials,
            base_material,
            stream,
            base_pending,
        })
    }

    pub fn config(&self) -> &CubemapTilesConfig {
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

    /// The still-pending per-face base image fetches.
    pub fn base_urls(&self) -> Vec<(CubeFace, String)> {
        let Some(template) = &self.config.base_url_template else {
            return Vec::new();
        };
        CUBE_FACES
            .into_iter()
            .filter(|face| self.base_pending[face.index()])
            .map(|face| (face, template.replace("{face}", face.name())))
            .collect()
    }

    /// Applies (or discards) one face's base image fetch.
    pub fn complete_base_face(&mut self, face: CubeFace, result: Result<ImageData, ImageLoadError>) {
        if !self.base_pending[face.index()] {
            self.stream.bus.emit(
                self.stream.pass,
                "base-stale",
                format!("{face} base image discarded"),
            );
            return;
        }
        self.base_pending[face.index()] = false;
        match result {
            Ok(image) => {
                if image.width != image.height {
                    self.stream.bus.emit(
                        self.stream.pass,
                        "panorama-warning",
                        format!(
                            "{face} base image is {}x{}, expected a square cube face",
                            image.width, image.height
                        ),
                    );
                }
                let id = self
                    .materials
                    .insert(Material::base(image, self.config.base_blur));
                let s = CUBE_SEGMENTS;
                for cy in 0..s {
                    for cx in 0..s {
                        self.mesh
                            .set_group_material(cube_group_index(face, cx, cy), id);
                    }
                }
                self.stream.repaint.request();
                self.stream.bus.emit(
                    self.stream.pass,
                    "base-loaded",
                    format!("{face} base image applied"),
                );
            }
            Err(err) => {
                self.stream
                    .bus
                    .emit(self.stream.pass, "base-error", err.to_string());
            }
        }
    }

    /// Runs one visibility pass for the given camera and returns the tile
    /// fetches to start now.
    pub fn handle_view_change(&mut self, camera: &Camera) -> Vec<TileRequest> {
        self.stream.begin_pass();
        for (id, priority) in self.scan_visible(camera) {
            self.stream.offer(id, priority);
        }
        let started = self.stream.queue.pump();
        self.requests_for(started)
    }

    /// Applies one finished tile fetch and returns the follow-on fetches.
    pub fn complete_tile(
        &mut self,
        id: TileId,
        result: Result<ImageData, ImageLoadError>,
    ) -> Vec<TileRequest> {
        let TileId::Face { .. } = id else {
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

    /// Stops streaming for this panorama; late results become stale.
    pub fn teardown(&mut self) {
        self.base_pending = [false; 6];
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
            TileId::Face { face, col, row } => {
                expand_template(&self.config.url_template, Some(face), col, row)
            }
            TileId::Sphere { .. } => unreachable!("cubemap layer only builds face ids"),
        }
    }

    fn scan_visible(&self, camera: &Camera) -> Vec<(TileId, f64)> {
        let frustum = Frustum::from_view_proj(camera.view_proj());
        let rotation = self.mesh.rotation();
        let view_dir = camera.view_direction();

        let ts = CUBE_SEGMENTS / self.config.nb_tiles;
        let coarse = ts >= CUBE_SEGMENTS / 8;

        let mut candidates = Vec::new();
        for face in CUBE_FACES {
            for row in 0..self.config.nb_tiles {
                for col in 0..self.config.nb_tiles {
                    let samples = tile_sample_grid(col * ts, row * ts, ts, ts, coarse, coarse);
                    for (i, j) in samples {
                        let vertex = cube_grid_point_vertex_index(face, i, j);
                        let p = rotation.transform_point(self.mesh.position(vertex));
                        if frustum.contains_point(p) {
                            candidates.push((
                                TileId::Face { face, col, row },
                                tile_priority(p, view_dir, false),
                            ));
                            break;
                        }
                    }
                }
            }
        }
        candidates
    }

    fn patch_tile(&mut self, id: TileId, material: MaterialId) {
        let TileId::Face { face, col, row } = id else {
            return;
        };
        let ts = CUBE_SEGMENTS / self.config.nb_tiles;
        let x0 = col * ts;
        let y0 = row * ts;
        let flip = self.config.flip_top_bottom
            && matches!(face, CubeFace::Top | CubeFace::Bottom);

        for cy in y0..y0 + ts {
            for cx in x0..x0 + ts {
                self.mesh
                    .set_group_material(cube_group_index(face, cx, cy), material);

                let u0 = (cx - x0) as f64 / ts as f64;
                let u1 = (cx - x0 + 1) as f64 / ts as f64;
                let v0 = (cy - y0) as f64 / ts as f64;
                let v1 = (cy - y0 + 1) as f64 / ts as f64;

                let uvs = if flip {
                    quad_uvs(1.0 - u0, 1.0 - u1, 1.0 - v0, 1.0 - v1)
                } else {
                    quad_uvs(u0, u1, v0, v1)
                };
                self.mesh
                    .write_cell_uvs(cube_cell_first_vertex(face, cx, cy), &uvs);
            }
        }
    }
}

impl TiledLayer for CubemapTilesLayer {
    fn handle_view_change(&mut self, camera: &Camera) -> Vec<TileRequest> {
        CubemapTilesLayer::handle_view_change(self, camera)
    }

    fn complete_tile(
        &mut self,
        id: TileId,
        result: Result<ImageData, ImageLoadError>,
    ) -> Vec<TileRequest> {
        CubemapTilesLayer::complete_tile(self, id, result)
    }

    fn teardown(&mut self) {
        CubemapTilesLayer::teardown(self)
    }

    fn stats(&self) -> StreamStats {
        CubemapTilesLayer::stats(self)
    }

    fn take_repaint(&mut self) -> bool {
        CubemapTilesLayer::take_repaint(self)
    }

    fn drain_events(&mut self) -> Vec<Event> {
        CubemapTilesLayer::drain_events(self)
    }
}

/// Per-face frame: the world position of grid point (0, 0) plus the
/// per-segment steps along u (screen left to right from inside the box) and
/// v (top to bottom).
fn face_basis(face: CubeFace) -> (Vec3, Vec3, Vec3) {
    let h = BOX_HALF_EXTENT;
    let step = 2.0 * h / CUBE_SEGMENTS as f64;
    match face {
        CubeFace::Front => (
            Vec3::new(-h, h, -h),
            Vec3::new(step, 0.0, 0.0),
            Vec3::new(0.0, -step, 0.0),
        ),
        CubeFace::Back => (
            Vec3::new(h, h, h),
            Vec3::new(-step, 0.0, 0.0),
            Vec3::new(0.0, -step, 0.0),
        ),
        CubeFace::Left => (
            Vec3::new(-h, h, h),
            Vec3::new(0.0, 0.0, -step),
            Vec3::new(0.0, -step, 0.0),
        ),
        CubeFace::Right => (
            Vec3::new(h, h, -h),
            Vec3::new(0.0, 0.0, step),
            Vec3::new(0.0, -step, 0.0),
        ),
        CubeFace::Top => (
            Vec3::new(-h, h, h),
            Vec3::new(step, 0.0, 0.0),
            Vec3::new(0.0, 0.0, -step),
        ),
        CubeFace::Bottom => (
            Vec3::new(-h, -h, -h),
            Vec3::new(step, 0.0, 0.0),
            Vec3::new(0.0, 0.0, step),
        ),
    }
}

fn cube_grid_point_position(face: CubeFace, i: u32, j: u32) -> Vec3 {
    let (base, du, dv) = face_basis(face);
    base + du * i as f64 + dv * j as f64
}

pub(crate) fn cube_group_index(face: CubeFace, cx: u32, cy: u32) -> usize {
    let s = CUBE_SEGMENTS as usize;
    face.index() * s * s + cy as usize * s + cx as usize
}

/// First-vertex index of a cell, closed form: every cube cell is a 6-vertex
/// quad and faces are laid out consecutively.
pub(crate) fn cube_cell_first_vertex(face: CubeFace, cx: u32, cy: u32) -> usize {
    cube_group_index(face, cx, cy) * NB_VERTICES_BY_QUAD
}

/// Buffer index of the vertex at grid point (i, j) of a face; edge points
/// resolve to the matching corner of the last cell.
pub(crate) fn cube_grid_point_vertex_index(face: CubeFace, i: u32, j: u32) -> usize {
    let last = CUBE_SEGMENTS - 1;
    let ci = i.min(last);
    let cj = j.min(last);
    // Quad order is tl, bl, br, tl, br, tr.
    let offset = match (i > ci, j > cj) {
        (false, false) => 0,
        (false, true) => 1,
        (true, true) => 2,
        (true, false) => 5,
    };
    cube_cell_first_vertex(face, ci, cj) + offset
}

fn build_box_mesh(base_material: MaterialId, flip_top_bottom: bool) -> GridMesh {
    let s = CUBE_SEGMENTS;
    let sf = s as f64;

    let mut positions = Vec::new();
    let mut uvs = Vec::new();
    let mut groups = Vec::new();

    for face in CUBE_FACES {
        let flip = flip_top_bottom && matches!(face, CubeFace::Top | CubeFace::Bottom);
        for cy in 0..s {
            for cx in 0..s {
                let first = positions.len();
                positions.push(cube_grid_point_position(face, cx, cy));
                positions.push(cube_grid_point_position(face, cx, cy + 1));
                positions.push(cube_grid_point_position(face, cx + 1, cy + 1));
                positions.push(cube_grid_point_position(face, cx, cy));
                positions.push(cube_grid_point_position(face, cx + 1, cy + 1));
                positions.push(cube_grid_point_position(face, cx + 1, cy));

                let u0 = cx as f64 / sf;
                let u1 = (cx + 1) as f64 / sf;
                let v0 = cy as f64 / sf;
                let v1 = (cy + 1) as f64 / sf;
                let cell_uvs = if flip {
                    quad_uvs(1.0 - u0, 1.0 - u1, 1.0 - v0, 1.0 - v1)
                } else {
                    quad_uvs(u0, u1, v0, v1)
                };
                for uv in cell_uvs {
                    uvs.push(uv);
                }

                groups.push(MeshGroup {
                    first_vertex: first,
                    vertex_count: NB_VERTICES_BY_QUAD,
                    material: base_material,
                });
            }
        }
    }

    GridMesh::new(positions, uvs, groups)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{
        BOX_HALF_EXTENT, CUBE_SEGMENTS, CubemapTilesConfig, CubemapTilesLayer,
        cube_cell_first_vertex, cube_grid_point_vertex_index, cube_group_index,
    };
    use crate::equirect::quad_uvs;
    use crate::layer::ConfigError;
    use foundation::math::Vec3;
    use scene::camera::Camera;
    use scene::material::{ImageData, MaterialKind};
    use streaming::loader::ImageLoadError;
    use streaming::request::{CubeFace, TileId};

    fn config(nb_tiles: u32) -> CubemapTilesConfig {
        CubemapTilesConfig {
            face_size: 2048,
            nb_tiles,
            url_template: "tiles/{face}/{col}x{row}.jpg".into(),
            base_url_template: None,
            show_error_tile: true,
            base_blur: false,
            flip_top_bottom: false,
            retry: Default::default(),
            streaming: Default::default(),
        }
    }

    fn camera() -> Camera {
        Camera::new(1.2, 1.6, 0.1, 4.0 * BOX_HALF_EXTENT)
    }

    #[test]
    fn rejects_invalid_configs() {
        assert_eq!(
            CubemapTilesLayer::new(CubemapTilesConfig {
                face_size: 1000,
                ..config(2)
            })
            .err(),
            Some(ConfigError::GridDimensionNotPowerOfTwo {
                dim: "face_size",
                value: 1000
            })
        );
        assert_eq!(
            CubemapTilesLayer::new(CubemapTilesConfig {
                nb_tiles: 32,
                ..config(2)
            })
            .err(),
            Some(ConfigError::GridTooDense {
                dim: "nb_tiles",
                value: 32,
                max: CUBE_SEGMENTS
            })
        );
        assert_eq!(
            CubemapTilesLayer::new(CubemapTilesConfig {
                url_template: "tiles/{col}x{row}.jpg".into(),
                ..config(2)
            })
            .err(),
            Some(ConfigError::UrlTemplateMissingPlaceholder { placeholder: "face" })
        );
        assert_eq!(
            CubemapTilesLayer::new(CubemapTilesConfig {
                base_url_template: Some("base.jpg".into()),
                ..config(2)
            })
            .err(),
            Some(ConfigError::UrlTemplateMissingPlaceholder { placeholder: "face" })
        );
    }

    #[test]
    fn mesh_layout_matches_closed_form_arithmetic() {
        let layer = CubemapTilesLayer::new(config(2)).unwrap();
        let mesh = layer.mesh();
        let s = CUBE_SEGMENTS;

        assert_eq!(mesh.group_count(), 6 * (s * s) as usize);

        for (face, cx, cy) in [
            (CubeFace::Front, 0, 0),
            (CubeFace::Back, 3, 7),
            (CubeFace::Bottom, s - 1, s - 1),
        ] {
            let group = mesh.group(cube_group_index(face, cx, cy));
            assert_eq!(group.first_vertex, cube_cell_first_vertex(face, cx, cy));
            assert_eq!(group.vertex_count, 6);
        }
    }

    #[test]
    fn edge_grid_points_share_corner_vertices() {
        let layer = CubemapTilesLayer::new(config(2)).unwrap();
        let mesh = layer.mesh();
        let s = CUBE_SEGMENTS;
        let h = BOX_HALF_EXTENT;

        // Face centers sit on the axes.
        let front_center = mesh.position(cube_grid_point_vertex_index(CubeFace::Front, s / 2, s / 2));
        assert!((front_center - Vec3::new(0.0, 0.0, -h)).length() < 1e-12);
        let top_center = mesh.position(cube_grid_point_vertex_index(CubeFace::Top, s / 2, s / 2));
        assert!((top_center - Vec3::new(0.0, h, 0.0)).length() < 1e-12);

        // The bottom-right grid point of a face is stored as the last cell's
        // br corner and sits on the face corner.
        let p = mesh.position(cube_grid_point_vertex_index(CubeFace::Front, s, s));
        assert!((p - Vec3::new(h, -h, -h)).length() < 1e-12);
    }

    #[test]
    fn front_face_tiles_win_with_a_forward_camera() {
        let mut layer = CubemapTilesLayer::new(config(2)).unwrap();
        let cam = camera();

        let requests = layer.handle_view_change(&cam);
        assert_eq!(requests.len(), 4);
        assert!(requests.iter().all(|r| matches!(
            r.id,
            TileId::Face {
                face: CubeFace::Front,
                ..
            }
        )));
        // The view center is the shared corner of the four front tiles; the
        // first one enqueued among the zero-angle candidates wins.
        assert_eq!(
            requests[0].id,
            TileId::Face {
                face: CubeFace::Front,
                col: 1,
                row: 0
            }
        );
        assert_eq!(requests[0].url, "tiles/front/1x0.jpg");
    }

    #[test]
    fn patched_tile_round_trips_groups_and_uvs() {
        let mut layer = CubemapTilesLayer::new(config(2)).unwrap();
        let cam = camera();

        let requests = layer.handle_view_change(&cam);
        let id = requests[0].id;
        let TileId::Face { face, col, row } = id else {
            unreachable!()
        };

        layer.complete_tile(id, Ok(ImageData::solid(1024, 1024, [10, 20, 30, 255])));
        assert!(layer.take_repaint());

        let ts = CUBE_SEGMENTS / 2;
        let (x0, y0) = (col * ts, row * ts);
        let material = layer.mesh().group(cube_group_index(face, x0, y0)).material;
        assert_eq!(
            layer.materials().get(material).unwrap().kind,
            MaterialKind::Tile
        );

        for (cx, cy) in [(x0, y0), (x0 + ts - 1, y0 + ts - 1)] {
            let group = layer.mesh().group(cube_group_index(face, cx, cy));
            assert_eq!(group.material, material);

            let u0 = (cx - x0) as f64 / ts as f64;
            let u1 = (cx - x0 + 1) as f64 / ts as f64;
            let v0 = (cy - y0) as f64 / ts as f64;
            let v1 = (cy - y0 + 1) as f64 / ts as f64;
            for (offset, expect) in quad_uvs(u0, u1, v0, v1).iter().enumerate() {
                assert_eq!(layer.mesh().uv(group.first_vertex + offset), *expect);
            }
        }
    }

    #[test]
    fn flip_top_bottom_mirrors_top_face_uvs() {
        let mut layer = CubemapTilesLayer::new(CubemapTilesConfig {
            flip_top_bottom: true,
            ..config(2)
        })
        .unwrap();
        let mut cam = camera();
        cam.set_orientation(0.0, std::f64::consts::FRAC_PI_2);

        let requests = layer.handle_view_change(&cam);
        let request = requests
            .iter()
            .find(|r| {
                matches!(
                    r.id,
                    TileId::Face {
                        face: CubeFace::Top,
                        ..
                    }
                )
            })
            .expect("looking straight up must surface a top-face tile");
        let id = request.id;
        let TileId::Face { face, col, row } = id else {
            unreachable!()
        };

        layer.complete_tile(id, Ok(ImageData::solid(1024, 1024, [10, 20, 30, 255])));

        let ts = CUBE_SEGMENTS / 2;
        let (cx, cy) = (col * ts, row * ts);
        let group = layer.mesh().group(cube_group_index(face, cx, cy));
        let u1 = 1.0 / ts as f64;
        let v1 = 1.0 / ts as f64;
        for (offset, expect) in quad_uvs(1.0, 1.0 - u1, 1.0, 1.0 - v1).iter().enumerate() {
            assert_eq!(layer.mesh().uv(group.first_vertex + offset), *expect);
        }
    }

    #[test]
    fn concurrency_one_streams_the_whole_visible_set_in_order() {
        let mut layer = CubemapTilesLayer::new(CubemapTilesConfig {
            streaming: streaming::config::StreamingConfig { concurrency: 1 },
            ..config(2)
        })
        .unwrap();
        let cam = camera();

        let mut requests = layer.handle_view_change(&cam);
        assert_eq!(requests.len(), 1);
        let candidates = layer.stats().tracked;

        let mut fetched = Vec::new();
        while let Some(request) = requests.pop() {
            fetched.push(request.id);
            assert!(layer.stats().running <= 1);
            requests = layer.complete_tile(
                request.id,
                Ok(ImageData::solid(64, 64, [1, 1, 1, 255])),
            );
        }

        assert_eq!(fetched.len(), candidates);
        assert_eq!(layer.stats().tracked, 0);
        assert_eq!(layer.stats().settled_done as usize, candidates);
    }

    #[test]
    fn per_face_base_images_land_on_their_face_only() {
        let mut layer = CubemapTilesLayer::new(CubemapTilesConfig {
            base_url_template: Some("base/{face}.jpg".into()),
            ..config(2)
        })
        .unwrap();

        let urls = layer.base_urls();
        assert_eq!(urls.len(), 6);
        assert!(urls.contains(&(CubeFace::Left, "base/left.jpg".into())));

        let placeholder = layer.base_material();
        layer.complete_base_face(CubeFace::Front, Ok(ImageData::solid(256, 256, [5; 4])));
        assert!(layer.take_repaint());
        assert_eq!(layer.base_urls().len(), 5);

        let front = layer
            .mesh()
            .group(cube_group_index(CubeFace::Front, 0, 0))
            .material;
        assert_ne!(front, placeholder);
        let back = layer
            .mesh()
            .group(cube_group_index(CubeFace::Back, 0, 0))
            .material;
        assert_eq!(back, placeholder);

        // After teardown a late-resolving face base is discarded.
        layer.teardown();
        layer.complete_base_face(CubeFace::Left, Ok(ImageData::solid(256, 256, [5; 4])));
        let left = layer
            .mesh()
            .group(cube_group_index(CubeFace::Left, 0, 0))
            .material;
        assert_eq!(left, placeholder);
    }

    #[test]
    fn failed_tile_fetch_is_contained_and_final() {
        let mut layer = CubemapTilesLayer::new(config(2)).unwrap();
        let cam = camera();

        let requests = layer.handle_view_change(&cam);
        let id = requests[0].id;
        layer.complete_tile(
            id,
            Err(ImageLoadError::Fetch {
                url: requests[0].url.clone(),
                reason: "404".into(),
            }),
        );
        assert_eq!(layer.stats().settled_error, 1);

        let TileId::Face { face, col, row } = id else {
            unreachable!()
        };
        let ts = CUBE_SEGMENTS / 2;
        let material = layer
            .mesh()
            .group(cube_group_index(face, col * ts, row * ts))
            .material;
        assert_eq!(
            layer.materials().get(material).unwrap().kind,
            MaterialKind::Error
        );

        // The failed tile stays seen: another pass never refetches it.
        let again = layer.handle_view_change(&cam);
        assert!(again.iter().all(|r| r.id != id));
    }

    #[test]
    fn all_faces_become_visible_somewhere() {
        let mut layer = CubemapTilesLayer::new(config(1)).unwrap();
        let mut seen_faces = std::collections::BTreeSet::new();
        let mut cam = camera();

        for (yaw, pitch) in [
            (0.0, 0.0),
            (std::f64::consts::FRAC_PI_2, 0.0),
            (std::f64::consts::PI, 0.0),
            (-std::f64::consts::FRAC_PI_2, 0.0),
            (0.0, std::f64::consts::FRAC_PI_2),
            (0.0, -std::f64::consts::FRAC_PI_2),
        ] {
            cam.set_orientation(yaw, pitch);
            let mut requests = layer.handle_view_change(&cam);
            while let Some(request) = requests.pop() {
                let TileId::Face { face, .. } = request.id else {
                    unreachable!()
                };
                seen_faces.insert(face);
                let next = layer.complete_tile(request.id, Ok(ImageData::solid(8, 8, [0; 4])));
                requests.extend(next);
            }
        }

        assert_eq!(seen_faces.len(), 6);
        assert_eq!(layer.stats().settled_done, 6);
    }
}
