use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use layers::cubemap::{CubemapTilesConfig, CubemapTilesLayer};
use layers::equirect::{EquirectTilesConfig, EquirectTilesLayer};
use layers::layer::TiledLayer;
use scene::camera::Camera;
use scene::material::ImageData;
use streaming::config::StreamingConfig;
use streaming::loader::{ImageLoadError, ImageSource};
use streaming::request::TileRequest;

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Mode {
    Equirect,
    Cubemap,
}

/// Drives the tile streaming engine over a scripted camera sweep and logs
/// what it fetches, patches and discards.
#[derive(Debug, Parser)]
#[command(name = "viewer")]
struct Args {
    #[arg(long, value_enum, default_value = "equirect")]
    mode: Mode,

    /// Equirectangular tile columns.
    #[arg(long, default_value_t = 16)]
    cols: u32,

    /// Equirectangular tile rows.
    #[arg(long, default_value_t = 8)]
    rows: u32,

    /// Cubemap tiles per face edge.
    #[arg(long, default_value_t = 2)]
    nb_tiles: u32,

    /// Maximum in-flight fetches.
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Camera sweep steps.
    #[arg(long, default_value_t = 48)]
    steps: u32,

    /// Fail every Nth fetch to exercise the error path (0 disables).
    #[arg(long, default_value_t = 0)]
    fail_every: u32,
}

/// Stands in for the network + decode pipeline: every URL yields a solid
/// color derived from the URL, so each tile is visually distinguishable.
struct SyntheticImages {
    tile_size: u32,
    loads: u32,
    fail_every: u32,
}

impl SyntheticImages {
    fn new(tile_size: u32, fail_every: u32) -> Self {
        Self {
            tile_size,
            loads: 0,
            fail_every,
        }
    }
}

impl ImageSource for SyntheticImages {
    fn load_image(&mut self, url: &str) -> Result<ImageData, ImageLoadError> {
        self.loads += 1;
        if self.fail_every > 0 && self.loads % self.fail_every == 0 {
            return Err(ImageLoadError::Fetch {
                url: url.into(),
                reason: "synthetic failure".into(),
            });
        }

        // FNV-1a over the URL picks the tile color.
        let mut hash: u32 = 2166136261;
        for b in url.bytes() {
            hash ^= b as u32;
            hash = hash.wrapping_mul(16777619);
        }
        let rgba = [(hash >> 16) as u8, (hash >> 8) as u8, hash as u8, 255];

        // URLs marked 2x1 get equirectangular proportions.
        let (w, h) = if url.contains("2x1") {
            (self.tile_size * 2, self.tile_size)
        } else {
            (self.tile_size, self.tile_size)
        };
        Ok(ImageData::solid(w, h, rgba))
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let streaming = StreamingConfig {
        concurrency: args.concurrency,
    };

    match args.mode {
        Mode::Equirect => {
            let config = EquirectTilesConfig {
                width: args.cols * 512,
                cols: args.cols,
                rows: args.rows,
                url_template: "tiles/{col}x{row}.jpg".into(),
                base_url: Some("pano_2x1_base.jpg".into()),
                show_error_tile: true,
                base_blur: true,
                retry: Default::default(),
                streaming,
            };
            let mut layer = match EquirectTilesLayer::new(config) {
                Ok(layer) => layer,
                Err(err) => {
                    warn!("invalid panorama config: {err}");
                    std::process::exit(1);
                }
            };
            let mut source = SyntheticImages::new(512, args.fail_every);

            if let Some(url) = layer.base_url().map(str::to_string) {
                layer.complete_base(source.load_image(&url));
            }
            drive(&mut layer, &mut source, args.steps);
        }
        Mode::Cubemap => {
            let config = CubemapTilesConfig {
                face_size: 2048,
                nb_tiles: args.nb_tiles,
                url_template: "tiles/{face}/{col}x{row}.jpg".into(),
                base_url_template: Some("base/{face}.jpg".into()),
                show_error_tile: true,
                base_blur: true,
                flip_top_bottom: false,
                retry: Default::default(),
                streaming,
            };
            let mut layer = match CubemapTilesLayer::new(config) {
                Ok(layer) => layer,
                Err(err) => {
                    warn!("invalid panorama config: {err}");
                    std::process::exit(1);
                }
            };
            let mut source = SyntheticImages::new(1024, args.fail_every);

            for (face, url) in layer.base_urls() {
                layer.complete_base_face(face, source.load_image(&url));
            }
            drive(&mut layer, &mut source, args.steps);
        }
    }
}

/// One full yaw turn with a pitch wobble, completing every fetch the layer
/// hands out before moving to the next step.
fn drive(layer: &mut impl TiledLayer, source: &mut impl ImageSource, steps: u32) {
    let mut camera = Camera::new(1.2, 16.0 / 9.0, 0.1, 50.0);
    let mut repaints = 0u64;

    for step in 0..steps {
        let t = step as f64 / steps.max(1) as f64;
        camera.set_orientation(
            t * std::f64::consts::TAU,
            (t * 2.0 * std::f64::consts::TAU).sin() * 0.6,
        );

        let mut requests = layer.handle_view_change(&camera);
        while let Some(TileRequest { id, url }) = requests.pop() {
            let result = source.load_image(&url);
            requests.extend(layer.complete_tile(id, result));
        }

        if layer.take_repaint() {
            repaints += 1;
        }
        for event in layer.drain_events() {
            match event.kind {
                "tile-error" | "base-error" | "panorama-warning" => {
                    warn!(pass = event.pass, kind = event.kind, "{}", event.message)
                }
                _ => info!(pass = event.pass, kind = event.kind, "{}", event.message),
            }
        }
    }

    let stats = layer.stats();
    info!(
        seen = stats.seen,
        done = stats.settled_done,
        errors = stats.settled_error,
        repaints,
        "sweep finished"
    );
    layer.teardown();
}
