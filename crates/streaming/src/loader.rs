use scene::material::{ImageData, Material, MaterialId, MaterialStore};

/// An individual tile fetch failed. Fully contained: the tile gets the
/// shared placeholder (if enabled) and the error never propagates past the
/// layer or emits a viewer-wide failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLoadError {
    Fetch { url: String, reason: String },
}

impl std::fmt::Display for ImageLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageLoadError::Fetch { url, reason } => {
                write!(f, "image fetch failed: {url}: {reason}")
            }
        }
    }
}

impl std::error::Error for ImageLoadError {}

/// The external image pipeline: given a URL, produce decoded pixels.
///
/// Decoding, caching and transport all live behind this boundary. The
/// engine imposes no timeout of its own; a stalled fetch holds its
/// concurrency slot until the source itself errors or the panorama is torn
/// down.
pub trait ImageSource {
    fn load_image(&mut self, url: &str) -> Result<ImageData, ImageLoadError>;
}

/// Builds mesh materials from fetch results.
///
/// Successful tiles each get their own material. Failures share a single
/// lazily-built placeholder, created at most once per panorama lifetime and
/// sized to one tile.
#[derive(Debug)]
pub struct TileLoader {
    show_error_tile: bool,
    error_tile_size: u32,
    error_material: Option<MaterialId>,
}

impl TileLoader {
    pub fn new(show_error_tile: bool, error_tile_size: u32) -> Self {
        Self {
            show_error_tile,
            error_tile_size,
            error_material: None,
        }
    }

    pub fn tile_material(&self, store: &mut MaterialStore, image: ImageData) -> MaterialId {
        store.insert(Material::tile(image))
    }

    /// The shared placeholder material, or `None` when error tiles are
    /// disabled (failed cells then keep the base material).
    pub fn error_material(&mut self, store: &mut MaterialStore) -> Option<MaterialId> {
        if !self.show_error_tile {
            return None;
        }
        if self.error_material.is_none() {
            self.error_material =
                Some(store.insert(Material::error_placeholder(self.error_tile_size)));
        }
        self.error_material
    }

    /// Drops the cached placeholder handle; teardown replaces the material
    /// store, so the handle must not outlive it.
    pub fn reset(&mut self) {
        self.error_material = None;
    }
}

#[cfg(test)]
mod tests {
    use super::TileLoader;
    use scene::material::{ImageData, MaterialKind, MaterialStore};

    #[test]
    fn error_material_is_built_once_and_shared() {
        let mut store = MaterialStore::new();
        let mut loader = TileLoader::new(true, 32);

        let a = loader.error_material(&mut store).unwrap();
        let b = loader.error_material(&mut store).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(a).unwrap().kind, MaterialKind::Error);
    }

    #[test]
    fn error_material_disabled_yields_none() {
        let mut store = MaterialStore::new();
        let mut loader = TileLoader::new(false, 32);
        assert!(loader.error_material(&mut store).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn reset_forgets_the_placeholder_handle() {
        let mut store = MaterialStore::new();
        let mut loader = TileLoader::new(true, 32);
        let first = loader.error_material(&mut store).unwrap();

        loader.reset();
        let mut fresh_store = MaterialStore::new();
        let second = loader.error_material(&mut fresh_store).unwrap();
        assert_eq!(first.index(), second.index());
        assert_eq!(fresh_store.len(), 1);
    }

    #[test]
    fn tile_material_keeps_the_image() {
        let mut store = MaterialStore::new();
        let loader = TileLoader::new(true, 32);
        let id = loader.tile_material(&mut store, ImageData::solid(4, 4, [9, 9, 9, 255]));
        assert_eq!(store.get(id).unwrap().image.width, 4);
    }
}
