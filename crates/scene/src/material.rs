/// Decoded image payload, RGBA8, row-major from the top-left corner.
///
/// Decoding happens outside the engine; this is the opaque result handed
/// across the image-source boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), (width * height * 4) as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            pixels.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MaterialKind {
    /// The shared low-resolution material the whole mesh starts with.
    Base { blur: bool },
    /// A single streamed tile.
    Tile,
    /// The one shared placeholder for failed tiles.
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub kind: MaterialKind,
    pub image: ImageData,
}

impl Material {
    pub fn base(image: ImageData, blur: bool) -> Self {
        Self {
            kind: MaterialKind::Base { blur },
            image,
        }
    }

    pub fn tile(image: ImageData) -> Self {
        Self {
            kind: MaterialKind::Tile,
            image,
        }
    }

    /// Placeholder for failed tiles: a warning triangle with an exclamation
    /// bar, drawn procedurally onto a dark square. One instance is shared by
    /// every failed tile of a panorama.
    pub fn error_placeholder(size: u32) -> Self {
        let s = size.max(8);
        let mut pixels = vec![0u8; (s * s * 4) as usize];
        let sf = s as f64;
        for y in 0..s {
            for x in 0..s {
                let px = (x as f64 + 0.5) / sf;
                let py = (y as f64 + 0.5) / sf;
                let idx = ((y * s + x) * 4) as usize;

                // Upward triangle with apex at (0.5, 0.15), base y = 0.85.
                let half_width_at = |v: f64| 0.35 * ((v - 0.15) / 0.7).clamp(0.0, 1.0);
                let inside = py >= 0.15 && py <= 0.85 && (px - 0.5).abs() <= half_width_at(py);
                // Exclamation mark: stem plus dot, centered.
                let stem = (px - 0.5).abs() < 0.04 && py >= 0.35 && py <= 0.62;
                let dot = (px - 0.5).abs() < 0.04 && py >= 0.68 && py <= 0.76;

                let rgba: [u8; 4] = if inside && (stem || dot) {
                    [32, 32, 32, 255]
                } else if inside {
                    [255, 200, 0, 255]
                } else {
                    [48, 48, 48, 255]
                };
                pixels[idx..idx + 4].copy_from_slice(&rgba);
            }
        }
        Self {
            kind: MaterialKind::Error,
            image: ImageData::new(s, s, pixels),
        }
    }
}

/// Index handle into a [`MaterialStore`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MaterialId(u32);

impl MaterialId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Owning store for the materials a panorama layer creates. Handles stay
/// valid for the life of the store; teardown replaces the whole store.
#[derive(Debug, Default)]
pub struct MaterialStore {
    materials: Vec<Material>,
}

impl MaterialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, material: Material) -> MaterialId {
        let id = MaterialId(self.materials.len() as u32);
        self.materials.push(material);
        id
    }

    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{ImageData, Material, MaterialKind, MaterialStore};

    #[test]
    fn store_hands_out_stable_ids() {
        let mut store = MaterialStore::new();
        let a = store.insert(Material::base(ImageData::solid(2, 1, [0, 0, 0, 255]), false));
        let b = store.insert(Material::tile(ImageData::solid(2, 2, [255, 0, 0, 255])));
        assert_ne!(a, b);
        assert_eq!(store.get(a).unwrap().kind, MaterialKind::Base { blur: false });
        assert_eq!(store.get(b).unwrap().image.width, 2);
    }

    #[test]
    fn error_placeholder_is_opaque_and_sized() {
        let m = Material::error_placeholder(64);
        assert_eq!(m.kind, MaterialKind::Error);
        assert_eq!(m.image.width, 64);
        assert_eq!(m.image.pixels.len(), 64 * 64 * 4);
        // Every pixel fully opaque.
        assert!(m.image.pixels.chunks_exact(4).all(|p| p[3] == 255));
        // The glyph actually drew something: more than one distinct color.
        let first = &m.image.pixels[0..4];
        assert!(m.image.pixels.chunks_exact(4).any(|p| p != first));
    }

    #[test]
    fn aspect_ratio_of_full_equirect_is_two() {
        assert_eq!(ImageData::solid(8, 4, [0; 4]).aspect_ratio(), 2.0);
    }
}
