pub mod cubemap;
pub mod equirect;
pub mod layer;

pub use cubemap::*;
pub use equirect::*;
pub use layer::*;
