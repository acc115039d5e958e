mod annotate;
mod backend;
mod backends;
pub mod labels;
mod registry;
mod result;

pub use annotate::annotate;
pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use registry::BackendRegistry;
pub use result::{BoundingBox, Detection};
