pub mod common;
pub mod dimensions;
pub mod image;
pub mod model;

pub use common::*;
pub use dimensions::*;
pub use image::*;
pub use model::*;
