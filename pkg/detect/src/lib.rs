//! Install-image heuristics: guess a guest's OS, version and architecture
//! from the image file name and its volume label.

pub mod image;
pub mod iso;
pub mod label;

pub use image::parse_image_name;
pub use iso::{collect_images, parse_iso};
pub use label::{BlkidProbe, LabelProbe, NoLabel};
