//! Built-in designs.

mod color_block;
mod div_preview;

pub use color_block::ColorBlock;
pub use div_preview::DivisionPreview;
