//! Annotated rendering and the display surface that presents it.

mod display;
mod render;

pub use display::{display_for, DisplaySurface, FileDisplay, NullDisplay, PromptDisplay};
pub use render::{class_color, instance_label, load_font, system_font, Visualizer};
