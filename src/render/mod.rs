pub mod background;
pub mod canvas;
pub mod compositor;
pub mod scene;
pub mod text;
