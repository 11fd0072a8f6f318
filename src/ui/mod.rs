pub mod app;
pub mod common;
pub mod text_renderer;
pub mod window;

pub use app::run;
pub use common::UiState;
