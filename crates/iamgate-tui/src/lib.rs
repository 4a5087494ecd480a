//! Terminal view root for iamgate.

pub mod app;
pub mod terminal;
pub mod view;

pub use app::{ViewOptions, render_once, run};
pub use view::{Action, ViewModel};
