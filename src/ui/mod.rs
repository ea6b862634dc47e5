pub mod loading;
pub mod view;

pub use loading::{LoadingTick, LoadingTicker};
pub use view::{derive_view, render, ViewState};
