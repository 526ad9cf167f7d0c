pub mod atlas;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod definition;
pub mod events;
pub mod history;
pub mod images;
pub mod model;
pub mod placement;
pub mod refcount;
pub mod scene;
pub mod toolbar;
pub mod watch;

pub use catalog::{CatalogPipeline, ScanState, TickReport};
pub use model::{MapHost, ObjectKey, ObjectModel};
pub use toolbar::ObjectToolbar;
