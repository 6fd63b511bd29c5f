//! Graph memory: the MEMORIZE/RECALL/FORGET service and the consolidation
//! pipeline that folds raw correlations into summary nodes.

mod consolidator;
mod service;

pub use consolidator::{six_hour_window, Consolidator};
pub use service::MemoryService;
