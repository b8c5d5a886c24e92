pub mod defs;
pub mod memory;
pub mod state;

pub use defs::{
    ClassifyItem, ClassifyReply, ClassifyRequest, Classifier, DenyStore, LabelScore, RenderSink,
    RenderedMedia,
};
pub use memory::MemoryDenyStore;
pub use state::SqliteDenyStore;
