pub mod constants;
pub mod record;
pub mod wire;

pub use record::{Priority, Record, RecordKind};
