pub(crate) mod bucket_table;
pub mod sizing;

pub use sizing::MAXIMUM_CAPACITY;
