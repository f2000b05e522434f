pub mod extraction;
pub mod structuring;
pub mod processor; // process(document): the single per-file entry point
pub mod batch; // bounded worker pool for bulk submissions
