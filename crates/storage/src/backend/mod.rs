pub mod libmdbx;
pub mod memory;
