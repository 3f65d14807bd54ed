pub mod cache;
pub mod play;
pub mod prefetch;
pub mod reset;
pub mod select;
pub mod status;
pub mod tubes;
