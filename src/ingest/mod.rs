pub mod backoff;
pub mod feed;
pub mod normalizer;
pub mod session;
