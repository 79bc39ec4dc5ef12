// Library exports for reviewdoc

pub mod config;
pub mod media;
pub mod reconcile;
pub mod richtext;
pub mod session;
pub mod upload;
