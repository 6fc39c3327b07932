pub mod events;
pub mod gallery;
pub mod generation;
pub mod session;
