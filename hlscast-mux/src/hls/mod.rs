pub mod playlist;

pub use playlist::{PlaylistBuilder, PlaylistConfig, PlaylistEntry};
