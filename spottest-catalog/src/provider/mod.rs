//! Remote page sources

pub mod spotify;

pub use spotify::{SpotifyClient, SpotifyPager};
