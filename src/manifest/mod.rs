//! Content manifest
//!
//! The manifest is the canonical, versioned index of which stitches exist,
//! per tube and thread, in a fixed order. It drives lazy seeding of tube
//! positions and the look-ahead window of the content resolver.

pub mod models;

pub use models::{
    ContentManifest, ManifestError, StitchReference, ThreadManifest, TubeManifest,
};
