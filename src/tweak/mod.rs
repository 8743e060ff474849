//! Live-variable tweaking over HTTP.
//!
//! Values registered in a [`TweakRegistry`] show up in a browser page served
//! by a [`TweakServer`]. The page long-polls `GET /resource?<serial>` for
//! state changes and posts edits as a flat JSON object to `POST /resource`.
//! Edits only reach the program's values when it calls
//! [`TweakRegistry::sync`], typically once per frame.
//!
//! ```no_run
//! use loophttp::config::TweakConfig;
//! use loophttp::tweak::{TweakRegistry, TweakServer};
//!
//! let registry = TweakRegistry::new();
//! let gain = registry.tweak_with_hint("gain", "float 0.0 1.0", 0.5f32);
//! let _server = TweakServer::spawn(registry.clone(), &TweakConfig::default())?;
//! loop {
//!     registry.sync();
//!     let _ = gain.get();
//!     # break;
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod registry;
pub mod service;
pub mod value;

pub use registry::{Tweak, TweakRegistry};
pub use service::{TweakServer, TweakService};
pub use value::{TweakError, Tweakable};
