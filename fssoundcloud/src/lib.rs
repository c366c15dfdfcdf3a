//! # fssoundcloud - SoundCloud client for FreeSound
//!
//! Resolves SoundCloud URLs and locates playable HLS streams.
//!
//! - [`client`]: the [`SoundCloudClient`] and its builder
//! - [`client_id`]: discovery, validation and caching of the rotating
//!   `client_id` the API requires
//! - [`resolver`]: `/resolve` with 401 recovery, batch `/tracks?ids=`
//! - [`locator`]: transcoding selection and stream URL exchange
//! - [`drm`]: encrypted stream detection
//! - [`models`]: upstream payloads and the normalized [`ResolvedItem`]
//! - [`config_ext`]: settings under `sources.soundcloud`
//!
//! ## Example
//!
//! ```no_run
//! use fsconfig::get_config;
//! use fssoundcloud::SoundCloudConfigExt;
//!
//! # async fn example() -> fssoundcloud::Result<()> {
//! let client = get_config().soundcloud_client()?;
//! let album = client.resolve("https://soundcloud.com/artist/sets/album").await?;
//! for (i, track) in album.children.iter().enumerate() {
//!     println!("{:02}. {} - {}", i + 1, track.artist, track.title);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod client_id;
pub mod config_ext;
pub mod drm;
pub mod error;
pub mod locator;
pub mod models;
pub mod resolver;

pub use client::{ClientBuilder, SoundCloudClient};
pub use client_id::ClientIdCache;
pub use config_ext::SoundCloudConfigExt;
pub use drm::{check_drm_in_content, is_drm_protected_protocol, is_drm_protected_url};
pub use error::{Result, SoundCloudError};
pub use models::{ItemInfo, MediaKind, ResolvedItem, StreamTarget, Track};
pub use resolver::BATCH_SIZE;
