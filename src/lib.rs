pub mod bitmap;
pub mod chunks;
pub mod dir;
pub mod error;
pub mod extent;
pub mod indirect;
pub mod inode;
pub mod io;
pub mod metadata;
pub mod snapshot;
pub mod types;
pub mod validate;

pub use error::{RecoveryError, Result};
pub use io::ImageReader;
pub use metadata::{BlockGroup, FilesystemMetadata, GroupFlags};
pub use snapshot::{FileEntry, Snapshot};
pub use types::{BlockRange, Chunk, Filetype, InodeFlags};
