pub mod batch;
pub mod bencode;
pub mod error;
pub mod fileset;
pub mod hash;
pub mod metainfo;
pub mod modify;
pub mod piecelen;
pub mod presets;
pub mod progress;
pub mod seasonpack;
pub mod trackerrules;
pub mod verify;

pub use error::{Error, Result};
pub use metainfo::{CreateOptions, CreateResult, MetaInfo};
pub use modify::{ModifyOptions, ModifyResult};
pub use verify::{VerifyOptions, VerifyReport};
