pub mod block;
pub mod element;
pub mod error;
pub mod file;
pub mod hdu;
pub mod header;
pub mod image;
pub mod io;
pub mod metadata;
pub mod offset;
pub mod reactor;
pub mod value;

pub use block::{BLOCK_SIZE, CARDS_PER_BLOCK, CARD_SIZE};
pub use element::{Element, ElementKind};
pub use error::{Error, ErrorKind, Result};
pub use file::{FitsReader, FitsWriter, NewFitsWriter};
pub use hdu::{Hdu, HduLayout, HduSchema};
pub use image::{HduVisitor, ImageHdu};
pub use io::{MemoryFile, RandomAccess};
pub use metadata::{MetadataRecord, MetadataSet};
pub use reactor::{Completion, Reactor, Scope};
pub use value::{FromValue, Value};
