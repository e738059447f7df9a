pub mod view;

pub use view::{ByteView, Endianness};
