//! NFC tag channel for vehicle key validation.
//!
//! A [`TagChannel`] streams tags from a reader, parses them into canonical
//! readings, and validates them against a [`TagPolicy`] by selecting the
//! vehicle applet over an ISO-DEP style sub-session.

pub mod apdu;
pub mod channel;
pub mod error;
pub mod mock;
pub mod reader;
pub mod types;

pub use apdu::{select_command, split_trailer, STATUS_FAILED, STATUS_OK, VEHICLE_AID};
pub use channel::TagChannel;
pub use error::{Result, TagError};
pub use mock::{MockReader, MockSessionBehavior, MockSubSession, MockTag};
pub use reader::{RawTag, ReaderState, SubSession, TagReader};
pub use types::{TagPolicy, TagReading, ValidatedTag};
