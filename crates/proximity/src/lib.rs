pub mod backend;
pub mod channel;
pub mod error;
pub mod mock;
pub mod radio;
pub mod types;

pub use backend::{BtleRadio, ACCESS_CHARACTERISTIC_UUID, ACCESS_SERVICE_UUID};
pub use channel::ProximityChannel;
pub use error::{ErrorCategory, ProximityError, Result};
pub use mock::{MockLinkBehavior, MockRadio};
pub use radio::{PeerLink, Radio, RadioState, ScanFilter};
pub use types::{
    CharacteristicProps, ConnectionState, PeerAddress, ProximityPeer, ProximityResult, WriteMode,
};
