/// Address decoding to and from the native Ed25519 key-hash form
pub mod address;
/// Unsigned envelope assembly
pub mod builder;
/// Input selection and remainder computation
pub mod selection;
/// Broadcast of signed envelopes
pub mod sender;
/// Draft, envelope, signed-transaction and status types
pub mod types;

pub use address::*;
pub use builder::*;
pub use selection::*;
pub use sender::*;
pub use types::*;
