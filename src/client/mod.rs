//! The `client` module holds both ends of a broker connection.
//!
//! - `ClientHandle`: the broker's handle on one accepted connection (write
//!   half plus close signal), stored in the registry.
//! - `PubSubClient`: a TCP client that speaks the line protocol, used by the
//!   `client` subcommand and by the end-to-end tests.

pub mod handle;
pub mod remote;

pub use handle::ClientHandle;
pub use remote::PubSubClient;
