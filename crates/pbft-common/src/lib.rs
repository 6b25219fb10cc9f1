pub mod config;
pub mod crypto;
pub mod errors;
pub mod network;
pub mod serde_helpers;
pub mod types;
pub mod wallet;

pub use config::{min_approvals, PbftConfig};
pub use crypto::{Digest, Keypair, PublicKey, Signature};
pub use errors::PbftError;
pub use network::{handle_connection, send_message_to_peer, InboundHandler, NetworkTrait, WsSink};
pub use types::{Block, Envelope, MessageKind, Payload, PhaseMessage, Transaction};
pub use wallet::Wallet;
