//! JWT token encoding, decoding, and claims management.

pub mod claims;
pub mod decoder;
pub mod encoder;
pub mod service;

pub use claims::{Claims, TokenType};
pub use decoder::JwtDecoder;
pub use encoder::{JwtEncoder, TokenPair};
pub use service::TokenService;
