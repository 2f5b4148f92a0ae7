mod authenticate;
mod cipher;
mod hash;
mod middleware;
mod token;

pub use authenticate::{Caller, authenticate, extract_bearer};
pub use cipher::ProviderTokenCipher;
pub use hash::{HashParams, KeyHasher, generate_verifier};
pub use middleware::{AuthError, RequireCaller};
pub use token::{BearerClaims, TokenCodec};
