/// Authentication module
///
/// Token encoding and verification, the request gate, password handling,
/// email verification, password recovery and the session flows built on top
/// of them.

pub mod claims;
pub mod clock;
pub mod codec;
pub mod gate;
pub mod issuer;
pub mod password;
pub mod recovery;
pub mod session;
pub mod verification;
pub mod verifier;

pub use claims::{AuthenticatedSubject, Claims};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{TokenCodec, TokenError};
pub use gate::AuthGate;
pub use issuer::{TokenIssuer, TOKEN_LIFETIME_SECONDS};
pub use password::{hash_password, validate_password_strength, verify_password};
pub use session::{MessageResponse, SessionService};
pub use verifier::TokenVerifier;
