/// Middleware module
///
/// Applies the Auth Gate to protected scopes.

mod auth_gate;

pub use auth_gate::AuthGateMiddleware;
