pub mod agent;
pub mod auth;
pub mod error;
pub mod tokens;

pub use agent::{MockPolicyAgent, PolicyAgent, RelationEngineAgent};
pub use auth::AuthService;
pub use error::AuthError;
pub use tokens::Tokenizer;
