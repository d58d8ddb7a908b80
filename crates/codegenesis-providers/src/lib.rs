//! Remote collaborators the gateway delegates to.
//!
//! - [`supabase`]: the persistence collaborator over PostgREST.
//! - [`generate`]: the remote code-generation endpoint.
//! - [`identity`]: turns a bearer token into a user id.

pub mod generate;
pub mod identity;
pub mod supabase;

pub use generate::{CodeGenerator, GeneratedFiles, GenerationRequest, HttpGenerator, ModelCredentials};
pub use identity::{AnonymousIdentity, IdentityVerifier, RemoteVerifier, StaticTokens};
pub use supabase::SupabaseStore;
