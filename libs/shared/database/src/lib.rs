pub mod error;
pub mod supabase;

pub use error::{with_timeout, DatabaseError};
pub use supabase::SupabaseClient;
