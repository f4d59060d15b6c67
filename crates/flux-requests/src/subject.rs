//! External subject directory — the service that owns human accounts.
//! Out of scope here; only its interface is specified.
//!
//! Grounded on `original_source/flux/models/request.py`'s `_get_user`
//! (binds to `security/1.0/subject` through the mesh RPC layer; any
//! failure there is swallowed and treated as "no such subject").

use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Subject {
    pub id: Uuid,
    pub name: String,
    pub firstname: String,
    pub lastname: String,
    pub email: Option<String>,
}

#[async_trait]
pub trait SubjectDirectory: Send + Sync + 'static {
    /// `None` covers both "no such subject" and any transport failure —
    /// the original logs and swallows both identically in `_get_user`.
    async fn get(&self, id: Uuid) -> Option<Subject>;
}
