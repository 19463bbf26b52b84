use std::sync::Arc;

use unison_collab::Collab;

pub struct ServerContext<Db> {
    pub collab: Arc<Collab<Db>>,
}

impl<Db> Clone for ServerContext<Db> {
    fn clone(&self) -> Self {
        Self {
            collab: self.collab.clone(),
        }
    }
}
