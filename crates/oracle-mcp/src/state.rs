//! Shared Application State
//!
//! One `Oracle` owns the store, the vector backend client, and every
//! engine built on them. Both the stdio tool server and the HTTP server
//! share it behind an `Arc`.

use std::sync::Arc;

use oracle_core::{
    Config, Consult, Dashboard, Decisions, Forum, Indexer, Learn, OracleError, Result, Retrieval,
    Store, TraceLog, VectorBackend,
};

pub struct Oracle {
    pub config: Config,
    pub store: Arc<Store>,
    pub vector: Arc<VectorBackend>,
    pub retrieval: Retrieval,
    pub consult: Consult,
    pub learn: Learn,
    pub traces: TraceLog,
    pub forum: Forum,
    pub decisions: Decisions,
    pub dashboard: Dashboard,
}

impl Oracle {
    /// Open the store and wire up every engine. A corrupt store is fatal.
    pub fn init(config: Config) -> Result<Self> {
        let store = Arc::new(Store::open(&config.db_path).map_err(|e| {
            OracleError::Init(format!("store open failed at {:?}: {}", config.db_path, e))
        })?);
        let vector = Arc::new(VectorBackend::new(config.vector_cmd.clone()));

        let retrieval = Retrieval::new(
            Arc::clone(&store),
            Arc::clone(&vector),
            config.collection.clone(),
        );
        let consult = Consult::new(
            Arc::clone(&store),
            Arc::clone(&vector),
            config.collection.clone(),
        );
        let learn = Learn::new(Arc::clone(&store), config.learnings_dir());
        let traces = TraceLog::new(Arc::clone(&store));
        let forum = Forum::new(
            Arc::clone(&store),
            Consult::new(
                Arc::clone(&store),
                Arc::clone(&vector),
                config.collection.clone(),
            ),
        );
        let decisions = Decisions::new(Arc::clone(&store));
        let dashboard = Dashboard::new(Arc::clone(&store));

        Ok(Self {
            config,
            store,
            vector,
            retrieval,
            consult,
            learn,
            traces,
            forum,
            decisions,
            dashboard,
        })
    }

    /// Build an indexer over this state's corpus root.
    pub fn indexer(&self) -> Indexer {
        Indexer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.vector),
            self.config.collection.clone(),
            self.config.memory_root(),
        )
    }
}
