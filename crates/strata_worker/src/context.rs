//! Worker composition: every executor receives these references explicitly;
//! there is no ambient context.

use std::sync::Arc;

use strata_bus::MessageBus;
use strata_catalog::TableCatalog;
use strata_protocol::SystemConfig;
use strata_state_store::JobStore;
use strata_store::ObjectStoreGateway;

pub struct WorkerContext {
    pub config: SystemConfig,
    pub gateway: ObjectStoreGateway,
    pub jobs: JobStore,
    pub bus: Arc<MessageBus>,
    pub catalog: TableCatalog,
}
