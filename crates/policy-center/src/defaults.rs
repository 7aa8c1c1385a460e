use interpose_invocation::StageScheduling;

use crate::model::{DispatchPolicy, LoggingPolicy, PolicySnapshot};

pub fn default_snapshot() -> PolicySnapshot {
    PolicySnapshot {
        rev: 1,
        dispatch: DispatchPolicy {
            scheduling: StageScheduling::Spawn,
            cache_chains: true,
        },
        logging: LoggingPolicy {
            level: "info".into(),
            json: false,
        },
        rules: Vec::new(),
        provenance: Default::default(),
    }
}
