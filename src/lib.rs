//! Caffeine jar factory project: deployment flows shared by the scripts and
//! the integration tests.

pub mod flows;

pub use flows::{
    artifacts, create_jar, deploy_system, list_jars, persist_after, resolve_treasury,
    DeploymentSummary, FlowError,
};
