//! Host-facing facade over a [`Session`].

use std::{path::Path, sync::Arc};

use anyhow::Result;
use delivery_bridge::CallResult;
use tracing::{info, warn};

use crate::{
    api::DeliveryApi,
    config::ModuleConfig,
    events::EventListener,
    logger::init_logging,
    session::Session,
};

pub const MODULE_NAME: &str = "delivery_module";
pub const MODULE_VERSION: &str = "1.0.0";

/// What the host sees of the module.
pub trait DeliveryModuleInterface: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;

    fn create_node(&self, config_json: &str) -> bool;
    fn start(&self) -> bool;
    fn stop(&self) -> bool;
    /// `Ok` carries the request id assigned to the message.
    fn send(&self, content_topic: &str, payload: &str) -> CallResult<String>;
    fn subscribe(&self, content_topic: &str) -> bool;
    fn unsubscribe(&self, content_topic: &str) -> bool;

    fn set_event_listener(&self, listener: Arc<dyn EventListener>);
}

#[derive(Debug)]
pub struct DeliveryModule {
    session: Session,
}

impl DeliveryModule {
    pub fn new(api: DeliveryApi, config: &ModuleConfig) -> Self {
        Self { session: Session::new(api, config.callback_timeout) }
    }

    /// Loads configuration from the environment (and `env_file` if given),
    /// installs logging, then builds the module.
    pub fn from_env(api: DeliveryApi, env_file: Option<&Path>) -> Result<Self> {
        let config = ModuleConfig::from_env(env_file)?;
        init_logging(&config.log)?;
        info!(timeout = ?config.callback_timeout, "{} {} loaded", MODULE_NAME, MODULE_VERSION);
        Ok(Self::new(api, &config))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Tears the node down ahead of drop.
    pub fn shutdown(&self) {
        self.session.destroy();
    }
}

fn report(operation: &str, result: CallResult<()>) -> bool {
    if result.is_err() {
        warn!("{} failed: {}", operation, result.error());
    }
    result.is_ok()
}

impl DeliveryModuleInterface for DeliveryModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn version(&self) -> &str {
        MODULE_VERSION
    }

    fn create_node(&self, config_json: &str) -> bool {
        report("createNode", self.session.create_node(config_json))
    }

    fn start(&self) -> bool {
        report("start", self.session.start())
    }

    fn stop(&self) -> bool {
        report("stop", self.session.stop())
    }

    fn send(&self, content_topic: &str, payload: &str) -> CallResult<String> {
        let result = self.session.send(content_topic, payload.as_bytes());
        if result.is_err() {
            warn!(content_topic, "send failed: {}", result.error());
        }
        result
    }

    fn subscribe(&self, content_topic: &str) -> bool {
        report("subscribe", self.session.subscribe(content_topic))
    }

    fn unsubscribe(&self, content_topic: &str) -> bool {
        report("unsubscribe", self.session.unsubscribe(content_topic))
    }

    fn set_event_listener(&self, listener: Arc<dyn EventListener>) {
        self.session.dispatcher().set_listener(listener);
    }
}
