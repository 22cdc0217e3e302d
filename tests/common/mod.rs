//! Shared fakes for coordinator integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use node_agent::config::{ApiConfig, ConfigError, ConfigSource, NodeConfig};
use node_agent::engine::{EngineConfig, EngineError, EngineFactory, InboundSpec, ProxyEngine};
use node_agent::lifecycle::ReloadTrigger;
use node_agent::panel::{
    ConfigSnapshot, ControlPlane, ControlPlaneError, ProtocolDescriptor, ProtocolKind,
    SecurityMode, TransportOptions,
};

pub fn descriptor(protocol: ProtocolKind, port: u16, enabled: bool) -> ProtocolDescriptor {
    ProtocolDescriptor {
        protocol,
        port,
        enabled,
        security: SecurityMode::None,
        transport: TransportOptions::default(),
    }
}

pub fn snapshot(protocols: Vec<ProtocolDescriptor>) -> ConfigSnapshot {
    ConfigSnapshot::new(1, protocols)
}

/// Config source that returns defaults or fails on demand.
#[derive(Clone, Default)]
pub struct StaticConfigSource {
    pub fail: Arc<AtomicBool>,
    pub loads: Arc<AtomicUsize>,
}

impl ConfigSource for StaticConfigSource {
    fn load(&self) -> Result<NodeConfig, ConfigError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ConfigError::Io(std::io::Error::from(std::io::ErrorKind::NotFound)));
        }
        Ok(NodeConfig::default())
    }
}

/// Control plane that replays queued responses.
#[derive(Default)]
pub struct ScriptedControlPlane {
    responses: Mutex<VecDeque<Result<ConfigSnapshot, ControlPlaneError>>>,
    fetches: AtomicUsize,
}

impl ScriptedControlPlane {
    pub fn push_ok(&self, snapshot: ConfigSnapshot) {
        self.responses.lock().unwrap().push_back(Ok(snapshot));
    }

    pub fn push_err(&self, err: ControlPlaneError) {
        self.responses.lock().unwrap().push_back(Err(err));
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControlPlane for ScriptedControlPlane {
    async fn fetch_snapshot(&self, _api: &ApiConfig) -> Result<ConfigSnapshot, ControlPlaneError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ControlPlaneError::MissingData))
    }
}

/// Scripted control plane whose fetches can be held open.
#[derive(Default)]
pub struct GatedControlPlane {
    pub scripted: ScriptedControlPlane,
    /// When set, each fetch waits for `release` before answering.
    pub gated: AtomicBool,
    /// Signalled when a gated fetch is waiting.
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl ControlPlane for GatedControlPlane {
    async fn fetch_snapshot(&self, api: &ApiConfig) -> Result<ConfigSnapshot, ControlPlaneError> {
        if self.gated.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.scripted.fetch_snapshot(api).await
    }
}

/// Engine that records what it serves.
#[derive(Default)]
pub struct FakeEngine {
    pub running: AtomicBool,
    pub closes: AtomicUsize,
    pub inbounds: Mutex<Vec<String>>,
    pub slot: Mutex<Option<ReloadTrigger>>,
    pub fail_start: bool,
    pub fail_port: Option<u16>,
    pub fail_close: AtomicBool,
}

impl FakeEngine {
    pub fn inbounds(&self) -> Vec<String> {
        self.inbounds.lock().unwrap().clone()
    }

    pub fn trigger(&self) -> Option<ReloadTrigger> {
        self.slot.lock().unwrap().clone()
    }

    /// Ask for a reload the way a real engine would.
    pub fn request_reload(&self) -> bool {
        match self.slot.lock().unwrap().as_ref() {
            Some(trigger) => trigger.request(),
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl ProxyEngine for FakeEngine {
    fn start(&self, _config: &EngineConfig) -> Result<(), EngineError> {
        if self.fail_start {
            return Err(EngineError::InvalidConfig("rejected by fake".into()));
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<(), EngineError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.inbounds.lock().unwrap().clear();
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(EngineError::Close("fake close failure".into()));
        }
        Ok(())
    }

    fn add_inbound(&self, inbound: InboundSpec) -> Result<(), EngineError> {
        if Some(inbound.descriptor.port) == self.fail_port {
            return Err(EngineError::Bind {
                port: inbound.descriptor.port,
                source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
            });
        }
        self.inbounds.lock().unwrap().push(inbound.tag);
        Ok(())
    }

    fn remove_inbound(&self, tag: &str) -> Result<(), EngineError> {
        let mut inbounds = self.inbounds.lock().unwrap();
        let before = inbounds.len();
        inbounds.retain(|t| t != tag);
        if inbounds.len() == before {
            return Err(EngineError::UnknownInbound(tag.to_string()));
        }
        Ok(())
    }

    fn set_reload_trigger(&self, trigger: Option<ReloadTrigger>) {
        *self.slot.lock().unwrap() = trigger;
    }
}

/// Factory that keeps every engine it created.
#[derive(Default)]
pub struct FakeEngineFactory {
    engines: Mutex<Vec<Arc<FakeEngine>>>,
    pub fail_next_start: AtomicBool,
    pub fail_port: Mutex<Option<u16>>,
}

impl FakeEngineFactory {
    pub fn engine(&self, index: usize) -> Arc<FakeEngine> {
        self.engines.lock().unwrap()[index].clone()
    }

    pub fn latest(&self) -> Arc<FakeEngine> {
        self.engines.lock().unwrap().last().cloned().unwrap()
    }

    pub fn created(&self) -> usize {
        self.engines.lock().unwrap().len()
    }
}

impl EngineFactory for FakeEngineFactory {
    fn create(&self, _config: &NodeConfig) -> Arc<dyn ProxyEngine> {
        let engine = Arc::new(FakeEngine {
            fail_start: self.fail_next_start.swap(false, Ordering::SeqCst),
            fail_port: *self.fail_port.lock().unwrap(),
            ..Default::default()
        });
        self.engines.lock().unwrap().push(engine.clone());
        engine
    }
}

/// Poll until `cond` holds or the timeout elapses.
pub async fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}
