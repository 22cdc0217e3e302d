//! Built-in loopback engine.
//!
//! # Responsibilities
//! - Bind one TCP listener per inbound
//! - Enforce the per-inbound connection cap via semaphore
//! - Echo bytes back to the client and report traffic to the inbound's hooks
//! - Request a reload when a listener keeps failing
//!
//! Listeners are owned by the engine, not by their accept tasks, so removing
//! an inbound closes its socket before the call returns.
//!
//! Protocol handling is not implemented: every inbound behaves as a plain
//! TCP echo service regardless of its declared protocol.

use std::future::poll_fn;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::Poll;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;

use crate::config::NodeConfig;
use crate::engine::{EngineConfig, EngineError, EngineFactory, InboundSpec, ProxyEngine};
use crate::lifecycle::signals::ReloadTrigger;
use crate::node::hooks::TrafficHooks;

/// Consecutive accept failures before a listener is given up.
const MAX_ACCEPT_FAILURES: u32 = 16;

type TriggerSlot = Arc<Mutex<Option<ReloadTrigger>>>;

/// Listener shared with its accept task. Emptied on shutdown.
type ListenerSlot = Arc<Mutex<Option<TcpListener>>>;

struct Inbound {
    local_addr: SocketAddr,
    listener: ListenerSlot,
    accept_task: JoinHandle<()>,
    closed_tx: watch::Sender<bool>,
}

impl Inbound {
    fn shutdown(self) {
        // Dropping the listener here frees the port synchronously.
        drop(self.listener.lock().unwrap_or_else(|e| e.into_inner()).take());
        let _ = self.closed_tx.send(true);
        self.accept_task.abort();
    }
}

/// TCP echo engine serving one listener per inbound.
pub struct LoopbackEngine {
    bind_ip: IpAddr,
    config: Mutex<Option<EngineConfig>>,
    inbounds: DashMap<String, Inbound>,
    trigger: TriggerSlot,
}

impl LoopbackEngine {
    pub fn new(bind_ip: IpAddr) -> Self {
        Self {
            bind_ip,
            config: Mutex::new(None),
            inbounds: DashMap::new(),
            trigger: Arc::new(Mutex::new(None)),
        }
    }

    /// Address an inbound is listening on.
    pub fn local_addr(&self, tag: &str) -> Option<SocketAddr> {
        self.inbounds.get(tag).map(|i| i.local_addr)
    }

    pub fn inbound_count(&self) -> usize {
        self.inbounds.len()
    }

    fn config(&self) -> MutexGuard<'_, Option<EngineConfig>> {
        self.config.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bind(&self, port: u16) -> Result<TcpListener, EngineError> {
        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        let listener = std::net::TcpListener::bind((self.bind_ip, port))
            .and_then(|l| l.set_nonblocking(true).map(|_| l))
            .map_err(|source| EngineError::Bind { port, source })?;
        let _guard = runtime.enter();
        TcpListener::from_std(listener).map_err(|source| EngineError::Bind { port, source })
    }
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}

impl ProxyEngine for LoopbackEngine {
    fn start(&self, config: &EngineConfig) -> Result<(), EngineError> {
        let mut current = self.config();
        if current.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        if config.max_connections == 0 {
            return Err(EngineError::InvalidConfig(
                "max_connections must be greater than 0".to_string(),
            ));
        }
        *current = Some(config.clone());
        tracing::debug!(server_id = config.server_id, "Loopback engine running");
        Ok(())
    }

    fn close(&self) -> Result<(), EngineError> {
        let tags: Vec<String> = self.inbounds.iter().map(|e| e.key().clone()).collect();
        for tag in tags {
            if let Some((_, inbound)) = self.inbounds.remove(&tag) {
                inbound.shutdown();
            }
        }
        *self.config() = None;
        Ok(())
    }

    fn add_inbound(&self, inbound: InboundSpec) -> Result<(), EngineError> {
        let max_connections = match self.config().as_ref() {
            Some(config) => config.max_connections,
            None => return Err(EngineError::NotRunning),
        };

        match self.inbounds.entry(inbound.tag.clone()) {
            Entry::Occupied(_) => Err(EngineError::DuplicateInbound(inbound.tag)),
            Entry::Vacant(slot) => {
                let listener = self.bind(inbound.descriptor.port)?;
                let local_addr = listener
                    .local_addr()
                    .map_err(|source| EngineError::Bind { port: inbound.descriptor.port, source })?;
                let listener = Arc::new(Mutex::new(Some(listener)));
                let (closed_tx, closed_rx) = watch::channel(false);
                let accept_task = tokio::spawn(accept_loop(
                    listener.clone(),
                    inbound.hooks.clone(),
                    Arc::new(Semaphore::new(max_connections)),
                    closed_rx,
                    self.trigger.clone(),
                ));

                tracing::info!(
                    tag = %inbound.tag,
                    address = %local_addr,
                    protocol = %inbound.descriptor.protocol,
                    "Inbound listening"
                );
                slot.insert(Inbound {
                    local_addr,
                    listener,
                    accept_task,
                    closed_tx,
                });
                Ok(())
            }
        }
    }

    fn remove_inbound(&self, tag: &str) -> Result<(), EngineError> {
        let (_, inbound) = self
            .inbounds
            .remove(tag)
            .ok_or_else(|| EngineError::UnknownInbound(tag.to_string()))?;
        inbound.shutdown();
        tracing::info!(tag = %tag, "Inbound removed");
        Ok(())
    }

    fn set_reload_trigger(&self, trigger: Option<ReloadTrigger>) {
        *self.trigger.lock().unwrap_or_else(|e| e.into_inner()) = trigger;
    }
}

/// Accept from the slot without holding its lock across an await.
///
/// Resolves to `None` once the listener has been taken out.
async fn accept(listener: &ListenerSlot) -> Option<io::Result<(TcpStream, SocketAddr)>> {
    poll_fn(|cx| {
        let slot = listener.lock().unwrap_or_else(|e| e.into_inner());
        let polled = match slot.as_ref() {
            Some(listener) => listener.poll_accept(cx).map(Some),
            None => Poll::Ready(None),
        };
        polled
    })
    .await
}

async fn accept_loop(
    listener: ListenerSlot,
    hooks: Arc<TrafficHooks>,
    limit: Arc<Semaphore>,
    closed: watch::Receiver<bool>,
    trigger: TriggerSlot,
) {
    let mut failures = 0;
    loop {
        let permit = match limit.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        match accept(&listener).await {
            None => return,
            Some(Ok((stream, peer))) => {
                failures = 0;
                tracing::debug!(tag = %hooks.tag(), peer_addr = %peer, "Connection accepted");
                let hooks = hooks.clone();
                let closed = closed.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    serve_echo(stream, hooks, closed).await;
                });
            }
            Some(Err(e)) => {
                failures += 1;
                tracing::warn!(tag = %hooks.tag(), error = %e, failures, "Accept failed");
                if failures >= MAX_ACCEPT_FAILURES {
                    tracing::error!(tag = %hooks.tag(), "Listener failing repeatedly, requesting reload");
                    let slot = trigger.lock().unwrap_or_else(|e| e.into_inner());
                    if let Some(trigger) = slot.as_ref() {
                        trigger.request();
                    }
                    return;
                }
            }
        }
    }
}

async fn serve_echo(mut stream: TcpStream, hooks: Arc<TrafficHooks>, mut closed: watch::Receiver<bool>) {
    let _guard = hooks.connection_opened();
    let (mut reader, mut writer) = stream.split();
    tokio::select! {
        res = tokio::io::copy(&mut reader, &mut writer) => match res {
            Ok(bytes) => hooks.record_traffic(bytes, bytes),
            Err(e) => tracing::debug!(tag = %hooks.tag(), error = %e, "Connection error"),
        },
        _ = closed.changed() => {
            tracing::debug!(tag = %hooks.tag(), "Inbound closed, dropping connection");
        }
    }
}

/// Creates a fresh [`LoopbackEngine`] per reload cycle.
#[derive(Debug, Clone)]
pub struct LoopbackEngineFactory {
    bind_ip: IpAddr,
}

impl LoopbackEngineFactory {
    pub fn new(bind_ip: IpAddr) -> Self {
        Self { bind_ip }
    }
}

impl Default for LoopbackEngineFactory {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}

impl EngineFactory for LoopbackEngineFactory {
    fn create(&self, _config: &NodeConfig) -> Arc<dyn ProxyEngine> {
        Arc::new(LoopbackEngine::new(self.bind_ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::ProtocolDescriptor;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn engine_config() -> EngineConfig {
        EngineConfig {
            server_id: 1,
            log_level: "info".to_string(),
            max_connections: 4,
            declared_inbounds: 1,
        }
    }

    fn inbound(tag: &str) -> InboundSpec {
        let descriptor: ProtocolDescriptor =
            serde_json::from_str(r#"{"type": "shadowsocks", "port": 0, "enable": true}"#).unwrap();
        InboundSpec {
            tag: tag.to_string(),
            descriptor,
            hooks: Arc::new(TrafficHooks::new(tag)),
        }
    }

    fn local_engine() -> LoopbackEngine {
        LoopbackEngine::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    #[tokio::test]
    async fn test_echo_and_traffic_accounting() {
        let engine = local_engine();
        engine.start(&engine_config()).unwrap();
        let spec = inbound("shadowsocks_0");
        let hooks = spec.hooks.clone();
        engine.add_inbound(spec).unwrap();

        let addr = engine.local_addr("shadowsocks_0").unwrap();
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        client.shutdown().await.unwrap();
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let stats = hooks.stats();
        assert_eq!(stats.connections_total, 1);
        assert_eq!(stats.bytes_in, 4);
        assert_eq!(stats.bytes_out, 4);
    }

    #[tokio::test]
    async fn test_add_inbound_requires_running_engine() {
        let engine = local_engine();
        assert!(matches!(engine.add_inbound(inbound("a")), Err(EngineError::NotRunning)));
    }

    #[tokio::test]
    async fn test_duplicate_inbound_rejected() {
        let engine = local_engine();
        engine.start(&engine_config()).unwrap();
        engine.add_inbound(inbound("a")).unwrap();
        assert!(matches!(
            engine.add_inbound(inbound("a")),
            Err(EngineError::DuplicateInbound(tag)) if tag == "a"
        ));
    }

    #[tokio::test]
    async fn test_close_releases_listeners() {
        let engine = local_engine();
        engine.start(&engine_config()).unwrap();
        engine.add_inbound(inbound("a")).unwrap();
        let addr = engine.local_addr("a").unwrap();

        engine.close().unwrap();
        assert_eq!(engine.inbound_count(), 0);

        // No yield to the runtime: the port must already be free.
        let rebound = std::net::TcpListener::bind(addr);
        assert!(rebound.is_ok());

        // Engine can be started again after close.
        engine.start(&engine_config()).unwrap();
    }

    #[tokio::test]
    async fn test_removed_inbound_port_can_be_reused_immediately() {
        let first = local_engine();
        first.start(&engine_config()).unwrap();
        first.add_inbound(inbound("a")).unwrap();
        let port = first.local_addr("a").unwrap().port();
        first.remove_inbound("a").unwrap();

        let second = local_engine();
        second.start(&engine_config()).unwrap();
        let mut spec = inbound("b");
        spec.descriptor.port = port;
        second.add_inbound(spec).unwrap();
        assert_eq!(second.local_addr("b").unwrap().port(), port);
    }

    #[tokio::test]
    async fn test_remove_unknown_inbound() {
        let engine = local_engine();
        engine.start(&engine_config()).unwrap();
        assert!(matches!(engine.remove_inbound("nope"), Err(EngineError::UnknownInbound(_))));
    }

    #[test]
    fn test_zero_connection_cap_rejected() {
        let engine = local_engine();
        let mut config = engine_config();
        config.max_connections = 0;
        assert!(matches!(engine.start(&config), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_bind_without_runtime() {
        let engine = local_engine();
        engine.start(&engine_config()).unwrap();
        assert!(matches!(engine.add_inbound(inbound("a")), Err(EngineError::NoRuntime)));
    }
}
